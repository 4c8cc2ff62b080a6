//! `figsync generate --input <file.json>`: offline generation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use figsync_core::{DocumentId, GeneratedFileSet};
use figsync_design::{normalize, read_document_file};
use figsync_renderer::{GenerationPolicy, OutputPrefix, TemplatePolicy};

/// Arguments for `figsync generate`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Exported design document (the design API's file JSON).
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Document id (default: the input file stem).
    #[arg(long)]
    pub id: Option<String>,

    /// Path prefix for generated files.
    #[arg(long, default_value = "generated/design")]
    pub prefix: String,

    /// Directory of `.tera` templates overriding the embedded ones.
    #[arg(long)]
    pub templates: Option<PathBuf>,

    /// Write the files under this directory instead of listing them.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

impl GenerateArgs {
    pub fn run(self) -> Result<()> {
        let document = read_document_file(&self.input, self.id.as_deref().map(DocumentId::from))
            .with_context(|| format!("failed to read '{}'", self.input.display()))?;
        let tree = normalize(&document)
            .with_context(|| format!("'{}' is not a usable design document", self.input.display()))?;
        let prefix = OutputPrefix::parse(&self.prefix)
            .with_context(|| format!("invalid prefix '{}'", self.prefix))?;
        let policy = TemplatePolicy::new(self.templates.as_deref())
            .context("failed to load templates")?;
        let files = policy
            .generate(&tree, &prefix)
            .context("code generation failed")?;

        match &self.out {
            Some(out) => {
                write_files(out, &files)?;
                println!(
                    "✓ Generated {} files from '{}' into {}",
                    files.len(),
                    document.name,
                    out.display()
                );
                for path in files.paths() {
                    println!("  ✎  {path}");
                }
            }
            None => {
                println!(
                    "✓ '{}' generates {} files (hash {})",
                    document.name,
                    files.len(),
                    files.provenance.short(12)
                );
                for (path, content) in &files.files {
                    println!("  ~  {path} ({} bytes)", content.len());
                }
            }
        }
        Ok(())
    }
}

fn write_files(out: &Path, files: &GeneratedFileSet) -> Result<()> {
    for (path, content) in &files.files {
        let target = out.join(path);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create '{}'", dir.display()))?;
        }
        fs::write(&target, content)
            .with_context(|| format!("failed to write '{}'", target.display()))?;
    }
    Ok(())
}
