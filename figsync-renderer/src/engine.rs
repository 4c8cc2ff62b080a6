//! Generation policies and the Tera engine behind the default one.
//!
//! # Output layout (relative to the target prefix)
//!
//! | Path                   | Template          | Content                         |
//! |------------------------|-------------------|---------------------------------|
//! | `tokens.ts`            | `tokens.ts.tera`  | colors, spacing and radius scale|
//! | `screens.json`         | (none)            | JSON array of screen names      |
//! | `screens/<slug>.tsx`   | `screen.tsx.tera` | one component per screen        |
//! | `index.ts`             | `index.ts.tera`   | re-exports + manifest import    |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use figsync_core::{GeneratedFileSet, IntermediateTree};

use crate::context::TemplateContext;
use crate::error::RenderError;

pub const TOKENS_FILE: &str = "tokens.ts";
pub const MANIFEST_FILE: &str = "screens.json";
pub const INDEX_FILE: &str = "index.ts";
pub const SCREENS_DIR: &str = "screens";

// ---------------------------------------------------------------------------
// Built-in templates
// ---------------------------------------------------------------------------

const BUILTIN: &[(&str, &str)] = &[
    ("shared/_header.tera", include_str!("templates/_header.tera")),
    ("tokens.ts.tera", include_str!("templates/tokens.ts.tera")),
    ("screen.tsx.tera", include_str!("templates/screen.tsx.tera")),
    ("index.ts.tera", include_str!("templates/index.ts.tera")),
];

fn read_failed(path: &Path) -> impl FnOnce(std::io::Error) -> RenderError + '_ {
    move |source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Registry key for a template file: forward slashes, lowercase.
fn template_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect::<Vec<_>>()
        .join("/")
}

/// Every `.tera` file below `root`, keyed by its relative path and
/// sorted so overrides apply in a stable order.
fn override_templates(root: &Path) -> Result<BTreeMap<String, String>, RenderError> {
    let mut found = BTreeMap::new();
    if !root.is_dir() {
        return Ok(found);
    }
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(read_failed(&dir))? {
            let path = entry.map_err(read_failed(&dir))?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if path.extension().map_or(true, |ext| ext != "tera") {
                continue;
            }
            let body = std::fs::read_to_string(&path).map_err(read_failed(&path))?;
            let relative = path.strip_prefix(root).unwrap_or(path.as_path());
            found.insert(template_key(relative), body);
        }
    }
    Ok(found)
}

fn load_tera(overrides: Option<&Path>) -> Result<Tera, RenderError> {
    let mut sources: BTreeMap<String, String> = BUILTIN
        .iter()
        .map(|(name, body)| ((*name).to_string(), (*body).to_string()))
        .collect();
    if let Some(root) = overrides {
        for (name, body) in override_templates(root)? {
            tracing::debug!(template = %name, dir = %root.display(), "template overridden");
            sources.insert(name, body);
        }
    }

    let mut tera = Tera::default();
    tera.add_raw_templates(sources)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// OutputPrefix
// ---------------------------------------------------------------------------

/// Repository-relative directory generated paths live under.
///
/// Stored without leading or trailing `/`; the empty prefix is the
/// repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPrefix(String);

impl OutputPrefix {
    pub fn parse(raw: &str) -> Result<Self, RenderError> {
        let invalid = |reason| RenderError::InvalidPrefix {
            prefix: raw.to_string(),
            reason,
        };
        if raw.contains('\\') {
            return Err(invalid("backslashes are not allowed"));
        }
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self(String::new()));
        }
        for segment in trimmed.split('/') {
            match segment {
                "" => return Err(invalid("empty path segment")),
                "." | ".." => return Err(invalid("relative path segment")),
                s if s.trim() != s => return Err(invalid("segment has surrounding whitespace")),
                _ => {}
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<prefix>/<relative>`, or `relative` at the root.
    pub fn join(&self, relative: &str) -> String {
        if self.0.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.0, relative)
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Built-in templates plus any `.tera` files found under an override
/// directory, which replace built-ins with the same relative name.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new(overrides: Option<&Path>) -> Result<Self, RenderError> {
        let tera = load_tera(overrides)?;
        Ok(Self { tera })
    }

    /// Render one template with LF line endings and a trailing newline.
    pub fn render(&self, name: &str, ctx: &tera::Context) -> Result<String, RenderError> {
        let mut rendered = self.tera.render(name, ctx)?.replace("\r\n", "\n");
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        Ok(rendered)
    }
}

// ---------------------------------------------------------------------------
// GenerationPolicy
// ---------------------------------------------------------------------------

/// Turns an intermediate tree into files. Must be pure: same tree and
/// prefix, same output.
pub trait GenerationPolicy: Send + Sync {
    fn generate(
        &self,
        tree: &IntermediateTree,
        prefix: &OutputPrefix,
    ) -> Result<GeneratedFileSet, RenderError>;
}

/// The shipped policy: tokens, manifest, one module per screen, index.
pub struct TemplatePolicy {
    engine: TemplateEngine,
}

impl TemplatePolicy {
    pub fn new(overrides: Option<&Path>) -> Result<Self, RenderError> {
        let engine = TemplateEngine::new(overrides)?;
        Ok(Self { engine })
    }
}

impl GenerationPolicy for TemplatePolicy {
    fn generate(
        &self,
        tree: &IntermediateTree,
        prefix: &OutputPrefix,
    ) -> Result<GeneratedFileSet, RenderError> {
        let ctx = TemplateContext::from_tree(tree);
        let base = ctx.to_tera_context()?;
        let mut files = GeneratedFileSet::new(tree.hash.clone());

        let tokens = self.engine.render("tokens.ts.tera", &base)?;
        insert_unique(&mut files, prefix.join(TOKENS_FILE), tokens)?;

        let mut manifest = serde_json::to_string_pretty(&ctx.screen_names())?;
        manifest.push('\n');
        insert_unique(&mut files, prefix.join(MANIFEST_FILE), manifest)?;

        for screen in &ctx.screens {
            let mut screen_ctx = base.clone();
            screen_ctx.insert("screen", screen);
            let content = self.engine.render("screen.tsx.tera", &screen_ctx)?;
            let path = prefix.join(&format!("{SCREENS_DIR}/{}.tsx", screen.slug));
            insert_unique(&mut files, path, content)?;
        }

        let index = self.engine.render("index.ts.tera", &base)?;
        insert_unique(&mut files, prefix.join(INDEX_FILE), index)?;

        tracing::debug!(
            document = %tree.document_id,
            files = files.len(),
            prefix = prefix.as_str(),
            "generated file set"
        );
        Ok(files)
    }
}

fn insert_unique(
    files: &mut GeneratedFileSet,
    path: String,
    content: String,
) -> Result<(), RenderError> {
    if files.get(&path).is_some() {
        return Err(RenderError::PathCollision(path));
    }
    files.insert(path, content);
    Ok(())
}
