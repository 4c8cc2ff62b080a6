//! Template context: serializable rendering payload built from an
//! [`IntermediateTree`].
//!
//! Everything that needs escaping, naming or ordering decisions is settled
//! here in Rust so the templates stay plain text substitution.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use figsync_core::types::{IntermediateTree, IrKind, IrNode};

use crate::error::RenderError;

/// Rendering payload shared by every template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    pub document: DocumentCtx,
    pub tokens: TokensCtx,
    /// Screens in document order, names already made unique.
    pub screens: Vec<ScreenCtx>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCtx {
    pub id: String,
    pub name: String,
    /// `"<name>" (<id>)`, safe inside a comment.
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensCtx {
    pub colors: Vec<ColorToken>,
    /// Sorted, deduplicated, pre-formatted numbers.
    pub spacing: Vec<String>,
    pub radii: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorToken {
    /// TypeScript identifier, e.g. `brandPrimary`.
    pub name: String,
    /// Shared style name, e.g. `Brand/Primary`.
    pub style_name: String,
    /// `style_name`, safe inside a comment.
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenCtx {
    /// Unique display name (`Home`, `Home2`, …).
    pub name: String,
    /// Exported component identifier.
    pub component: String,
    /// File stem under `screens/`.
    pub slug: String,
    pub node_id: String,
    /// `<name> (<node_id>)`, safe inside a comment.
    pub label: String,
    /// JSX body, already indented for the `return (…)` block.
    pub markup: String,
    /// Whether `markup` references the `colors` token object.
    pub uses_tokens: bool,
}

impl TemplateContext {
    pub fn from_tree(tree: &IntermediateTree) -> Self {
        let colors = color_tokens(tree);
        let screens = screen_contexts(tree, &colors);
        TemplateContext {
            document: DocumentCtx {
                id: tree.document_id.to_string(),
                name: tree.document_name.clone(),
                label: comment_text(&format!(
                    "\"{}\" ({})",
                    tree.document_name, tree.document_id
                )),
            },
            tokens: TokensCtx {
                colors,
                spacing: spacing_scale(tree),
                radii: radius_scale(tree),
            },
            screens,
        }
    }

    /// Screen names in manifest order.
    pub fn screen_names(&self) -> Vec<&str> {
        self.screens.iter().map(|s| s.name.as_str()).collect()
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

fn color_tokens(tree: &IntermediateTree) -> Vec<ColorToken> {
    let mut styles: Vec<(&String, &String)> = tree
        .styles
        .values()
        .filter(|s| s.style_type == "FILL")
        .filter_map(|s| s.color.as_ref().map(|c| (&s.name, c)))
        .collect();
    styles.sort();

    let mut used = BTreeSet::new();
    styles
        .into_iter()
        .map(|(style_name, value)| {
            let base = camel_identifier(style_name, "color");
            let name = unique(&base, |candidate| used.contains(candidate), |b, n| format!("{b}{n}"));
            used.insert(name.clone());
            ColorToken {
                name,
                style_name: style_name.clone(),
                label: comment_text(style_name),
                value: value.clone(),
            }
        })
        .collect()
}

fn spacing_scale(tree: &IntermediateTree) -> Vec<String> {
    let mut values = Vec::new();
    for screen in &tree.screens {
        screen.root.walk(&mut |node| {
            values.extend(node.item_spacing);
            if let Some(p) = node.padding {
                values.extend([p.top, p.right, p.bottom, p.left]);
            }
        });
    }
    scale(values)
}

fn radius_scale(tree: &IntermediateTree) -> Vec<String> {
    let mut values = Vec::new();
    for screen in &tree.screens {
        screen.root.walk(&mut |node| values.extend(node.corner_radius));
    }
    scale(values)
}

fn scale(mut values: Vec<f64>) -> Vec<String> {
    values.retain(|v| v.is_finite() && *v > 0.0);
    values.sort_by(f64::total_cmp);
    values.dedup();
    values.into_iter().map(number).collect()
}

// ---------------------------------------------------------------------------
// Screens
// ---------------------------------------------------------------------------

fn screen_contexts(tree: &IntermediateTree, colors: &[ColorToken]) -> Vec<ScreenCtx> {
    let mut used_slugs = BTreeSet::new();
    let mut used_components = BTreeSet::new();
    let mut used_names = BTreeSet::new();

    let mut out = Vec::with_capacity(tree.screens.len());
    for screen in &tree.screens {
        let base_slug = slug(&screen.name);
        let base_component = pascal_identifier(&screen.name, "Screen");

        let mut n = 1;
        loop {
            let (slug, component, name) = if n == 1 {
                (base_slug.clone(), base_component.clone(), screen.name.clone())
            } else {
                (
                    format!("{base_slug}-{n}"),
                    format!("{base_component}{n}"),
                    format!("{}{n}", screen.name),
                )
            };
            let free = !used_slugs.contains(&slug)
                && !used_components.contains(&component)
                && !used_names.contains(&name);
            if free {
                let mut markup = Vec::new();
                let mut uses_tokens = false;
                render_node(&screen.root, 2, colors, &mut markup, &mut uses_tokens);
                used_slugs.insert(slug.clone());
                used_components.insert(component.clone());
                used_names.insert(name.clone());
                out.push(ScreenCtx {
                    label: comment_text(&format!("{name} ({})", screen.node_id)),
                    name,
                    component,
                    slug,
                    node_id: screen.node_id.to_string(),
                    markup: markup.join("\n"),
                    uses_tokens,
                });
                break;
            }
            n += 1;
        }
    }
    out
}

fn render_node(
    node: &IrNode,
    depth: usize,
    colors: &[ColorToken],
    out: &mut Vec<String>,
    uses_tokens: &mut bool,
) {
    let indent = "  ".repeat(depth);
    let tag = match node.kind {
        IrKind::Text => "span",
        _ => "div",
    };
    let style = style_object(node, colors, uses_tokens);
    let open = format!(
        "{indent}<{tag} data-node={}{}",
        jsx_string(&node.id.0),
        style
    );

    if let Some(text) = node.text.as_deref() {
        out.push(format!("{open}>{{{}}}</{tag}>", jsx_string(text)));
        return;
    }
    if node.children.is_empty() || !node.kind.is_container() {
        out.push(format!("{open} />"));
        return;
    }
    out.push(format!("{open}>"));
    for child in &node.children {
        render_node(child, depth + 1, colors, out, uses_tokens);
    }
    out.push(format!("{indent}</{tag}>"));
}

fn style_object(node: &IrNode, colors: &[ColorToken], uses_tokens: &mut bool) -> String {
    let mut props = Vec::new();
    if let Some(b) = node.bounds {
        props.push(format!("width: {}", number(b.width)));
        props.push(format!("height: {}", number(b.height)));
    }
    if let Some(fill) = node.fill.as_deref() {
        let token = node
            .fill_style
            .as_deref()
            .and_then(|style| colors.iter().find(|c| c.style_name == style && c.value == fill));
        match token {
            Some(t) => {
                *uses_tokens = true;
                props.push(format!("background: colors.{}", t.name));
            }
            None => props.push(format!("background: '{fill}'")),
        }
    }
    match node.kind {
        IrKind::Ellipse => props.push("borderRadius: '50%'".to_string()),
        _ => {
            if let Some(r) = node.corner_radius {
                props.push(format!("borderRadius: {}", number(r)));
            }
        }
    }
    if let Some(gap) = node.item_spacing {
        props.push("display: 'flex'".to_string());
        props.push(format!("gap: {}", number(gap)));
    }
    if let Some(p) = node.padding {
        props.push(format!(
            "padding: '{}px {}px {}px {}px'",
            number(p.top),
            number(p.right),
            number(p.bottom),
            number(p.left)
        ));
    }
    if props.is_empty() {
        String::new()
    } else {
        format!(" style={{{{ {} }}}}", props.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Naming helpers
// ---------------------------------------------------------------------------

/// Lowercase ASCII words joined by `-`; `screen` when nothing survives.
pub fn slug(name: &str) -> String {
    let words = words(name);
    if words.is_empty() {
        return "screen".to_string();
    }
    words
        .iter()
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// `Sign in form` → `SignInForm`. Prefixed with `fallback` when the result
/// would not start with a letter.
pub fn pascal_identifier(name: &str, fallback: &str) -> String {
    let joined: String = words(name).iter().map(|w| capitalize(w)).collect();
    if joined.starts_with(|c: char| c.is_ascii_alphabetic()) {
        joined
    } else {
        format!("{fallback}{joined}")
    }
}

/// `Brand/Primary` → `brandPrimary`.
pub fn camel_identifier(name: &str, fallback: &str) -> String {
    let words = words(name);
    let mut out = String::new();
    for (i, w) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(&w.to_ascii_lowercase());
        } else {
            out.push_str(&capitalize(w));
        }
    }
    if out.starts_with(|c: char| c.is_ascii_alphabetic()) {
        out
    } else {
        format!("{fallback}{}", capitalize(&out))
    }
}

fn words(name: &str) -> Vec<&str> {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn capitalize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn unique(
    base: &str,
    taken: impl Fn(&str) -> bool,
    suffixed: impl Fn(&str, usize) -> String,
) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = suffixed(base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Integers without a trailing `.0`, everything else as Rust prints it.
fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Single-line text that cannot close a `/* */` comment. Line breaks
/// (including U+2028/U+2029) and other control characters become spaces.
pub fn comment_text(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '\u{2028}' | '\u{2029}' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect::<String>()
        .replace("*/", "* /")
}

fn jsx_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
