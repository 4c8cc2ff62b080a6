//! Domain types for the figsync pipeline.
//!
//! Three families live here:
//! - the design document as fetched from the design tool ([`DesignDocument`],
//!   [`DesignNode`]), deserialized straight from the REST payload shape;
//! - the normalized, generator-facing [`IntermediateTree`];
//! - the [`GeneratedFileSet`] handed from generation to publishing.
//!
//! Every map is a `BTreeMap` so serialization order is stable; the tree hash
//! and the generated output depend on it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a design document (the design tool's file key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Stable identifier of a node inside one design document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// SHA-256 hex digest of a normalized [`IntermediateTree`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeHash(pub String);

impl TreeHash {
    /// Hash arbitrary bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    /// First `len` hex characters, used in branch names and log lines.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Design document (design-tool payload)
// ---------------------------------------------------------------------------

/// Node type tag as reported by the design tool.
///
/// Unknown tags are kept verbatim in [`NodeKind::Other`] so that the
/// normalizer can drop them without failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Document,
    Canvas,
    Frame,
    Group,
    Section,
    Component,
    ComponentSet,
    Instance,
    Text,
    Vector,
    Rectangle,
    Ellipse,
    Line,
    BooleanOperation,
    Slice,
    Other(String),
}

impl NodeKind {
    /// Frame-like kinds qualify a top-level page child as a screen.
    pub fn is_frame_like(&self) -> bool {
        matches!(
            self,
            NodeKind::Frame | NodeKind::Component | NodeKind::ComponentSet | NodeKind::Section
        )
    }

    pub fn as_tag(&self) -> &str {
        match self {
            NodeKind::Document => "DOCUMENT",
            NodeKind::Canvas => "CANVAS",
            NodeKind::Frame => "FRAME",
            NodeKind::Group => "GROUP",
            NodeKind::Section => "SECTION",
            NodeKind::Component => "COMPONENT",
            NodeKind::ComponentSet => "COMPONENT_SET",
            NodeKind::Instance => "INSTANCE",
            NodeKind::Text => "TEXT",
            NodeKind::Vector => "VECTOR",
            NodeKind::Rectangle => "RECTANGLE",
            NodeKind::Ellipse => "ELLIPSE",
            NodeKind::Line => "LINE",
            NodeKind::BooleanOperation => "BOOLEAN_OPERATION",
            NodeKind::Slice => "SLICE",
            NodeKind::Other(tag) => tag,
        }
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "DOCUMENT" => NodeKind::Document,
            "CANVAS" => NodeKind::Canvas,
            "FRAME" => NodeKind::Frame,
            "GROUP" => NodeKind::Group,
            "SECTION" => NodeKind::Section,
            "COMPONENT" => NodeKind::Component,
            "COMPONENT_SET" => NodeKind::ComponentSet,
            "INSTANCE" => NodeKind::Instance,
            "TEXT" => NodeKind::Text,
            "VECTOR" => NodeKind::Vector,
            "RECTANGLE" => NodeKind::Rectangle,
            "ELLIPSE" => NodeKind::Ellipse,
            "LINE" => NodeKind::Line,
            "BOOLEAN_OPERATION" => NodeKind::BooleanOperation,
            "SLICE" => NodeKind::Slice,
            _ => NodeKind::Other(tag),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_tag().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Absolute bounding box in design-tool canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// RGBA color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default = "opaque")]
    pub a: f64,
}

fn opaque() -> f64 {
    1.0
}

impl Color {
    /// `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let rgb = format!(
            "#{:02x}{:02x}{:02x}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        );
        if channel(self.a) == 255 {
            rgb
        } else {
            format!("{rgb}{:02x}", channel(self.a))
        }
    }
}

/// One entry of a node's `fills` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paint {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

impl Paint {
    /// The effective color of a visible solid paint.
    pub fn solid_color(&self) -> Option<Color> {
        if self.kind != "SOLID" || !self.visible {
            return None;
        }
        self.color.map(|c| Color {
            a: c.a * self.opacity.unwrap_or(1.0),
            ..c
        })
    }
}

fn visible_by_default() -> bool {
    true
}

/// A node in the design tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignNode {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_bounding_box: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fills: Vec<Paint>,
    /// Shared style references, e.g. `{"fill": "S:1234"}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub styles: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_spacing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_left: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_right: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_bottom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default)]
    pub children: Vec<DesignNode>,
}

impl DesignNode {
    /// Minimal node with no style attributes. Handy for fixtures.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            visible: true,
            absolute_bounding_box: None,
            fills: Vec::new(),
            styles: BTreeMap::new(),
            corner_radius: None,
            item_spacing: None,
            padding_left: None,
            padding_right: None,
            padding_top: None,
            padding_bottom: None,
            characters: None,
            component_id: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<DesignNode>) -> Self {
        self.children = children;
        self
    }

    /// First visible solid fill, if any.
    pub fn solid_fill(&self) -> Option<Color> {
        self.fills.iter().find_map(Paint::solid_color)
    }
}

/// A shared style definition from the document's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedStyle {
    #[serde(default)]
    pub key: String,
    pub name: String,
    /// `FILL`, `TEXT`, `EFFECT` or `GRID`.
    pub style_type: String,
    #[serde(default)]
    pub description: String,
}

/// Document-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Shared styles keyed by style id.
    #[serde(default)]
    pub styles: BTreeMap<String, SharedStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// The full design-tool payload for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDocument {
    pub id: DocumentId,
    pub name: String,
    pub root: DesignNode,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

// ---------------------------------------------------------------------------
// Intermediate tree (normalizer output)
// ---------------------------------------------------------------------------

/// Node kinds the generator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrKind {
    Frame,
    Group,
    Section,
    Component,
    Instance,
    Text,
    Vector,
    Rectangle,
    Ellipse,
    Line,
}

impl IrKind {
    /// `None` for kinds the generator does not support.
    pub fn from_node_kind(kind: &NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Frame => Some(IrKind::Frame),
            NodeKind::Group => Some(IrKind::Group),
            NodeKind::Section => Some(IrKind::Section),
            NodeKind::Component => Some(IrKind::Component),
            NodeKind::Instance => Some(IrKind::Instance),
            NodeKind::Text => Some(IrKind::Text),
            NodeKind::Vector => Some(IrKind::Vector),
            NodeKind::Rectangle => Some(IrKind::Rectangle),
            NodeKind::Ellipse => Some(IrKind::Ellipse),
            NodeKind::Line => Some(IrKind::Line),
            NodeKind::Document
            | NodeKind::Canvas
            | NodeKind::ComponentSet
            | NodeKind::BooleanOperation
            | NodeKind::Slice
            | NodeKind::Other(_) => None,
        }
    }

    /// Container kinds may carry children in generated markup.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            IrKind::Frame | IrKind::Group | IrKind::Section | IrKind::Component | IrKind::Instance
        )
    }
}

/// Padding on the four sides, present only when at least one side is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// A normalized node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrNode {
    pub id: NodeId,
    pub kind: IrKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    /// Hex color of the first visible solid fill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Name of the shared fill style, when the fill references one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_spacing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<Padding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    pub children: Vec<IrNode>,
}

impl IrNode {
    /// Depth-first pre-order walk over this node and its descendants.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a IrNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// A top-level frame of the first page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub node_id: NodeId,
    pub name: String,
    pub root: IrNode,
}

/// A shared style resolved against the nodes that use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStyle {
    pub name: String,
    pub style_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Normalizer output: the generator-facing view of a design document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateTree {
    pub document_id: DocumentId,
    pub document_name: String,
    pub screens: Vec<Screen>,
    /// Shared styles keyed by style id.
    pub styles: BTreeMap<String, ResolvedStyle>,
    /// Hash over every other field; see [`IntermediateTree::content_hash`].
    pub hash: TreeHash,
}

#[derive(Serialize)]
struct HashView<'a> {
    document_id: &'a DocumentId,
    document_name: &'a str,
    screens: &'a [Screen],
    styles: &'a BTreeMap<String, ResolvedStyle>,
}

impl IntermediateTree {
    /// Build a tree and stamp its content hash.
    pub fn new(
        document_id: DocumentId,
        document_name: String,
        screens: Vec<Screen>,
        styles: BTreeMap<String, ResolvedStyle>,
    ) -> Result<Self, serde_json::Error> {
        let mut tree = IntermediateTree {
            document_id,
            document_name,
            screens,
            styles,
            hash: TreeHash(String::new()),
        };
        tree.hash = tree.content_hash()?;
        Ok(tree)
    }

    /// SHA-256 of the canonical JSON form of everything except `hash`.
    pub fn content_hash(&self) -> Result<TreeHash, serde_json::Error> {
        let view = HashView {
            document_id: &self.document_id,
            document_name: &self.document_name,
            screens: &self.screens,
            styles: &self.styles,
        };
        let bytes = serde_json::to_vec(&view)?;
        Ok(TreeHash::compute(&bytes))
    }
}

// ---------------------------------------------------------------------------
// Generated file set
// ---------------------------------------------------------------------------

/// Generated files keyed by repository-relative path, ordered by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFileSet {
    /// Hash of the intermediate tree this set was generated from.
    pub provenance: TreeHash,
    pub files: BTreeMap<String, String>,
}

impl GeneratedFileSet {
    pub fn new(provenance: TreeHash) -> Self {
        Self {
            provenance,
            files: BTreeMap::new(),
        }
    }

    /// Insert a file. Returns the previous content if the path was taken.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> Option<String> {
        self.files.insert(path.into(), content.into())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(DocumentId::from("abc123").to_string(), "abc123");
        assert_eq!(NodeId::from("1:2").to_string(), "1:2");
    }

    #[test]
    fn node_kind_roundtrips_known_and_unknown_tags() {
        assert_eq!(NodeKind::from("FRAME".to_string()), NodeKind::Frame);
        assert_eq!(
            NodeKind::from("STICKY".to_string()),
            NodeKind::Other("STICKY".to_string())
        );
        assert_eq!(String::from(NodeKind::ComponentSet), "COMPONENT_SET");
        assert_eq!(NodeKind::Other("WIDGET".into()).to_string(), "WIDGET");
    }

    #[test]
    fn design_node_deserializes_from_rest_shape() {
        let json = r#"{
            "id": "1:2",
            "name": "Home",
            "type": "FRAME",
            "absoluteBoundingBox": {"x": 0, "y": 0, "width": 390, "height": 844},
            "fills": [{"type": "SOLID", "color": {"r": 1, "g": 1, "b": 1, "a": 1}}],
            "styles": {"fill": "S:1"},
            "itemSpacing": 16,
            "children": [{"id": "1:3", "name": "Title", "type": "TEXT", "characters": "Hi"}]
        }"#;
        let node: DesignNode = serde_json::from_str(json).expect("parse");
        assert_eq!(node.kind, NodeKind::Frame);
        assert!(node.visible);
        assert_eq!(node.item_spacing, Some(16.0));
        assert_eq!(node.styles.get("fill").map(String::as_str), Some("S:1"));
        assert_eq!(node.children[0].characters.as_deref(), Some("Hi"));
        assert_eq!(node.solid_fill().map(|c| c.to_hex()), Some("#ffffff".into()));
    }

    #[test]
    fn color_hex_includes_alpha_only_when_translucent() {
        let c = Color { r: 1.0, g: 0.0, b: 0.0, a: 1.0 };
        assert_eq!(c.to_hex(), "#ff0000");
        let c = Color { r: 0.0, g: 0.0, b: 0.0, a: 0.5 };
        assert_eq!(c.to_hex(), "#00000080");
    }

    #[test]
    fn invisible_or_non_solid_paint_has_no_color() {
        let paint = Paint {
            kind: "GRADIENT_LINEAR".into(),
            visible: true,
            color: Some(Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 }),
            opacity: None,
        };
        assert!(paint.solid_color().is_none());
        let paint = Paint {
            kind: "SOLID".into(),
            visible: false,
            ..paint
        };
        assert!(paint.solid_color().is_none());
    }

    #[test]
    fn tree_hash_ignores_the_hash_field_itself() {
        let tree = IntermediateTree::new(
            DocumentId::from("doc"),
            "Doc".into(),
            vec![],
            BTreeMap::new(),
        )
        .expect("tree");
        let mut tampered = tree.clone();
        tampered.hash = TreeHash("bogus".into());
        assert_eq!(tampered.content_hash().unwrap(), tree.hash);
        assert_eq!(tree.hash.0.len(), 64);
        assert_eq!(tree.hash.short(8).len(), 8);
    }

    #[test]
    fn generated_file_set_is_path_ordered() {
        let mut set = GeneratedFileSet::new(TreeHash("h".into()));
        set.insert("b/index.ts", "b");
        set.insert("a/tokens.ts", "a");
        let paths: Vec<_> = set.paths().collect();
        assert_eq!(paths, vec!["a/tokens.ts", "b/index.ts"]);
        assert_eq!(set.get("a/tokens.ts"), Some("a"));
        assert_eq!(set.len(), 2);
    }
}
