//! Design normalizer: [`DesignDocument`] → [`IntermediateTree`].
//!
//! # Policy
//!
//! 1. Only the first page (first child of the document root) is read.
//! 2. Each top-level child of that page with a frame-like kind (frame,
//!    component, component set, section) becomes a screen, in page order.
//!    Other top-level children are ignored.
//! 3. Descendants are normalized depth-first in sibling order. A node of a
//!    kind the generator does not support is dropped, but its children are
//!    visited and hoisted into its place.
//! 4. A node with `visible: false` is dropped together with its subtree.
//! 5. A shared style resolves to the first solid fill (depth-first order)
//!    found on a node that references it.
//! 6. The tree hash covers the whole normalized tree.
//!
//! The only errors are structural: a node id used twice anywhere in the
//! document, or nesting deeper than [`MAX_DEPTH`]. The owned node type
//! cannot express reference cycles.

use std::collections::{BTreeMap, HashSet};

use figsync_core::types::{
    DesignDocument, DesignNode, IntermediateTree, IrKind, IrNode, NodeKind, Padding,
    ResolvedStyle, Screen, SharedStyle,
};

use crate::error::GenerationError;

/// Deepest nesting accepted, counting the document root as depth 0.
pub const MAX_DEPTH: usize = 64;

/// Normalize a fetched document. Deterministic for identical input.
pub fn normalize(document: &DesignDocument) -> Result<IntermediateTree, GenerationError> {
    check_structure(&document.root)?;

    let mut normalizer = Normalizer {
        shared: &document.metadata.styles,
        resolved_colors: BTreeMap::new(),
    };

    let mut screens = Vec::new();
    if let Some(page) = document.root.children.first() {
        for child in &page.children {
            if !child.visible || !child.kind.is_frame_like() {
                continue;
            }
            let kind = screen_kind(&child.kind);
            let root = normalizer.node(child, kind);
            screens.push(Screen {
                node_id: child.id.clone(),
                name: child.name.clone(),
                root,
            });
        }
    }

    let styles = normalizer.resolved_styles();
    let tree = IntermediateTree::new(
        document.id.clone(),
        document.name.clone(),
        screens,
        styles,
    )?;
    tracing::debug!(
        document = %tree.document_id,
        screens = tree.screens.len(),
        hash = tree.hash.short(12),
        "normalized design document"
    );
    Ok(tree)
}

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

/// Duplicate ids and excessive depth, reported in document order.
fn check_structure(root: &DesignNode) -> Result<(), GenerationError> {
    let mut seen = HashSet::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            return Err(GenerationError::TooDeep {
                node_id: node.id.clone(),
                max_depth: MAX_DEPTH,
            });
        }
        if !seen.insert(&node.id) {
            return Err(GenerationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
        for child in node.children.iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tree conversion
// ---------------------------------------------------------------------------

fn screen_kind(kind: &NodeKind) -> IrKind {
    IrKind::from_node_kind(kind).unwrap_or(IrKind::Component)
}

struct Normalizer<'a> {
    shared: &'a BTreeMap<String, SharedStyle>,
    /// First solid color seen per referenced style id.
    resolved_colors: BTreeMap<String, String>,
}

impl Normalizer<'_> {
    fn node(&mut self, node: &DesignNode, kind: IrKind) -> IrNode {
        let fill = node.solid_fill().map(|c| c.to_hex());
        let fill_style = node.styles.get("fill").and_then(|style_id| {
            if let Some(color) = &fill {
                self.resolved_colors
                    .entry(style_id.clone())
                    .or_insert_with(|| color.clone());
            }
            self.shared.get(style_id).map(|s| s.name.clone())
        });

        IrNode {
            id: node.id.clone(),
            kind,
            name: node.name.clone(),
            bounds: node.absolute_bounding_box,
            fill,
            fill_style,
            corner_radius: node.corner_radius.filter(|r| *r > 0.0),
            item_spacing: node.item_spacing,
            padding: padding(node),
            text: match kind {
                IrKind::Text => node.characters.clone(),
                _ => None,
            },
            component_id: node.component_id.clone(),
            children: self.children(node),
        }
    }

    fn children(&mut self, parent: &DesignNode) -> Vec<IrNode> {
        let mut out = Vec::new();
        for child in &parent.children {
            if !child.visible {
                continue;
            }
            match IrKind::from_node_kind(&child.kind) {
                Some(kind) => out.push(self.node(child, kind)),
                None => out.extend(self.children(child)),
            }
        }
        out
    }

    fn resolved_styles(&self) -> BTreeMap<String, ResolvedStyle> {
        self.shared
            .iter()
            .map(|(id, style)| {
                (
                    id.clone(),
                    ResolvedStyle {
                        name: style.name.clone(),
                        style_type: style.style_type.clone(),
                        color: self.resolved_colors.get(id).cloned(),
                    },
                )
            })
            .collect()
    }
}

fn padding(node: &DesignNode) -> Option<Padding> {
    let sides = [
        node.padding_top,
        node.padding_right,
        node.padding_bottom,
        node.padding_left,
    ];
    if sides.iter().all(Option::is_none) {
        return None;
    }
    Some(Padding {
        top: node.padding_top.unwrap_or(0.0),
        right: node.padding_right.unwrap_or(0.0),
        bottom: node.padding_bottom.unwrap_or(0.0),
        left: node.padding_left.unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figsync_core::types::{Color, DocumentMetadata, Paint};
    use figsync_core::{DocumentId, NodeId};

    fn solid(r: f64, g: f64, b: f64) -> Paint {
        Paint {
            kind: "SOLID".into(),
            visible: true,
            color: Some(Color { r, g, b, a: 1.0 }),
            opacity: None,
        }
    }

    fn document(page_children: Vec<DesignNode>) -> DesignDocument {
        let page = DesignNode::new("0:1", NodeKind::Canvas, "Page 1").with_children(page_children);
        DesignDocument {
            id: DocumentId::from("DOC"),
            name: "App".into(),
            root: DesignNode::new("0:0", NodeKind::Document, "Document").with_children(vec![page]),
            metadata: DocumentMetadata::default(),
        }
    }

    #[test]
    fn only_frame_like_page_children_become_screens() {
        let doc = document(vec![
            DesignNode::new("1:1", NodeKind::Frame, "Home"),
            DesignNode::new("1:2", NodeKind::Text, "Loose label"),
            DesignNode::new("1:3", NodeKind::Component, "Button"),
            DesignNode::new("1:4", NodeKind::ComponentSet, "Variants"),
        ]);
        let tree = normalize(&doc).expect("normalize");
        let names: Vec<_> = tree.screens.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Home", "Button", "Variants"]);
        assert_eq!(tree.screens[2].root.kind, IrKind::Component);
    }

    #[test]
    fn second_page_is_ignored() {
        let mut doc = document(vec![DesignNode::new("1:1", NodeKind::Frame, "Home")]);
        doc.root.children.push(
            DesignNode::new("0:2", NodeKind::Canvas, "Archive")
                .with_children(vec![DesignNode::new("2:1", NodeKind::Frame, "Old")]),
        );
        let tree = normalize(&doc).expect("normalize");
        assert_eq!(tree.screens.len(), 1);
    }

    #[test]
    fn empty_document_has_no_screens() {
        let doc = DesignDocument {
            id: DocumentId::from("DOC"),
            name: "Empty".into(),
            root: DesignNode::new("0:0", NodeKind::Document, "Document"),
            metadata: DocumentMetadata::default(),
        };
        let tree = normalize(&doc).expect("normalize");
        assert!(tree.screens.is_empty());
    }

    #[test]
    fn hidden_nodes_drop_their_subtree() {
        let mut hidden = DesignNode::new("1:2", NodeKind::Group, "Hidden")
            .with_children(vec![DesignNode::new("1:3", NodeKind::Text, "Inside")]);
        hidden.visible = false;
        let mut hidden_screen = DesignNode::new("1:9", NodeKind::Frame, "Draft");
        hidden_screen.visible = false;
        let doc = document(vec![
            DesignNode::new("1:1", NodeKind::Frame, "Home").with_children(vec![hidden]),
            hidden_screen,
        ]);
        let tree = normalize(&doc).expect("normalize");
        assert_eq!(tree.screens.len(), 1);
        assert!(tree.screens[0].root.children.is_empty());
    }

    #[test]
    fn unsupported_nodes_hoist_their_children() {
        let boolean = DesignNode::new("1:2", NodeKind::BooleanOperation, "Union").with_children(
            vec![
                DesignNode::new("1:3", NodeKind::Vector, "A"),
                DesignNode::new("1:4", NodeKind::Other("STICKY".into()), "Note"),
            ],
        );
        let doc = document(vec![DesignNode::new("1:1", NodeKind::Frame, "Home")
            .with_children(vec![boolean, DesignNode::new("1:5", NodeKind::Text, "After")])]);
        let tree = normalize(&doc).expect("normalize");
        let ids: Vec<_> = tree.screens[0]
            .root
            .children
            .iter()
            .map(|n| n.id.0.as_str())
            .collect();
        assert_eq!(ids, vec!["1:3", "1:5"]);
    }

    #[test]
    fn shared_style_resolves_to_first_fill_in_document_order() {
        let mut first = DesignNode::new("1:2", NodeKind::Rectangle, "Card");
        first.fills = vec![solid(1.0, 0.0, 0.0)];
        first.styles.insert("fill".into(), "S:1".into());
        let mut second = DesignNode::new("1:3", NodeKind::Rectangle, "Card 2");
        second.fills = vec![solid(0.0, 0.0, 1.0)];
        second.styles.insert("fill".into(), "S:1".into());

        let mut doc = document(vec![
            DesignNode::new("1:1", NodeKind::Frame, "Home").with_children(vec![first, second])
        ]);
        doc.metadata.styles.insert(
            "S:1".into(),
            SharedStyle {
                key: "k".into(),
                name: "Brand/Primary".into(),
                style_type: "FILL".into(),
                description: String::new(),
            },
        );
        doc.metadata.styles.insert(
            "S:2".into(),
            SharedStyle {
                key: "k2".into(),
                name: "Unused".into(),
                style_type: "FILL".into(),
                description: String::new(),
            },
        );

        let tree = normalize(&doc).expect("normalize");
        assert_eq!(tree.styles["S:1"].color.as_deref(), Some("#ff0000"));
        assert_eq!(tree.styles["S:2"].color, None);
        assert_eq!(
            tree.screens[0].root.children[1].fill_style.as_deref(),
            Some("Brand/Primary")
        );
    }

    #[test]
    fn duplicate_node_id_is_named() {
        let doc = document(vec![
            DesignNode::new("1:1", NodeKind::Frame, "Home"),
            DesignNode::new("1:1", NodeKind::Frame, "Copy"),
        ]);
        match normalize(&doc) {
            Err(GenerationError::DuplicateNodeId { node_id }) => {
                assert_eq!(node_id, NodeId::from("1:1"))
            }
            other => panic!("expected DuplicateNodeId, got {other:?}"),
        }
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let mut node = DesignNode::new("deep", NodeKind::Group, "Deepest");
        for i in 0..MAX_DEPTH {
            node = DesignNode::new(format!("g{i}"), NodeKind::Group, "g").with_children(vec![node]);
        }
        let doc = document(vec![DesignNode::new("1:1", NodeKind::Frame, "Home")
            .with_children(vec![node])]);
        let err = normalize(&doc).unwrap_err();
        assert!(matches!(err, GenerationError::TooDeep { .. }), "got {err}");
    }

    #[test]
    fn normalization_is_deterministic() {
        let mut card = DesignNode::new("1:2", NodeKind::Frame, "Card");
        card.item_spacing = Some(8.0);
        card.padding_top = Some(16.0);
        let doc = document(vec![
            DesignNode::new("1:1", NodeKind::Frame, "Home").with_children(vec![card])
        ]);
        let a = normalize(&doc).expect("a");
        let b = normalize(&doc.clone()).expect("b");
        assert_eq!(a, b);
        assert_eq!(a.hash, b.hash);
        let padding = a.screens[0].root.children[0].padding.expect("padding");
        assert_eq!((padding.top, padding.left), (16.0, 0.0));
    }

    #[test]
    fn text_content_only_kept_on_text_nodes() {
        let mut label = DesignNode::new("1:2", NodeKind::Text, "Title");
        label.characters = Some("Welcome".into());
        let mut frame = DesignNode::new("1:1", NodeKind::Frame, "Home").with_children(vec![label]);
        frame.characters = Some("stray".into());
        let tree = normalize(&document(vec![frame])).expect("normalize");
        assert_eq!(tree.screens[0].root.text, None);
        assert_eq!(tree.screens[0].root.children[0].text.as_deref(), Some("Welcome"));
    }
}
