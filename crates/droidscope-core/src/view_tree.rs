//! # View Tree
//!
//! Arena-backed tree of [`ViewNode`]s rebuilt from a pre-order ViewServer dump.
//!
//! Each dump line is one view; its leading spaces encode depth. Real devices
//! indent one space per level, hand-written fixtures often use two, so the
//! builder compares indentation columns rather than dividing by a fixed unit.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::selector::CompiledSelector;
use crate::view_node::{NodeId, ViewNode};

const INSPECT_INDENT: &str = "    ";

// ============================================================================
// ViewTree
// ============================================================================

/// A dump reconstructed as a tree under a synthetic `Root` node.
///
/// Nodes are stored in dump (pre-order) order; `NodeId(0)` is always the root.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewTree {
    nodes: Vec<ViewNode>,
}

impl Default for ViewTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewTree {
    /// Create a tree holding only the synthetic root.
    pub fn new() -> Self {
        Self {
            nodes: vec![ViewNode::root()],
        }
    }

    /// Build a tree from the full text of a dump response.
    pub fn from_dump(text: &str) -> Result<Self> {
        Self::from_lines(text.lines())
    }

    /// Build a tree from dump lines in pre-order.
    ///
    /// Blank lines are skipped. Any malformed line aborts the whole build.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] if there are no non-blank lines, [`Error::Parse`]
    /// for the first malformed line.
    pub fn from_lines<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();

        // (indent column, node); the root's column is below every real line.
        let mut open: Vec<(Option<usize>, NodeId)> = vec![(None, NodeId::ROOT)];

        for line in lines {
            let line = line.as_ref().trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let indent = indent_of(line);
            let node = ViewNode::parse(line)?;

            while open
                .last()
                .is_some_and(|(column, _)| column.is_some_and(|c| c >= indent))
            {
                open.pop();
            }

            let parent = open.last().map_or(NodeId::ROOT, |(_, id)| *id);
            let id = tree.attach(parent, node);
            open.push((Some(indent), id));
        }

        if tree.len() == 1 {
            return Err(Error::protocol("dump contained no view lines"));
        }

        tracing::trace!("built view tree with {} nodes", tree.len() - 1);
        Ok(tree)
    }

    /// Attach `node` as the last child of `parent`, fixing up its level and back-reference.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not belong to this tree.
    pub fn attach(&mut self, parent: NodeId, mut node: ViewNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.level = self.nodes[parent.0].level + 1;
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// The synthetic root.
    pub fn root(&self) -> &ViewNode {
        &self.nodes[NodeId::ROOT.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&ViewNode> {
        self.nodes.get(id.0)
    }

    /// Children of `id` in dump order. Empty for unknown ids.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &ViewNode)> + '_ {
        self.get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |child| (*child, &self.nodes[child.0]))
    }

    pub fn parent(&self, id: NodeId) -> Option<(NodeId, &ViewNode)> {
        let parent = self.get(id)?.parent?;
        Some((parent, &self.nodes[parent.0]))
    }

    /// Number of nodes, including the synthetic root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds nothing but the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Pre-order traversal, starting with the root.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ViewNode)> + '_ {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// First node in pre-order matched by `selector`.
    pub fn find(&self, selector: &CompiledSelector) -> Option<(NodeId, &ViewNode)> {
        self.iter().find(|(_, node)| selector.matches(node))
    }

    /// Every node matched by `selector`, in pre-order.
    pub fn find_all<'a>(
        &'a self,
        selector: &'a CompiledSelector,
    ) -> impl Iterator<Item = (NodeId, &'a ViewNode)> + 'a {
        self.iter().filter(move |(_, node)| selector.matches(node))
    }

    /// Render the tree as indented pseudo-XML listing each node's property groups.
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        self.inspect_node(NodeId::ROOT, &mut out);
        out
    }

    fn inspect_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        let indent = INSPECT_INDENT.repeat(node.level);

        let _ = write!(out, "{indent}<{}", node.class_name);
        for (group, props) in &node.properties_group {
            let _ = write!(out, "\n{indent}{INSPECT_INDENT}{group} => ");
            for (key, value) in props {
                let _ = write!(out, "\n{indent}{INSPECT_INDENT}{INSPECT_INDENT}{key}=\"{value}\"");
            }
        }

        if node.children.is_empty() {
            out.push_str(" />\n");
            return;
        }

        out.push_str(">\n");
        for child in &node.children {
            self.inspect_node(*child, out);
        }
        let _ = writeln!(out, "{indent}</{}>", node.class_name);
    }
}

/// Leading-space count of a raw dump line.
pub(crate) fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

// ============================================================================
// Tests
// ============================================================================
