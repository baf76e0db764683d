use cgmath::{Matrix4, SquareMatrix};

use crate::document::Document;

/// Index of a node in the [`SceneGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

/// One node of the built scene tree.
///
/// `current` is the node's world transform, recomputed as the parent's
/// current transform times the node's base transform. For the synthetic root
/// it is always identity.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Authoring-time local transform; never mutated by traversal.
    pub base: Matrix4<f32>,
    /// World transform as of the last propagation.
    pub current: Matrix4<f32>,
    /// Index into the document's mesh table.
    pub mesh: Option<usize>,
    /// Index into the document's camera table.
    pub camera: Option<usize>,
}

/// The scene tree, stored as an arena and addressed by [`NodeId`].
///
/// Index 0 is a synthetic root with identity transform whose children are the
/// document's top-level nodes. Matrices are column major, composed as
/// `parent * child`, matching how the vertex shader applies them.
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl SceneGraph {
    /// Builds the tree from a resolved document.
    ///
    /// Every node's current transform is computed during construction, so the
    /// graph is renderable immediately, with no propagation pass required for
    /// a static scene.
    pub fn build(document: &Document) -> Self {
        let mut graph = Self {
            nodes: vec![SceneNode {
                parent: None,
                children: Vec::new(),
                base: Matrix4::identity(),
                current: Matrix4::identity(),
                mesh: None,
                camera: None,
            }],
        };

        let root = graph.root();
        for &index in &document.roots {
            graph.add_subtree(document, index, root);
        }

        log::debug!("Scene graph built: {} nodes", graph.nodes.len());
        graph
    }

    fn add_subtree(&mut self, document: &Document, index: usize, parent: NodeId) -> NodeId {
        let source = &document.nodes[index];
        let current = self.nodes[parent.0].current * source.transform;

        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneNode {
            parent: Some(parent),
            children: Vec::new(),
            base: source.transform,
            current,
            mesh: source.mesh,
            camera: source.camera,
        });
        self.nodes[parent.0].children.push(id);

        for &child in &source.children {
            self.add_subtree(document, child, id);
        }

        id
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sets one node's current transform from its parent's.
    pub fn apply_transform(&mut self, id: NodeId, parent_current: Matrix4<f32>) {
        let node = &mut self.nodes[id.0];
        node.current = parent_current * node.base;
    }

    /// Recomputes every node's current transform top-down.
    ///
    /// Call after mutating any base transform; child transforms pick up the
    /// ancestor change before the next traversal reads them.
    pub fn propagate(&mut self) {
        self.propagate_from(self.root(), Matrix4::identity());
    }

    fn propagate_from(&mut self, id: NodeId, parent_current: Matrix4<f32>) {
        self.apply_transform(id, parent_current);
        let current = self.nodes[id.0].current;
        // Children are appended in construction order, so cloning the list
        // keeps traversal order stable while the arena is mutated.
        let children = self.nodes[id.0].children.clone();
        for child in children {
            self.propagate_from(child, current);
        }
    }

    /// Visits every node depth-first, pre-order: a node is visited before any
    /// of its children.
    pub fn traverse(&self, mut visit: impl FnMut(NodeId, &SceneNode)) {
        self.traverse_from(self.root(), &mut visit);
    }

    fn traverse_from(&self, id: NodeId, visit: &mut impl FnMut(NodeId, &SceneNode)) {
        visit(id, &self.nodes[id.0]);
        for &child in &self.nodes[id.0].children {
            self.traverse_from(child, visit);
        }
    }

    /// The current transform of the first camera node found in traversal
    /// order, with its camera table index.
    pub fn first_camera(&self) -> Option<(usize, Matrix4<f32>)> {
        let mut found = None;
        self.traverse(|_, node| {
            if found.is_none() {
                if let Some(camera) = node.camera {
                    found = Some((camera, node.current));
                }
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;

    fn document_node(transform: Matrix4<f32>, children: Vec<usize>) -> Node {
        Node {
            name: None,
            transform,
            mesh: None,
            camera: None,
            children,
        }
    }

    fn chain_document() -> Document {
        // 0 -> 1 -> 2, each with a distinct transform.
        Document {
            nodes: vec![
                document_node(Matrix4::from_translation([1.0, 0.0, 0.0].into()), vec![1]),
                document_node(Matrix4::from_scale(2.0), vec![2]),
                document_node(Matrix4::from_translation([0.0, 3.0, 0.0].into()), vec![]),
            ],
            roots: vec![0],
            ..Default::default()
        }
    }

    #[test]
    fn root_transform_is_identity() {
        let graph = SceneGraph::build(&chain_document());
        assert_eq!(graph.node(graph.root()).current, Matrix4::identity());
    }

    #[test]
    fn current_is_parent_current_times_base() {
        let graph = SceneGraph::build(&chain_document());
        graph.traverse(|_, node| {
            let Some(parent) = node.parent else { return };
            let expected = graph.node(parent).current * node.base;
            assert_eq!(node.current, expected);
        });
    }

    #[test]
    fn two_level_hierarchy_composes_in_parent_to_child_order() {
        let document = chain_document();
        let graph = SceneGraph::build(&document);

        let mut leaf_current = None;
        graph.traverse(|_, node| {
            if node.children.is_empty() && node.parent.is_some() {
                leaf_current = Some(node.current);
            }
        });

        let expected = document.nodes[0].transform
            * document.nodes[1].transform
            * document.nodes[2].transform;
        assert_eq!(leaf_current, Some(expected));
    }

    #[test]
    fn propagation_is_idempotent() {
        let mut graph = SceneGraph::build(&chain_document());

        let before: Vec<Matrix4<f32>> = {
            let mut transforms = Vec::new();
            graph.traverse(|_, node| transforms.push(node.current));
            transforms
        };

        graph.propagate();
        graph.propagate();

        let mut after = Vec::new();
        graph.traverse(|_, node| after.push(node.current));

        // Bit-identical, not approximately equal.
        for (a, b) in before.iter().zip(&after) {
            let a: &[f32; 16] = a.as_ref();
            let b: &[f32; 16] = b.as_ref();
            for (x, y) in a.iter().zip(b) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }
    }

    #[test]
    fn traversal_is_depth_first_pre_order() {
        // root -> [a, b]; a -> [c]
        let document = Document {
            nodes: vec![
                document_node(Matrix4::identity(), vec![2]),
                document_node(Matrix4::identity(), vec![]),
                document_node(Matrix4::identity(), vec![]),
            ],
            roots: vec![0, 1],
            ..Default::default()
        };
        let graph = SceneGraph::build(&document);

        let mut order = Vec::new();
        graph.traverse(|id, _| order.push(id));

        // Synthetic root, then node 0, its child, then node 1.
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], graph.root());
        assert_eq!(graph.node(order[2]).parent, Some(order[1]));
        assert_eq!(graph.node(order[3]).parent, Some(graph.root()));
    }
}
