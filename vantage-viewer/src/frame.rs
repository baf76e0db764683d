use cgmath::Matrix4;
use vantage_scene::{
    camera,
    document::{ATTRIBUTE_SLOT_COUNT, ComponentType, Document},
    graph::SceneGraph,
};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("unsupported index component type {0:?} (only u16 and u32 indices are drawable)")]
    UnsupportedIndexType(ComponentType),
}

/// Width of an index element, as bindable by the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    U16,
    U32,
}

impl TryFrom<ComponentType> for IndexKind {
    type Error = PlanError;

    fn try_from(component: ComponentType) -> Result<Self, PlanError> {
        match component {
            ComponentType::U16 => Ok(Self::U16),
            ComponentType::U32 => Ok(Self::U32),
            // Byte indices would bind but draw garbage; refuse them outright.
            other => Err(PlanError::UnsupportedIndexType(other)),
        }
    }
}

/// An index buffer region for one indexed draw.
#[derive(Debug, Clone, Copy)]
pub struct IndexedDraw {
    pub buffer: usize,
    pub offset: u64,
    pub count: u32,
    pub kind: IndexKind,
}

/// One vertex binding slot: a document buffer index plus byte offset, or
/// `None` for a slot the primitive does not populate.
pub type SlotBinding = Option<(usize, u64)>;

/// Everything needed to record one draw, with no API handles involved.
#[derive(Debug, Clone)]
pub struct DrawCall {
    /// The owning node's world transform, column major.
    pub model: [f32; 16],
    pub bindings: [SlotBinding; ATTRIBUTE_SLOT_COUNT],
    pub vertex_count: u32,
    pub indices: Option<IndexedDraw>,
}

/// The complete draw list for one frame, in scene traversal order.
#[derive(Debug, Clone)]
pub struct FramePlan {
    /// Combined projection-view matrix, column major.
    pub view_projection: [f32; 16],
    pub draws: Vec<DrawCall>,
}

/// Walks the scene graph depth-first and produces the frame's draw list.
///
/// Pure data in, pure data out; command recording consumes the plan
/// separately. The camera is the first camera node in traversal order, or
/// the built-in default when the document defines none.
pub fn plan_frame(
    document: &Document,
    graph: &SceneGraph,
    aspect: f32,
) -> Result<FramePlan, PlanError> {
    let view_projection = graph
        .first_camera()
        .and_then(|(index, world)| {
            document
                .cameras
                .get(index)
                .map(|definition| camera::view_projection(definition, world, aspect))
        })
        .unwrap_or_else(camera::default_view_projection);

    let mut visited: Vec<(Matrix4<f32>, usize)> = Vec::new();
    graph.traverse(|_, node| {
        if let Some(mesh) = node.mesh {
            visited.push((node.current, mesh));
        }
    });

    let mut draws = Vec::new();
    for (world, mesh_index) in visited {
        let Some(mesh) = document.meshes.get(mesh_index) else {
            continue;
        };
        let model: [f32; 16] = *world.as_ref();

        for primitive in &mesh.primitives {
            let mut bindings: [SlotBinding; ATTRIBUTE_SLOT_COUNT] = Default::default();
            for (slot, accessor) in primitive.attributes.iter().enumerate() {
                if let Some(accessor) = accessor {
                    bindings[slot] = Some((accessor.buffer, accessor.offset as u64));
                }
            }

            let indices = primitive
                .indices
                .map(|accessor| {
                    Ok(IndexedDraw {
                        buffer: accessor.buffer,
                        offset: accessor.offset as u64,
                        count: accessor.count as u32,
                        kind: accessor.component.try_into()?,
                    })
                })
                .transpose()?;

            if primitive.vertex_count == 0 && indices.is_none() {
                continue;
            }

            draws.push(DrawCall {
                model,
                bindings,
                vertex_count: primitive.vertex_count as u32,
                indices,
            });
        }
    }

    Ok(FramePlan {
        view_projection: *view_projection.as_ref(),
        draws,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_scene::document::{Accessor, AttributeSlot, Mesh, Node, Primitive};

    fn position_accessor(count: usize) -> Accessor {
        Accessor {
            buffer: 0,
            offset: 0,
            count,
            component: ComponentType::F32,
        }
    }

    fn single_mesh_document(primitive: Primitive) -> Document {
        Document {
            buffers: vec![vec![0u8; 1024]],
            nodes: vec![Node {
                name: None,
                transform: Matrix4::from_scale(1.0),
                mesh: Some(0),
                camera: None,
                children: vec![],
            }],
            meshes: vec![Mesh {
                primitives: vec![primitive],
            }],
            cameras: vec![],
            roots: vec![0],
        }
    }

    fn indexed_primitive(component: ComponentType) -> Primitive {
        let mut attributes: [Option<Accessor>; ATTRIBUTE_SLOT_COUNT] = Default::default();
        attributes[AttributeSlot::Position as usize] = Some(position_accessor(4));
        Primitive {
            attributes,
            indices: Some(Accessor {
                buffer: 0,
                offset: 256,
                count: 6,
                component,
            }),
            vertex_count: 4,
        }
    }

    #[test]
    fn position_only_triangle_yields_one_plain_draw() {
        let mut attributes: [Option<Accessor>; ATTRIBUTE_SLOT_COUNT] = Default::default();
        attributes[AttributeSlot::Position as usize] = Some(position_accessor(3));
        let document = single_mesh_document(Primitive {
            attributes,
            indices: None,
            vertex_count: 3,
        });
        let graph = SceneGraph::build(&document);

        let plan = plan_frame(&document, &graph, 1.0).unwrap();

        assert_eq!(plan.draws.len(), 1);
        let draw = &plan.draws[0];
        assert_eq!(draw.vertex_count, 3);
        assert!(draw.indices.is_none());
        assert!(draw.bindings[AttributeSlot::Position as usize].is_some());
        for slot in 1..ATTRIBUTE_SLOT_COUNT {
            assert!(draw.bindings[slot].is_none());
        }
    }

    #[test]
    fn u16_indices_plan_a_16_bit_indexed_draw() {
        let document = single_mesh_document(indexed_primitive(ComponentType::U16));
        let graph = SceneGraph::build(&document);

        let plan = plan_frame(&document, &graph, 1.0).unwrap();
        let indices = plan.draws[0].indices.unwrap();
        assert_eq!(indices.kind, IndexKind::U16);
        assert_eq!(indices.count, 6);
        assert_eq!(indices.offset, 256);
    }

    #[test]
    fn u32_indices_plan_a_32_bit_indexed_draw() {
        let document = single_mesh_document(indexed_primitive(ComponentType::U32));
        let graph = SceneGraph::build(&document);

        let plan = plan_frame(&document, &graph, 1.0).unwrap();
        assert_eq!(plan.draws[0].indices.unwrap().kind, IndexKind::U32);
    }

    #[test]
    fn u8_indices_are_rejected_without_planning_a_draw() {
        let document = single_mesh_document(indexed_primitive(ComponentType::U8));
        let graph = SceneGraph::build(&document);

        let result = plan_frame(&document, &graph, 1.0);
        assert!(matches!(
            result,
            Err(PlanError::UnsupportedIndexType(ComponentType::U8))
        ));
    }

    #[test]
    fn cameraless_document_uses_the_deterministic_default() {
        let mut attributes: [Option<Accessor>; ATTRIBUTE_SLOT_COUNT] = Default::default();
        attributes[AttributeSlot::Position as usize] = Some(position_accessor(3));
        let document = single_mesh_document(Primitive {
            attributes,
            indices: None,
            vertex_count: 3,
        });
        let graph = SceneGraph::build(&document);

        let a = plan_frame(&document, &graph, 1.0).unwrap();
        let b = plan_frame(&document, &graph, 1.0).unwrap();

        let expected: [f32; 16] = *camera::default_view_projection().as_ref();
        for ((x, y), z) in a.view_projection.iter().zip(&b.view_projection).zip(&expected) {
            assert_eq!(x.to_bits(), y.to_bits());
            assert_eq!(x.to_bits(), z.to_bits());
        }
    }

    #[test]
    fn draws_follow_scene_traversal_order() {
        // Two sibling nodes with distinct transforms, each with the same mesh.
        let mut attributes: [Option<Accessor>; ATTRIBUTE_SLOT_COUNT] = Default::default();
        attributes[AttributeSlot::Position as usize] = Some(position_accessor(3));
        let document = Document {
            buffers: vec![vec![0u8; 64]],
            nodes: vec![
                Node {
                    name: None,
                    transform: Matrix4::from_scale(2.0),
                    mesh: Some(0),
                    camera: None,
                    children: vec![],
                },
                Node {
                    name: None,
                    transform: Matrix4::from_scale(3.0),
                    mesh: Some(0),
                    camera: None,
                    children: vec![],
                },
            ],
            meshes: vec![Mesh {
                primitives: vec![Primitive {
                    attributes,
                    indices: None,
                    vertex_count: 3,
                }],
            }],
            cameras: vec![],
            roots: vec![0, 1],
        };
        let graph = SceneGraph::build(&document);

        let plan = plan_frame(&document, &graph, 1.0).unwrap();
        assert_eq!(plan.draws.len(), 2);
        assert_eq!(plan.draws[0].model[0], 2.0);
        assert_eq!(plan.draws[1].model[0], 3.0);
    }
}
