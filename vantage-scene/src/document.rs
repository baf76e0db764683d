use std::path::Path;

use cgmath::Matrix4;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read scene file: {0}")]
    Import(#[from] gltf::Error),
    #[error("accessor {accessor} has no buffer view (sparse accessors are unsupported)")]
    SparseAccessor { accessor: usize },
}

/// The fixed vertex attribute slots the render pipeline binds.
///
/// The discriminant is the binding slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum AttributeSlot {
    Position = 0,
    Normal = 1,
    Tangent = 2,
    TexCoord0 = 3,
    TexCoord1 = 4,
    Color0 = 5,
}

pub const ATTRIBUTE_SLOT_COUNT: usize = 6;

/// Component type of an accessor's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    U8,
    U16,
    U32,
    I8,
    I16,
    F32,
}

impl From<gltf::accessor::DataType> for ComponentType {
    fn from(data_type: gltf::accessor::DataType) -> Self {
        use gltf::accessor::DataType;
        match data_type {
            DataType::U8 => Self::U8,
            DataType::U16 => Self::U16,
            DataType::U32 => Self::U32,
            DataType::I8 => Self::I8,
            DataType::I16 => Self::I16,
            DataType::F32 => Self::F32,
        }
    }
}

/// A resolved view into one of the document's raw byte buffers.
#[derive(Debug, Clone, Copy)]
pub struct Accessor {
    /// Index into [`Document::buffers`].
    pub buffer: usize,
    /// Byte offset of the first element (view offset plus accessor offset).
    pub offset: usize,
    /// Number of elements.
    pub count: usize,
    pub component: ComponentType,
}

/// One drawable unit of a mesh.
#[derive(Debug, Clone)]
pub struct Primitive {
    /// Accessors by binding slot; `None` slots are drawn with a null buffer.
    pub attributes: [Option<Accessor>; ATTRIBUTE_SLOT_COUNT],
    pub indices: Option<Accessor>,
    pub vertex_count: usize,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Clone)]
pub enum Camera {
    Perspective {
        /// Vertical field of view in radians.
        yfov: f32,
        /// Aspect ratio; `None` means use the viewport's.
        aspect: Option<f32>,
        znear: f32,
        /// `None` means an infinite far plane.
        zfar: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: Option<String>,
    /// Authoring-time local transform, column major.
    pub transform: Matrix4<f32>,
    pub mesh: Option<usize>,
    pub camera: Option<usize>,
    /// Indices into [`Document::nodes`].
    pub children: Vec<usize>,
}

/// A fully resolved scene document: raw buffers plus the node, mesh and
/// camera tables that reference them by index.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub buffers: Vec<Vec<u8>>,
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub cameras: Vec<Camera>,
    /// Top-level nodes of the default scene.
    pub roots: Vec<usize>,
}

impl Document {
    /// Reads and resolves a glTF file, external buffers included.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        log::info!("Loading scene from {}", path.display());

        let (document, buffer_data, _images) = gltf::import(path)?;

        let buffers = buffer_data.into_iter().map(|data| data.0).collect();

        let meshes = document
            .meshes()
            .map(|mesh| resolve_mesh(&mesh))
            .collect::<Result<Vec<_>, _>>()?;

        let cameras: Vec<Camera> =
            document.cameras().map(|camera| resolve_camera(&camera)).collect();

        let nodes = document
            .nodes()
            .map(|node| Node {
                name: node.name().map(str::to_owned),
                transform: Matrix4::from(node.transform().matrix()),
                mesh: node.mesh().map(|mesh| mesh.index()),
                camera: node.camera().map(|camera| camera.index()),
                children: node.children().map(|child| child.index()).collect(),
            })
            .collect::<Vec<_>>();

        let roots = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .map(|scene| scene.nodes().map(|node| node.index()).collect())
            .unwrap_or_default();

        log::debug!(
            "Resolved document: {} nodes, {} meshes, {} cameras, {} buffers",
            nodes.len(),
            meshes.len(),
            cameras.len(),
            document.buffers().len()
        );

        Ok(Self {
            buffers,
            nodes,
            meshes,
            cameras,
            roots,
        })
    }
}

fn resolve_mesh(mesh: &gltf::Mesh<'_>) -> Result<Mesh, DocumentError> {
    let primitives = mesh
        .primitives()
        .map(|primitive| {
            let mut attributes: [Option<Accessor>; ATTRIBUTE_SLOT_COUNT] = Default::default();
            let mut vertex_count = 0;

            for (semantic, accessor) in primitive.attributes() {
                let Some(slot) = slot_for_semantic(&semantic) else {
                    continue;
                };
                let resolved = resolve_accessor(&accessor)?;
                if slot == AttributeSlot::Position {
                    vertex_count = resolved.count;
                }
                attributes[slot as usize] = Some(resolved);
            }

            let indices = primitive
                .indices()
                .map(|accessor| resolve_accessor(&accessor))
                .transpose()?;

            Ok(Primitive {
                attributes,
                indices,
                vertex_count,
            })
        })
        .collect::<Result<Vec<_>, DocumentError>>()?;

    Ok(Mesh { primitives })
}

fn slot_for_semantic(semantic: &gltf::Semantic) -> Option<AttributeSlot> {
    use gltf::Semantic;
    match semantic {
        Semantic::Positions => Some(AttributeSlot::Position),
        Semantic::Normals => Some(AttributeSlot::Normal),
        Semantic::Tangents => Some(AttributeSlot::Tangent),
        Semantic::TexCoords(0) => Some(AttributeSlot::TexCoord0),
        Semantic::TexCoords(1) => Some(AttributeSlot::TexCoord1),
        Semantic::Colors(0) => Some(AttributeSlot::Color0),
        _ => None,
    }
}

fn resolve_accessor(accessor: &gltf::Accessor<'_>) -> Result<Accessor, DocumentError> {
    let view = accessor.view().ok_or(DocumentError::SparseAccessor {
        accessor: accessor.index(),
    })?;

    Ok(Accessor {
        buffer: view.buffer().index(),
        offset: view.offset() + accessor.offset(),
        count: accessor.count(),
        component: accessor.data_type().into(),
    })
}

fn resolve_camera(camera: &gltf::Camera<'_>) -> Camera {
    match camera.projection() {
        gltf::camera::Projection::Perspective(perspective) => Camera::Perspective {
            yfov: perspective.yfov(),
            aspect: perspective.aspect_ratio(),
            znear: perspective.znear(),
            zfar: perspective.zfar(),
        },
        gltf::camera::Projection::Orthographic(orthographic) => Camera::Orthographic {
            xmag: orthographic.xmag(),
            ymag: orthographic.ymag(),
            znear: orthographic.znear(),
            zfar: orthographic.zfar(),
        },
    }
}
