use cgmath::{Point3, Vector3};
use super::MaterialId;

/// Polygon mesh in the host's loop-based layout.
///
/// Vertices hold positions and group weights. Every polygon corner is a
/// "loop" that points at a vertex and carries the split normal, so hard
/// edges and UV seams live on loops, not vertices.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<MeshVertex>,
    pub loops: Vec<Loop>,
    pub polygons: Vec<Polygon>,
    pub uv_layers: Vec<UvLayer>,
    pub color_layers: Vec<ColorLayer>,
    /// Material slots. A slot can be empty.
    pub materials: Vec<Option<MaterialId>>,
    /// Shape keys; the first one is the basis.
    pub shape_keys: Vec<ShapeKey>,
}

#[derive(Debug, Clone)]
pub struct MeshVertex {
    pub co: Point3<f64>,
    pub groups: Vec<VertexGroupWeight>,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexGroupWeight {
    /// Index into the owning node's `vertex_groups`.
    pub group: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Loop {
    pub vertex: usize,
    pub normal: Vector3<f64>,
    pub tangent: Option<Tangent>,
}

#[derive(Debug, Clone, Copy)]
pub struct Tangent {
    pub tangent: Vector3<f64>,
    pub bitangent: Vector3<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct Polygon {
    pub loop_start: usize,
    pub loop_total: usize,
    pub material_index: usize,
}

impl Polygon {
    pub fn loops(&self) -> std::ops::Range<usize> {
        self.loop_start..self.loop_start + self.loop_total
    }
}

/// One UV per loop.
#[derive(Debug, Clone)]
pub struct UvLayer {
    pub name: String,
    pub data: Vec<[f64; 2]>,
}

/// One RGB color per loop.
#[derive(Debug, Clone)]
pub struct ColorLayer {
    pub name: String,
    pub data: Vec<[f64; 3]>,
}

#[derive(Debug, Clone)]
pub struct ShapeKey {
    pub name: String,
    /// Absolute per-vertex positions for this key.
    pub positions: Vec<Point3<f64>>,
    pub value: f32,
}

impl Mesh {
    pub fn new(name: &str) -> Mesh {
        Mesh { name: name.to_string(), ..Default::default() }
    }

    /// Appends a polygon made of one new loop per listed vertex, all sharing
    /// `normal`.
    pub fn add_polygon(&mut self, verts: &[usize], normal: Vector3<f64>, material_index: usize) {
        let loop_start = self.loops.len();
        for &vertex in verts {
            self.loops.push(Loop { vertex, normal, tangent: None });
        }
        self.polygons.push(Polygon {
            loop_start,
            loop_total: verts.len(),
            material_index,
        });
    }

    pub fn has_shape_keys(&self) -> bool {
        !self.shape_keys.is_empty()
    }

    pub fn has_tangents(&self) -> bool {
        !self.loops.is_empty() && self.loops.iter().all(|l| l.tangent.is_some())
    }
}

#[test]
fn test_add_polygon() {
    use cgmath::vec3;
    let mut mesh = Mesh::new("Quad");
    for &(x, y) in &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
        mesh.vertices.push(MeshVertex { co: Point3::new(x, y, 0.0), groups: vec![] });
    }
    mesh.add_polygon(&[0, 1, 2, 3], vec3(0.0, 0.0, 1.0), 0);
    assert_eq!(mesh.loops.len(), 4);
    assert_eq!(mesh.polygons[0].loops(), 0..4);
    assert!(!mesh.has_tangents());
}
