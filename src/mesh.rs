//! Host-side scene description consumed by the projector.
use std::sync::Arc;

use nalgebra::{Matrix4, Point3, Vector3};

use crate::bounds::Aabb;
use crate::error::{Error, Result};
use crate::shot::RasterShot;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MeshVertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub deleted: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MeshFace {
    /// Indices into the mesh's vertex storage
    pub vertices: [usize; 3],
    pub deleted: bool,
}

#[derive(Clone, Debug)]
pub struct Mesh {
    id: MeshId,
    vertices: Vec<MeshVertex>,
    faces: Vec<MeshFace>,
    /// Bumped by every geometry edit
    version: u64,
    pub transform: Matrix4<f32>,
    pub visible: bool,
}

impl Mesh {
    pub fn new(id: MeshId, vertices: Vec<MeshVertex>, faces: Vec<MeshFace>) -> Self {
        Self {
            id,
            vertices,
            faces,
            version: 0,
            transform: Matrix4::identity(),
            visible: true,
        }
    }

    /// Indexed triangles; vertex normals are the area-weighted average of the adjacent faces
    pub fn from_triangles(
        id: MeshId,
        positions: &[[f32; 3]],
        triangles: &[[usize; 3]],
    ) -> Result<Self> {
        for (triangle, tri) in triangles.iter().enumerate() {
            if let Some(&vertex) = tri.iter().find(|&&i| i >= positions.len()) {
                return Err(Error::BadTriangle {
                    triangle,
                    vertex,
                    vertices: positions.len(),
                });
            }
        }

        let mut normals = vec![Vector3::zeros(); positions.len()];
        for tri in triangles {
            let [a, b, c] = tri.map(|i| Point3::from(positions[i]));
            let n = (b - a).cross(&(c - a));
            for &i in tri {
                normals[i] += n;
            }
        }

        let vertices = positions
            .iter()
            .zip(normals)
            .map(|(&p, n)| MeshVertex {
                position: Point3::from(p),
                normal: n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z),
                deleted: false,
            })
            .collect();

        let faces = triangles
            .iter()
            .map(|&vertices| MeshFace {
                vertices,
                deleted: false,
            })
            .collect();

        Ok(Self::new(id, vertices, faces))
    }

    /// Axis-aligned cube of side 1 centered at the origin, with sharp edges
    pub fn unit_cube(id: MeshId) -> Self {
        let mut positions = vec![];
        let mut triangles = vec![];
        let axes = [Vector3::x(), Vector3::y(), Vector3::z()];

        for (axis, n) in axes.iter().enumerate() {
            for sign in [1f32, -1.] {
                let normal = n * sign;
                let u = axes[(axis + 1) % 3] * 0.5;
                let v = axes[(axis + 2) % 3] * 0.5 * sign;
                let center = normal * 0.5;
                let base = positions.len();
                for (du, dv) in [(-1., -1.), (1., -1.), (1., 1.), (-1., 1.)] {
                    let p: Vector3<f32> = center + u * du + v * dv;
                    positions.push((p, normal));
                }
                triangles.push([base, base + 1, base + 2]);
                triangles.push([base, base + 2, base + 3]);
            }
        }

        let vertices = positions
            .into_iter()
            .map(|(p, normal)| MeshVertex {
                position: Point3::from(p),
                normal,
                deleted: false,
            })
            .collect();
        let faces = triangles
            .into_iter()
            .map(|vertices| MeshFace {
                vertices,
                deleted: false,
            })
            .collect();

        Self::new(id, vertices, faces)
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    pub fn faces(&self) -> &[MeshFace] {
        &self.faces
    }

    /// Mutable access to the geometry; counts as an edit
    pub fn edit(&mut self) -> (&mut Vec<MeshVertex>, &mut Vec<MeshFace>) {
        self.version += 1;
        (&mut self.vertices, &mut self.faces)
    }

    pub fn delete_vertex(&mut self, index: usize) {
        self.version += 1;
        self.vertices[index].deleted = true;
    }

    pub fn delete_face(&mut self, index: usize) {
        self.version += 1;
        self.faces[index].deleted = true;
    }

    pub fn live_vertex_count(&self) -> usize {
        self.vertices.iter().filter(|v| !v.deleted).count()
    }

    pub fn live_face_count(&self) -> usize {
        self.faces.iter().filter(|f| !f.deleted).count()
    }

    /// Bounds of the live vertices, in mesh space
    pub fn local_bounds(&self) -> Aabb {
        let mut bounds = Aabb::empty();
        for v in self.vertices.iter().filter(|v| !v.deleted) {
            bounds.add_point(&v.position);
        }
        bounds
    }
}

/// The document state the projector looks at each frame
#[derive(Clone, Debug, Default)]
pub struct Document {
    pub meshes: Vec<Mesh>,
    pub current_mesh: Option<MeshId>,
    pub raster: Option<Arc<RasterShot>>,
}

impl Document {
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.id() == id)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.iter_mut().find(|m| m.id() == id)
    }

    pub fn current(&self) -> Option<&Mesh> {
        self.current_mesh.and_then(|id| self.mesh(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_cube() {
        let cube = Mesh::unit_cube(MeshId(0));
        assert_eq!(cube.vertices().len(), 24);
        assert_eq!(cube.faces().len(), 12);

        let bounds = cube.local_bounds();
        assert_eq!(bounds.min, Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(bounds.max, Point3::new(0.5, 0.5, 0.5));

        // Every triangle winds counter-clockwise around its outward normal
        for face in cube.faces() {
            let [a, b, c] = face.vertices.map(|i| cube.vertices()[i]);
            let n = (b.position - a.position).cross(&(c.position - a.position));
            assert!(n.dot(&a.normal) > 0.);
            assert!(a.position.coords.dot(&a.normal) > 0.);
        }
    }

    #[test]
    fn test_edits_bump_version() {
        let mut cube = Mesh::unit_cube(MeshId(0));
        assert_eq!(cube.version(), 0);
        cube.delete_face(3);
        cube.delete_vertex(0);
        assert_eq!(cube.version(), 2);
        assert_eq!(cube.live_face_count(), 11);
        assert_eq!(cube.live_vertex_count(), 23);

        let (verts, _) = cube.edit();
        verts[1].position.x = 4.;
        assert_eq!(cube.version(), 3);
        assert_eq!(cube.local_bounds().max.x, 4.);
    }

    #[test]
    fn test_from_triangles_normals() {
        let mesh = Mesh::from_triangles(
            MeshId(1),
            &[[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]],
            &[[0, 1, 2]],
        )
        .unwrap();
        for v in mesh.vertices() {
            assert_eq!(v.normal, Vector3::z());
        }
    }

    #[test]
    fn test_from_triangles_rejects_missing_vertex() {
        let res = Mesh::from_triangles(
            MeshId(1),
            &[[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]],
            &[[0, 1, 2], [0, 1, 7]],
        );
        assert!(matches!(
            res,
            Err(Error::BadTriangle {
                triangle: 1,
                vertex: 7,
                vertices: 3
            })
        ));
    }
}
