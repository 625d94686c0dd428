use ahash::{AHashMap, AHashSet};
use bytemuck::{Pod, Zeroable};
use log::{debug, info};

use crate::backend::{Attributes, Backend, BufferUsage, Capabilities};
use crate::error::Result;
use crate::mesh::{Mesh, MeshId};

/// Interleaved vertex as laid out in GPU memory
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

unsafe impl Zeroable for GpuVertex {}
unsafe impl Pod for GpuVertex {}

/// CPU-side copy of the buffers uploaded for one mesh
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryBuffer {
    pub vertices: Vec<GpuVertex>,
    /// Triangle list, offsets into `vertices`
    pub indices: Vec<u32>,
}

impl GeometryBuffer {
    /// Packs the live vertices and faces of `mesh`.
    ///
    /// Deleted vertices are skipped, so storage indices are remapped to
    /// offsets in the packed array. Faces that are deleted, or that point at a
    /// deleted or missing vertex, are left out.
    pub fn build(mesh: &Mesh) -> Self {
        let mut remap = vec![None; mesh.vertices().len()];
        let mut vertices = Vec::with_capacity(mesh.live_vertex_count());

        for (i, v) in mesh.vertices().iter().enumerate() {
            if v.deleted {
                continue;
            }
            remap[i] = Some(vertices.len() as u32);
            vertices.push(GpuVertex {
                position: v.position.into(),
                normal: v.normal.into(),
            });
        }

        let mut indices = Vec::with_capacity(3 * mesh.live_face_count());
        let mut skipped = 0;
        for face in mesh.faces().iter().filter(|f| !f.deleted) {
            let tri = face.vertices.map(|i| remap.get(i).copied().flatten());
            match tri {
                [Some(a), Some(b), Some(c)] => indices.extend([a, b, c]),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(
                "mesh {:?}: skipped {skipped} faces referencing dead vertices",
                mesh.id()
            );
        }

        Self { vertices, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

struct CachedGeometry<G> {
    geometry: G,
    version: u64,
}

/// Per-mesh GPU buffers kept between frames.
///
/// Entries are keyed by mesh id and remember the mesh version they were
/// built from; a newer version gets a fresh upload on the next `ensure`.
pub struct GeometryBufferCache<B: Backend> {
    entries: AHashMap<MeshId, CachedGeometry<B::Geometry>>,
    caching_supported: bool,
    reported_unsupported: bool,
}

impl<B: Backend> GeometryBufferCache<B> {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            entries: AHashMap::new(),
            caching_supported: capabilities.buffer_caching,
            reported_unsupported: false,
        }
    }

    /// Brings the entry for `mesh` in line with `use_cache`
    pub fn ensure(&mut self, backend: &B, mesh: &Mesh, use_cache: bool) -> Result<()> {
        let use_cache = use_cache && self.caching_supported;
        if !self.caching_supported && !self.reported_unsupported {
            info!("GPU buffer caching unavailable, submitting geometry every frame");
            self.reported_unsupported = true;
        }

        if !use_cache || !mesh.visible {
            self.invalidate(backend, mesh.id());
            return Ok(());
        }

        match self.entries.get(&mesh.id()) {
            Some(entry) if entry.version == mesh.version() => return Ok(()),
            Some(_) => {
                debug!("mesh {:?} changed, rebuilding its buffers", mesh.id());
                self.invalidate(backend, mesh.id());
            }
            None => (),
        }

        let buffer = GeometryBuffer::build(mesh);
        let geometry = backend.upload_geometry(&buffer.vertices, &buffer.indices, BufferUsage::Static)?;
        debug!(
            "cached mesh {:?}: {} vertices, {} triangles",
            mesh.id(),
            buffer.vertices.len(),
            buffer.triangle_count()
        );
        self.entries.insert(
            mesh.id(),
            CachedGeometry {
                geometry,
                version: mesh.version(),
            },
        );

        Ok(())
    }

    /// Drops the cached buffers of one mesh, if any
    pub fn invalidate(&mut self, backend: &B, id: MeshId) {
        if let Some(entry) = self.entries.remove(&id) {
            backend.delete_geometry(entry.geometry);
        }
    }

    /// Drops every entry whose mesh is not in `keep`
    pub fn retain(&mut self, backend: &B, keep: &AHashSet<MeshId>) {
        let gone: Vec<MeshId> = self
            .entries
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();
        for id in gone {
            self.invalidate(backend, id);
        }
    }

    pub fn clear(&mut self, backend: &B) {
        for (_, entry) in self.entries.drain() {
            backend.delete_geometry(entry.geometry);
        }
    }

    pub fn is_cached(&self, id: MeshId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draws `mesh`, from its cached buffers when present, otherwise through a
    /// one-shot upload.
    pub fn draw(&self, backend: &B, mesh: &Mesh, attributes: Attributes) -> Result<()> {
        if !mesh.visible {
            return Ok(());
        }

        match self.entries.get(&mesh.id()) {
            Some(entry) => backend.draw_geometry(&entry.geometry, attributes),
            None => {
                let buffer = GeometryBuffer::build(mesh);
                if buffer.indices.is_empty() {
                    return Ok(());
                }
                let geometry =
                    backend.upload_geometry(&buffer.vertices, &buffer.indices, BufferUsage::Stream)?;
                backend.draw_geometry(&geometry, attributes);
                backend.delete_geometry(geometry);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use crate::mesh::{MeshFace, MeshVertex};
    use nalgebra::{Point3, Vector3};
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn random_mesh(rng: &mut SmallRng) -> Mesh {
        let n = rng.gen_range(3..60);
        let vertices = (0..n)
            .map(|_| MeshVertex {
                position: Point3::new(rng.gen(), rng.gen(), rng.gen()),
                normal: Vector3::z(),
                deleted: rng.gen_bool(0.2),
            })
            .collect::<Vec<_>>();
        let faces = (0..rng.gen_range(1..80))
            .map(|_| MeshFace {
                vertices: [(); 3].map(|_| rng.gen_range(0..n)),
                deleted: rng.gen_bool(0.2),
            })
            .collect();
        Mesh::new(MeshId(0), vertices, faces)
    }

    #[test]
    fn test_build_counts_and_bounds() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let mut mesh = random_mesh(&mut rng);
            // Drop faces on dead vertices up front; the rest must all survive
            let live: Vec<bool> = mesh.vertices().iter().map(|v| !v.deleted).collect();
            let (_, faces) = mesh.edit();
            for f in faces.iter_mut() {
                if f.vertices.iter().any(|&i| !live[i]) {
                    f.deleted = true;
                }
            }

            let buffer = GeometryBuffer::build(&mesh);
            let n = mesh.live_vertex_count();
            assert_eq!(buffer.vertices.len(), n);
            assert_eq!(buffer.indices.len(), 3 * mesh.live_face_count());
            assert!(buffer.indices.iter().all(|&i| (i as usize) < n));
        }
    }

    #[test]
    fn test_build_remaps_positions() {
        let mut mesh = Mesh::from_triangles(
            MeshId(0),
            &[[0., 0., 0.], [9., 9., 9.], [1., 0., 0.], [0., 1., 0.]],
            &[[0, 2, 3]],
        )
        .unwrap();
        mesh.delete_vertex(1);

        let buffer = GeometryBuffer::build(&mesh);
        assert_eq!(buffer.indices, vec![0, 1, 2]);
        assert_eq!(buffer.vertices[1].position, [1., 0., 0.]);
        assert_eq!(buffer.vertices[2].position, [0., 1., 0.]);
    }

    #[test]
    fn test_faces_on_dead_vertices_skipped() {
        let mut mesh = Mesh::unit_cube(MeshId(0));
        mesh.delete_vertex(0);
        let buffer = GeometryBuffer::build(&mesh);
        // Vertex 0 belongs to both triangles of the first side
        assert_eq!(buffer.triangle_count(), 10);
    }

    #[test]
    fn test_cache_toggle_releases() {
        let gl = FakeBackend::new();
        let mut cache = GeometryBufferCache::new(Capabilities::default());
        let cube = Mesh::unit_cube(MeshId(4));

        cache.ensure(&gl, &cube, true).unwrap();
        cache.ensure(&gl, &cube, true).unwrap();
        assert!(cache.is_cached(cube.id()));
        assert_eq!(gl.live_count(), 1);

        cache.ensure(&gl, &cube, false).unwrap();
        assert!(!cache.is_cached(cube.id()));
        assert_eq!(gl.live_count(), 0);

        // Falls back to a one-shot upload
        cache.draw(&gl, &cube, Attributes::PositionsAndNormals).unwrap();
        assert_eq!(gl.live_count(), 0);
        let uploads = gl
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::UploadGeometry { .. }))
            .collect::<Vec<_>>();
        assert_eq!(uploads.len(), 2);
        assert!(matches!(
            uploads[1],
            Call::UploadGeometry {
                vertices: 24,
                indices: 36,
                usage: BufferUsage::Stream,
                ..
            }
        ));
    }

    #[test]
    fn test_cache_rebuilds_on_edit() {
        let gl = FakeBackend::new();
        let mut cache = GeometryBufferCache::new(Capabilities::default());
        let mut cube = Mesh::unit_cube(MeshId(1));

        cache.ensure(&gl, &cube, true).unwrap();
        cube.delete_face(0);
        cache.ensure(&gl, &cube, true).unwrap();

        assert_eq!(gl.live_count(), 1);
        let calls = gl.calls();
        assert!(matches!(calls[1], Call::DeleteGeometry(_)));
        assert!(matches!(calls[2], Call::UploadGeometry { indices: 33, .. }));
    }

    #[test]
    fn test_unsupported_caching_degrades() {
        let gl = FakeBackend::new();
        let mut cache = GeometryBufferCache::new(Capabilities {
            buffer_caching: false,
        });
        let cube = Mesh::unit_cube(MeshId(1));

        cache.ensure(&gl, &cube, true).unwrap();
        assert!(cache.is_empty());
        cache.draw(&gl, &cube, Attributes::Positions).unwrap();
        assert_eq!(gl.live_count(), 0);
    }

    #[test]
    fn test_retain_and_clear() {
        let gl = FakeBackend::new();
        let mut cache = GeometryBufferCache::new(Capabilities::default());
        let meshes: Vec<Mesh> = (0..3).map(|i| Mesh::unit_cube(MeshId(i))).collect();
        for m in &meshes {
            cache.ensure(&gl, m, true).unwrap();
        }

        let keep: AHashSet<MeshId> = [MeshId(1)].into_iter().collect();
        cache.retain(&gl, &keep);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_cached(MeshId(1)));

        cache.clear(&gl);
        assert!(cache.is_empty());
        assert_eq!(gl.live_count(), 0);
    }

    #[test]
    fn test_hidden_mesh_not_drawn() {
        let gl = FakeBackend::new();
        let cache = GeometryBufferCache::new(Capabilities::default());
        let mut cube = Mesh::unit_cube(MeshId(1));
        cube.visible = false;
        cache.draw(&gl, &cube, Attributes::Positions).unwrap();
        assert!(gl.calls().is_empty());
    }
}
