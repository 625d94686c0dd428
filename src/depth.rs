use log::debug;

use crate::backend::{Attributes, Backend, PolygonMode, Toggle};
use crate::error::Result;
use crate::geometry::GeometryBufferCache;
use crate::mesh::Mesh;
use crate::projection::ProjectionState;
use crate::state::RenderStateGuard;

const VERTEX_SHADER: &str = include_str!("shaders/depth.vert");
const FRAGMENT_SHADER: &str = include_str!("shaders/depth.frag");

/// Constant depth bias applied while writing the map, against shadow acne
pub const POLYGON_OFFSET: (f32, f32) = (2.0, 2.0);

/// Depth of the scene as seen from the raster camera
pub struct DepthMap<B: Backend> {
    pub texture: B::Texture,
    pub width: u32,
    pub height: u32,
}

impl<B: Backend> DepthMap<B> {
    pub fn release(self, backend: &B) {
        backend.delete_texture(self.texture);
    }
}

/// Offscreen pass that renders a [`DepthMap`]
pub struct DepthPass<B: Backend> {
    program: B::Program,
    projection: Option<B::Uniform>,
    pose: Option<B::Uniform>,
    model: Option<B::Uniform>,
}

impl<B: Backend> DepthPass<B> {
    pub fn create(backend: &B, shader_version: &str) -> Result<Self> {
        let program = backend.create_program(
            &format!("{}\n{}", shader_version, VERTEX_SHADER),
            &format!("{}\n{}", shader_version, FRAGMENT_SHADER),
        )?;
        Ok(Self {
            program,
            projection: backend.uniform_location(program, "u_RasterProj"),
            pose: backend.uniform_location(program, "u_RasterPose"),
            model: backend.uniform_location(program, "u_ModelXf"),
        })
    }

    pub fn release(self, backend: &B) {
        backend.delete_program(self.program);
    }

    /// Renders `meshes` from the raster viewpoint into a new `width` x `height`
    /// depth map. The caller's render state is left as it was found.
    pub fn render(
        &self,
        backend: &B,
        meshes: &[&Mesh],
        cache: &GeometryBufferCache<B>,
        projection: &ProjectionState,
        width: u32,
        height: u32,
    ) -> Result<DepthMap<B>> {
        let texture = backend.create_depth_texture(width, height)?;

        match self.fill(backend, texture, meshes, cache, projection, [width, height]) {
            Ok(()) => {
                debug!("rendered {width}x{height} depth map of {} meshes", meshes.len());
                Ok(DepthMap {
                    texture,
                    width,
                    height,
                })
            }
            Err(e) => {
                backend.delete_texture(texture);
                Err(e)
            }
        }
    }

    fn fill(
        &self,
        backend: &B,
        texture: B::Texture,
        meshes: &[&Mesh],
        cache: &GeometryBufferCache<B>,
        projection: &ProjectionState,
        [width, height]: [u32; 2],
    ) -> Result<()> {
        let guard = RenderStateGuard::new(backend);
        let target = backend.create_depth_target(texture)?;

        backend.bind_framebuffer(Some(target));
        backend.set_viewport([0, 0, width as i32, height as i32]);
        backend.set_enabled(Toggle::DepthTest, true);
        backend.set_enabled(Toggle::Blend, false);
        backend.set_enabled(Toggle::PolygonOffsetFill, true);
        let (factor, units) = POLYGON_OFFSET;
        backend.set_polygon_offset(factor, units);
        backend.set_polygon_mode(PolygonMode::Fill);

        backend.use_program(Some(self.program));
        backend.set_uniform(self.projection.as_ref(), (&projection.projection).into());
        backend.set_uniform(self.pose.as_ref(), (&projection.pose).into());

        backend.clear_depth();
        let drawn = meshes.iter().try_for_each(|mesh| {
            backend.set_uniform(self.model.as_ref(), (&mesh.transform).into());
            cache.draw(backend, mesh, Attributes::Positions)
        });

        // Unbind before deleting the target
        drop(guard);
        backend.delete_framebuffer(target);
        drawn
    }
}
