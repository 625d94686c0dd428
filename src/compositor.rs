use log::trace;
use nalgebra::Matrix4;

use crate::backend::{Attributes, Backend, PolygonMode, Toggle, UniformValue};
use crate::config::{DrawConfig, DrawMode};
use crate::depth::DepthMap;
use crate::error::Result;
use crate::geometry::GeometryBufferCache;
use crate::mesh::Mesh;
use crate::shading::ShadingParams;
use crate::state::RenderStateGuard;
use crate::texture::ColorMap;

const VERTEX_SHADER: &str = include_str!("shaders/projective.vert");
const FRAGMENT_SHADER: &str = include_str!("shaders/projective.frag");

/// Pulls projected fragments toward the viewer so they win against the host's
/// own rendering of the same surface
pub const POLYGON_OFFSET: (f32, f32) = (-2.0, 1.0);

pub const COLOR_UNIT: u32 = 0;
pub const DEPTH_UNIT: u32 = 1;

/// Uniform names of the projective program
pub mod uniform {
    pub const COLOR_MAP: &str = "u_ColorMap";
    pub const DEPTH_MAP: &str = "u_DepthMap";
    pub const PROJ_MAT: &str = "u_ProjMat";
    pub const VIEWPOINT: &str = "u_Viewpoint";
    pub const LIGHT_TO_OBJ: &str = "u_LightToObj";
    pub const MODEL_XF: &str = "u_ModelXf";
    pub const LIGHTING: &str = "u_IsLightActivated";
    pub const ALPHA: &str = "u_AlphaValue";
    pub const VIEW_PROJ: &str = "u_ViewProj";
    pub const LIGHT_AMBIENT: &str = "u_LightAmbient";
    pub const LIGHT_DIFFUSE: &str = "u_LightDiffuse";
    pub const POINT_SIZE: &str = "u_PointSize";
    pub const POINT_ATTENUATION: &str = "u_PointAttenuation";
    pub const VIEW: &str = "u_View";
}

/// What the host is currently looking through
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HostView {
    /// World to host eye space
    pub view: Matrix4<f32>,
    /// Host camera projection times view, for `gl_Position`
    pub view_projection: Matrix4<f32>,
    /// Light frame to object frame; the light shines along its third column
    pub light_to_obj: Matrix4<f32>,
}

impl Default for HostView {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            view_projection: Matrix4::identity(),
            light_to_obj: Matrix4::identity(),
        }
    }
}

struct Uniforms<U> {
    color_map: Option<U>,
    depth_map: Option<U>,
    proj_mat: Option<U>,
    viewpoint: Option<U>,
    light_to_obj: Option<U>,
    model_xf: Option<U>,
    lighting: Option<U>,
    alpha: Option<U>,
    view_proj: Option<U>,
    light_ambient: Option<U>,
    light_diffuse: Option<U>,
    point_size: Option<U>,
    point_attenuation: Option<U>,
    view: Option<U>,
}

/// Constant, linear and quadratic coefficients of the point size falloff
/// with eye distance.
///
/// Points at the distance of the mesh's bounding box center keep the
/// configured size; nearer points grow and farther ones shrink.
pub fn point_attenuation(view: &Matrix4<f32>, mesh: &Mesh, enabled: bool) -> [f32; 3] {
    const NONE: [f32; 3] = [1., 0., 0.];
    if !enabled {
        return NONE;
    }
    let bounds = mesh.local_bounds();
    if bounds.is_empty() {
        return NONE;
    }
    let center = (view * mesh.transform).transform_point(&bounds.center());
    let distance = center.coords.norm();
    if distance <= f32::EPSILON {
        return NONE;
    }
    [0., 0., 1. / (distance * distance)]
}

/// The projective texturing program
pub struct Compositor<B: Backend> {
    program: B::Program,
    uniforms: Uniforms<B::Uniform>,
}

impl<B: Backend> Compositor<B> {
    pub fn create(backend: &B, shader_version: &str) -> Result<Self> {
        let program = backend.create_program(
            &format!("{}\n{}", shader_version, VERTEX_SHADER),
            &format!("{}\n{}", shader_version, FRAGMENT_SHADER),
        )?;
        let loc = |name: &str| backend.uniform_location(program, name);
        let uniforms = Uniforms {
            color_map: loc(uniform::COLOR_MAP),
            depth_map: loc(uniform::DEPTH_MAP),
            proj_mat: loc(uniform::PROJ_MAT),
            viewpoint: loc(uniform::VIEWPOINT),
            light_to_obj: loc(uniform::LIGHT_TO_OBJ),
            model_xf: loc(uniform::MODEL_XF),
            lighting: loc(uniform::LIGHTING),
            alpha: loc(uniform::ALPHA),
            view_proj: loc(uniform::VIEW_PROJ),
            light_ambient: loc(uniform::LIGHT_AMBIENT),
            light_diffuse: loc(uniform::LIGHT_DIFFUSE),
            point_size: loc(uniform::POINT_SIZE),
            point_attenuation: loc(uniform::POINT_ATTENUATION),
            view: loc(uniform::VIEW),
        };
        Ok(Self { program, uniforms })
    }

    pub fn release(self, backend: &B) {
        backend.delete_program(self.program);
    }

    /// Draws `meshes` with the raster painted on. The caller's render state
    /// is left as it was found.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        backend: &B,
        color: &ColorMap<B>,
        depth: &DepthMap<B>,
        params: &ShadingParams,
        view: &HostView,
        config: &DrawConfig,
        meshes: &[&Mesh],
        cache: &GeometryBufferCache<B>,
    ) -> Result<()> {
        let (polygon_mode, offset) = match config.draw_mode {
            DrawMode::Fill => (PolygonMode::Fill, Toggle::PolygonOffsetFill),
            DrawMode::Wire | DrawMode::Hidden => (PolygonMode::Line, Toggle::PolygonOffsetLine),
            DrawMode::Points => (PolygonMode::Point, Toggle::PolygonOffsetPoint),
        };

        let _guard = RenderStateGuard::new(backend);

        backend.set_enabled(Toggle::DepthTest, true);
        backend.set_polygon_mode(polygon_mode);
        backend.set_enabled(offset, true);
        let (factor, units) = POLYGON_OFFSET;
        backend.set_polygon_offset(factor, units);
        backend.set_enabled(Toggle::Blend, true);
        backend.set_blend_func(backend.alpha_blend_func());
        backend.set_enabled(
            Toggle::ProgramPointSize,
            config.draw_mode == DrawMode::Points,
        );

        backend.bind_texture(COLOR_UNIT, Some(color.texture));
        backend.bind_texture(DEPTH_UNIT, Some(depth.texture));

        backend.use_program(Some(self.program));
        let u = &self.uniforms;
        backend.set_uniform(u.color_map.as_ref(), UniformValue::Int(COLOR_UNIT as i32));
        backend.set_uniform(u.depth_map.as_ref(), UniformValue::Int(DEPTH_UNIT as i32));
        backend.set_uniform(u.proj_mat.as_ref(), (&params.shadow_projection).into());
        backend.set_uniform(u.viewpoint.as_ref(), (&params.viewpoint).into());
        backend.set_uniform(u.light_to_obj.as_ref(), (&params.light_to_obj).into());
        backend.set_uniform(u.lighting.as_ref(), UniformValue::Bool(params.lighting));
        backend.set_uniform(u.alpha.as_ref(), UniformValue::Float(params.alpha));
        backend.set_uniform(u.view.as_ref(), (&view.view).into());
        backend.set_uniform(u.view_proj.as_ref(), (&view.view_projection).into());
        backend.set_uniform(u.light_ambient.as_ref(), UniformValue::Vec4(params.light.ambient));
        backend.set_uniform(u.light_diffuse.as_ref(), UniformValue::Vec4(params.light.diffuse));
        backend.set_uniform(u.point_size.as_ref(), UniformValue::Float(config.point_size));

        let points = config.draw_mode == DrawMode::Points;
        for mesh in meshes {
            trace!("compositing mesh {:?}", mesh.id());
            backend.set_uniform(u.model_xf.as_ref(), (&mesh.transform).into());
            if points {
                let falloff = point_attenuation(&view.view, mesh, config.point_attenuation);
                backend.set_uniform(u.point_attenuation.as_ref(), UniformValue::Vec3(falloff));
            }
            cache.draw(backend, mesh, Attributes::PositionsAndNormals)?;
        }

        Ok(())
    }
}
