//! The set of graphics operations the projector issues.
//!
//! Everything above this module is generic over [`Backend`]; the OpenGL
//! implementation lives in [`crate::gl`]. Methods take `&self` the way
//! `glow::HasContext` does, so a [`crate::state::RenderStateGuard`] can hold a
//! shared reference while a pass keeps issuing commands.
use std::fmt::Debug;

use nalgebra::{Matrix4, Point3};

use crate::error::Result;
use crate::geometry::GpuVertex;

/// Host-reported capabilities, handed to `SceneController::activate`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// GPU-resident vertex/index buffers may be kept between frames
    pub buffer_caching: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            buffer_caching: true,
        }
    }
}

/// Toggleable pipeline state touched by the projector
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Toggle {
    DepthTest,
    PolygonOffsetFill,
    PolygonOffsetLine,
    PolygonOffsetPoint,
    Blend,
    ProgramPointSize,
}

impl Toggle {
    pub const ALL: [Toggle; 6] = [
        Toggle::DepthTest,
        Toggle::PolygonOffsetFill,
        Toggle::PolygonOffsetLine,
        Toggle::PolygonOffsetPoint,
        Toggle::Blend,
        Toggle::ProgramPointSize,
    ];
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PolygonMode {
    Point,
    Line,
    Fill,
}

/// Raw blend factors, as the driver reports them
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlendFunc {
    pub src: u32,
    pub dst: u32,
}

/// Vertex attributes to enable when drawing a geometry buffer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Attributes {
    /// Depth pass: normals are not needed
    Positions,
    PositionsAndNormals,
}

/// Hint for how long an uploaded geometry will live
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Cached between frames
    Static,
    /// Uploaded, drawn once, deleted
    Stream,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Bool(bool),
    Float(f32),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major
    Mat4([f32; 16]),
}

impl From<&Matrix4<f32>> for UniformValue {
    fn from(m: &Matrix4<f32>) -> Self {
        let mut out = [0.; 16];
        out.copy_from_slice(m.as_slice());
        UniformValue::Mat4(out)
    }
}

impl From<&Point3<f32>> for UniformValue {
    fn from(p: &Point3<f32>) -> Self {
        UniformValue::Vec3([p.x, p.y, p.z])
    }
}

pub trait Backend {
    type Program: Copy + Debug + PartialEq;
    type Uniform: Clone + Debug;
    type Geometry: Debug;
    type Texture: Copy + Debug + PartialEq;
    type Framebuffer: Copy + Debug + PartialEq;

    /// Compiles and links a program. No shader objects survive, on success or failure.
    fn create_program(&self, vertex: &str, fragment: &str) -> Result<Self::Program>;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);
    fn current_program(&self) -> Option<Self::Program>;
    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::Uniform>;
    fn set_uniform(&self, location: Option<&Self::Uniform>, value: UniformValue);

    fn upload_geometry(
        &self,
        vertices: &[GpuVertex],
        indices: &[u32],
        usage: BufferUsage,
    ) -> Result<Self::Geometry>;
    fn draw_geometry(&self, geometry: &Self::Geometry, attributes: Attributes);
    fn delete_geometry(&self, geometry: Self::Geometry);

    /// Tightly packed RGB8 rows, bottom row first
    fn create_color_texture(&self, width: u32, height: u32, rgb: &[u8]) -> Result<Self::Texture>;
    /// Depth texture configured for shadow comparison (reference <= stored)
    fn create_depth_texture(&self, width: u32, height: u32) -> Result<Self::Texture>;
    fn delete_texture(&self, texture: Self::Texture);
    fn bind_texture(&self, unit: u32, texture: Option<Self::Texture>);
    fn bound_texture(&self, unit: u32) -> Option<Self::Texture>;
    fn active_texture_unit(&self) -> u32;
    fn set_active_texture_unit(&self, unit: u32);

    /// Offscreen target with `depth` as its only attachment
    fn create_depth_target(&self, depth: Self::Texture) -> Result<Self::Framebuffer>;
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);
    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>);
    fn current_framebuffer(&self) -> Option<Self::Framebuffer>;

    fn viewport(&self) -> [i32; 4];
    fn set_viewport(&self, viewport: [i32; 4]);
    fn is_enabled(&self, toggle: Toggle) -> bool;
    fn set_enabled(&self, toggle: Toggle, enabled: bool);
    fn polygon_offset(&self) -> (f32, f32);
    fn set_polygon_offset(&self, factor: f32, units: f32);
    fn polygon_mode(&self) -> PolygonMode;
    fn set_polygon_mode(&self, mode: PolygonMode);
    fn blend_func(&self) -> BlendFunc;
    fn set_blend_func(&self, func: BlendFunc);
    /// Source-alpha over destination
    fn alpha_blend_func(&self) -> BlendFunc;

    fn clear_depth(&self);
}
