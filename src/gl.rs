//! [`Backend`] for an OpenGL 3.3+ core context, through `glow`.
use std::cell::Cell;

use glow::HasContext;
use log::{debug, warn};

use crate::backend::{
    Attributes, Backend, BlendFunc, BufferUsage, Capabilities, PolygonMode, Toggle, UniformValue,
};
use crate::error::{Error, Result, ShaderStage};
use crate::geometry::GpuVertex;

impl Capabilities {
    /// Asks the driver whether vertex array objects are available.
    ///
    /// Every 3.x core context has them, so on the viewer's context this is
    /// always true. Hosts that want the uncached path anyway construct
    /// `Capabilities` themselves.
    pub fn detect(backend: &GlBackend) -> Self {
        let gl = backend.gl();
        let version = gl.version();
        Self {
            buffer_caching: version.major >= 3
                || gl
                    .supported_extensions()
                    .contains("GL_ARB_vertex_array_object"),
        }
    }
}

/// A `glow` context plus the program and framebuffer bindings made through it.
///
/// glow 0.11 gives no way to turn a raw GL name back into a program or
/// framebuffer handle, so those two bindings are remembered here when they
/// are set. A binding made on [`GlBackend::gl`] directly reads back as
/// unbound (with a warning).
pub struct GlBackend {
    gl: glow::Context,
    program: Cell<Option<(u32, glow::NativeProgram)>>,
    framebuffer: Cell<Option<(u32, glow::NativeFramebuffer)>>,
}

impl GlBackend {
    pub fn new(gl: glow::Context) -> Self {
        Self {
            gl,
            program: Cell::new(None),
            framebuffer: Cell::new(None),
        }
    }

    /// The wrapped context, for host drawing
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn raw_name(&self, parameter: u32) -> u32 {
        unsafe { self.gl.get_parameter_i32(parameter) as u32 }
    }
}

/// Resolves the name the driver reports against the binding last made through the backend
fn tracked<T: Copy>(what: &str, raw: u32, last: Option<(u32, T)>) -> Option<T> {
    match last {
        _ if raw == 0 => None,
        Some((name, handle)) if name == raw => Some(handle),
        _ => {
            warn!("{what} {raw} was bound behind the projector's back, treating it as unbound");
            None
        }
    }
}

/// Buffers of one uploaded mesh
#[derive(Debug)]
pub struct GlGeometry {
    vao: glow::NativeVertexArray,
    vbo: glow::NativeBuffer,
    ibo: glow::NativeBuffer,
    index_count: i32,
}

fn toggle_cap(toggle: Toggle) -> u32 {
    match toggle {
        Toggle::DepthTest => glow::DEPTH_TEST,
        Toggle::PolygonOffsetFill => glow::POLYGON_OFFSET_FILL,
        Toggle::PolygonOffsetLine => glow::POLYGON_OFFSET_LINE,
        Toggle::PolygonOffsetPoint => glow::POLYGON_OFFSET_POINT,
        Toggle::Blend => glow::BLEND,
        Toggle::ProgramPointSize => glow::PROGRAM_POINT_SIZE,
    }
}

unsafe fn compile(
    gl: &glow::Context,
    stage: ShaderStage,
    source: &str,
) -> Result<glow::NativeShader> {
    let kind = match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    };
    let shader = gl.create_shader(kind).map_err(Error::Allocation)?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(Error::ShaderCompile { stage, log });
    }
    Ok(shader)
}

impl Backend for GlBackend {
    type Program = glow::NativeProgram;
    type Uniform = glow::NativeUniformLocation;
    type Geometry = GlGeometry;
    type Texture = glow::NativeTexture;
    type Framebuffer = glow::NativeFramebuffer;

    fn create_program(&self, vertex: &str, fragment: &str) -> Result<Self::Program> {
        let gl = &self.gl;
        unsafe {
            let vs = compile(gl, ShaderStage::Vertex, vertex)?;
            let fs = match compile(gl, ShaderStage::Fragment, fragment) {
                Ok(fs) => fs,
                Err(e) => {
                    gl.delete_shader(vs);
                    return Err(e);
                }
            };

            let program = match gl.create_program() {
                Ok(p) => p,
                Err(e) => {
                    gl.delete_shader(vs);
                    gl.delete_shader(fs);
                    return Err(Error::Allocation(e));
                }
            };
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);

            let linked = gl.get_program_link_status(program);
            for shader in [vs, fs] {
                gl.detach_shader(program, shader);
                gl.delete_shader(shader);
            }

            if !linked {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(Error::ShaderLink { log });
            }
            Ok(program)
        }
    }

    fn delete_program(&self, program: Self::Program) {
        if matches!(self.program.get(), Some((_, p)) if p == program) {
            self.program.set(None);
        }
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) };
        self.program
            .set(program.map(|p| (self.raw_name(glow::CURRENT_PROGRAM), p)));
    }

    fn current_program(&self) -> Option<Self::Program> {
        tracked(
            "program",
            self.raw_name(glow::CURRENT_PROGRAM),
            self.program.get(),
        )
    }

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::Uniform> {
        let location = unsafe { self.gl.get_uniform_location(program, name) };
        if location.is_none() {
            debug!("uniform {name} is not active");
        }
        location
    }

    fn set_uniform(&self, location: Option<&Self::Uniform>, value: UniformValue) {
        let gl = &self.gl;
        unsafe {
            match value {
                UniformValue::Int(x) => gl.uniform_1_i32(location, x),
                UniformValue::Bool(b) => gl.uniform_1_i32(location, b as i32),
                UniformValue::Float(x) => gl.uniform_1_f32(location, x),
                UniformValue::Vec3([x, y, z]) => gl.uniform_3_f32(location, x, y, z),
                UniformValue::Vec4([x, y, z, w]) => gl.uniform_4_f32(location, x, y, z, w),
                UniformValue::Mat4(m) => gl.uniform_matrix_4_f32_slice(location, false, &m),
            }
        }
    }

    fn upload_geometry(
        &self,
        vertices: &[GpuVertex],
        indices: &[u32],
        usage: BufferUsage,
    ) -> Result<Self::Geometry> {
        let gl = &self.gl;
        let usage = match usage {
            BufferUsage::Static => glow::STATIC_DRAW,
            BufferUsage::Stream => glow::STREAM_DRAW,
        };

        unsafe {
            let vao = gl.create_vertex_array().map_err(Error::Allocation)?;
            let vbo = match gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(e) => {
                    gl.delete_vertex_array(vao);
                    return Err(Error::Allocation(e));
                }
            };
            let ibo = match gl.create_buffer() {
                Ok(ibo) => ibo,
                Err(e) => {
                    gl.delete_buffer(vbo);
                    gl.delete_vertex_array(vao);
                    return Err(Error::Allocation(e));
                }
            };

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(vertices), usage);

            // Set vertex attributes
            let stride = std::mem::size_of::<GpuVertex>() as i32;
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, stride, 0);
            gl.vertex_attrib_pointer_f32(
                1,
                3,
                glow::FLOAT,
                false,
                stride,
                3 * std::mem::size_of::<f32>() as i32,
            );

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ibo));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(indices),
                usage,
            );

            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);

            let geometry = GlGeometry {
                vao,
                vbo,
                ibo,
                index_count: indices.len() as i32,
            };
            if gl.get_error() == glow::OUT_OF_MEMORY {
                self.delete_geometry(geometry);
                return Err(Error::Allocation(format!(
                    "{} vertices, {} indices",
                    vertices.len(),
                    indices.len()
                )));
            }
            Ok(geometry)
        }
    }

    fn draw_geometry(&self, geometry: &Self::Geometry, attributes: Attributes) {
        let gl = &self.gl;
        unsafe {
            gl.bind_vertex_array(Some(geometry.vao));
            gl.enable_vertex_attrib_array(0);
            match attributes {
                Attributes::Positions => gl.disable_vertex_attrib_array(1),
                Attributes::PositionsAndNormals => gl.enable_vertex_attrib_array(1),
            }
            gl.draw_elements(glow::TRIANGLES, geometry.index_count, glow::UNSIGNED_INT, 0);
            gl.bind_vertex_array(None);
        }
    }

    fn delete_geometry(&self, geometry: Self::Geometry) {
        unsafe {
            self.gl.delete_vertex_array(geometry.vao);
            self.gl.delete_buffer(geometry.vbo);
            self.gl.delete_buffer(geometry.ibo);
        }
    }

    fn create_color_texture(&self, width: u32, height: u32, rgb: &[u8]) -> Result<Self::Texture> {
        let gl = &self.gl;
        unsafe {
            let previous = self.bound_texture(self.active_texture_unit());
            let alignment = gl.get_parameter_i32(glow::UNPACK_ALIGNMENT);
            let texture = gl.create_texture().map_err(Error::Allocation)?;

            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGB8 as i32,
                width as i32,
                height as i32,
                0,
                glow::RGB,
                glow::UNSIGNED_BYTE,
                Some(rgb),
            );
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, alignment);
            for (param, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::REPEAT),
                (glow::TEXTURE_WRAP_T, glow::REPEAT),
            ] {
                gl.tex_parameter_i32(glow::TEXTURE_2D, param, value as i32);
            }
            gl.bind_texture(glow::TEXTURE_2D, previous);

            if gl.get_error() == glow::OUT_OF_MEMORY {
                gl.delete_texture(texture);
                return Err(Error::Allocation(format!("{width}x{height} color texture")));
            }
            Ok(texture)
        }
    }

    fn create_depth_texture(&self, width: u32, height: u32) -> Result<Self::Texture> {
        let gl = &self.gl;
        unsafe {
            let previous = self.bound_texture(self.active_texture_unit());
            let texture = gl.create_texture().map_err(Error::Allocation)?;

            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::DEPTH_COMPONENT24 as i32,
                width as i32,
                height as i32,
                0,
                glow::DEPTH_COMPONENT,
                glow::UNSIGNED_INT,
                None,
            );
            for (param, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::REPEAT),
                (glow::TEXTURE_WRAP_T, glow::REPEAT),
                (glow::TEXTURE_COMPARE_MODE, glow::COMPARE_REF_TO_TEXTURE),
                (glow::TEXTURE_COMPARE_FUNC, glow::LEQUAL),
            ] {
                gl.tex_parameter_i32(glow::TEXTURE_2D, param, value as i32);
            }
            gl.bind_texture(glow::TEXTURE_2D, previous);

            if gl.get_error() == glow::OUT_OF_MEMORY {
                gl.delete_texture(texture);
                return Err(Error::Allocation(format!("{width}x{height} depth texture")));
            }
            Ok(texture)
        }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn bind_texture(&self, unit: u32, texture: Option<Self::Texture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
        }
    }

    fn bound_texture(&self, unit: u32) -> Option<Self::Texture> {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            match self.raw_name(glow::TEXTURE_BINDING_2D) {
                0 => None,
                name => Some(glow::Context::create_texture_from_gl_name(name)),
            }
        }
    }

    fn active_texture_unit(&self) -> u32 {
        self.raw_name(glow::ACTIVE_TEXTURE) - glow::TEXTURE0
    }

    fn set_active_texture_unit(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn create_depth_target(&self, depth: Self::Texture) -> Result<Self::Framebuffer> {
        let gl = &self.gl;
        unsafe {
            let previous = self.current_framebuffer();
            let framebuffer = gl.create_framebuffer().map_err(Error::Allocation)?;

            self.bind_framebuffer(Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::TEXTURE_2D,
                Some(depth),
                0,
            );
            gl.draw_buffers(&[glow::NONE]);
            gl.read_buffer(glow::NONE);
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            self.bind_framebuffer(previous);

            if status != glow::FRAMEBUFFER_COMPLETE {
                self.delete_framebuffer(framebuffer);
                return Err(Error::IncompleteFramebuffer(status));
            }
            Ok(framebuffer)
        }
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        if matches!(self.framebuffer.get(), Some((_, f)) if f == framebuffer) {
            self.framebuffer.set(None);
        }
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) };
        self.framebuffer
            .set(framebuffer.map(|f| (self.raw_name(glow::DRAW_FRAMEBUFFER_BINDING), f)));
    }

    fn current_framebuffer(&self) -> Option<Self::Framebuffer> {
        tracked(
            "framebuffer",
            self.raw_name(glow::DRAW_FRAMEBUFFER_BINDING),
            self.framebuffer.get(),
        )
    }

    fn viewport(&self) -> [i32; 4] {
        let mut viewport = [0; 4];
        unsafe { self.gl.get_parameter_i32_slice(glow::VIEWPORT, &mut viewport) };
        viewport
    }

    fn set_viewport(&self, [x, y, w, h]: [i32; 4]) {
        unsafe { self.gl.viewport(x, y, w, h) }
    }

    fn is_enabled(&self, toggle: Toggle) -> bool {
        unsafe { self.gl.is_enabled(toggle_cap(toggle)) }
    }

    fn set_enabled(&self, toggle: Toggle, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(toggle_cap(toggle));
            } else {
                self.gl.disable(toggle_cap(toggle));
            }
        }
    }

    fn polygon_offset(&self) -> (f32, f32) {
        let (mut factor, mut units) = ([0.], [0.]);
        unsafe {
            self.gl
                .get_parameter_f32_slice(glow::POLYGON_OFFSET_FACTOR, &mut factor);
            self.gl
                .get_parameter_f32_slice(glow::POLYGON_OFFSET_UNITS, &mut units);
        }
        (factor[0], units[0])
    }

    fn set_polygon_offset(&self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) }
    }

    fn polygon_mode(&self) -> PolygonMode {
        // Core profiles report front and back together
        let mut mode = [0; 2];
        unsafe { self.gl.get_parameter_i32_slice(glow::POLYGON_MODE, &mut mode) };
        match mode[0] as u32 {
            glow::POINT => PolygonMode::Point,
            glow::LINE => PolygonMode::Line,
            _ => PolygonMode::Fill,
        }
    }

    fn set_polygon_mode(&self, mode: PolygonMode) {
        let mode = match mode {
            PolygonMode::Point => glow::POINT,
            PolygonMode::Line => glow::LINE,
            PolygonMode::Fill => glow::FILL,
        };
        unsafe { self.gl.polygon_mode(glow::FRONT_AND_BACK, mode) }
    }

    fn blend_func(&self) -> BlendFunc {
        BlendFunc {
            src: self.raw_name(glow::BLEND_SRC_RGB),
            dst: self.raw_name(glow::BLEND_DST_RGB),
        }
    }

    fn set_blend_func(&self, func: BlendFunc) {
        unsafe { self.gl.blend_func(func.src, func.dst) }
    }

    fn alpha_blend_func(&self) -> BlendFunc {
        BlendFunc {
            src: glow::SRC_ALPHA,
            dst: glow::ONE_MINUS_SRC_ALPHA,
        }
    }

    fn clear_depth(&self) {
        unsafe { self.gl.clear(glow::DEPTH_BUFFER_BIT) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_binding() {
        let handle = 7u8;
        assert_eq!(tracked("program", 0, Some((3, handle))), None);
        assert_eq!(tracked("program", 3, Some((3, handle))), Some(7));
        // Bound directly on the context
        assert_eq!(tracked("program", 4, Some((3, handle))), None);
        assert_eq!(tracked::<u8>("program", 4, None), None);
    }
}
