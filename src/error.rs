use thiserror::Error;

/// Shader stage, used in compile diagnostics
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Error type for the projection subsystem
#[derive(Error, Debug)]
pub enum Error {
    /// A shader failed to compile; carries the driver's info log
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    /// The program failed to link; carries the driver's info log
    #[error("program failed to link:\n{log}")]
    ShaderLink { log: String },

    /// A GPU object (buffer, texture, framebuffer, program) could not be created
    #[error("GPU allocation failed: {0}")]
    Allocation(String),

    /// Offscreen target is not complete
    #[error("framebuffer incomplete (status {0:#x})")]
    IncompleteFramebuffer(u32),

    /// `draw` was called before a successful `activate`
    #[error("projector is not active")]
    NotActive,

    /// Raster image has no pixels or a buffer that does not match its size
    #[error("raster image is malformed: {0}")]
    BadImage(String),

    /// A triangle names a vertex the mesh does not have
    #[error("triangle {triangle} references vertex {vertex}, mesh has {vertices}")]
    BadTriangle {
        triangle: usize,
        vertex: usize,
        vertices: usize,
    },

    #[error("PNG decoding failed")]
    Png(#[from] png::DecodingError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
