//! Projective re-texturing: paints a calibrated photograph onto meshes as seen
//! from the photograph's camera, with a depth map from that camera keeping
//! hidden surfaces unpainted.
pub mod backend;
pub mod bounds;
pub mod compositor;
pub mod config;
pub mod depth;
pub mod error;
pub mod geometry;
pub mod gl;
pub mod image;
pub mod intrinsics;
pub mod mesh;
pub mod projection;
pub mod scene;
pub mod shading;
pub mod shot;
pub mod state;
pub mod texture;

pub use backend::{Backend, Capabilities};
pub use compositor::HostView;
pub use gl::GlBackend;
pub use config::{DrawConfig, DrawMode, LightParams, Participation};
pub use error::{Error, Result};
pub use image::{load_color_png, Image, RasterImage};
pub use intrinsics::Intrinsics;
pub use mesh::{Document, Mesh, MeshId};
pub use projection::{ProjectionConfig, ProjectionState};
pub use scene::SceneController;
pub use shot::RasterShot;
