use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use env_logger::Env;
use glow::HasContext;
use log::{error, info};
use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, Vector3};
use serde::Deserialize;

use rasterproj::{
    load_color_png, Capabilities, Document, DrawConfig, DrawMode, GlBackend, HostView, Intrinsics,
    Mesh, MeshId, Participation, RasterShot, SceneController,
};

/// Paints a calibrated photograph onto the meshes of a scene
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Scene description (JSON)
    #[clap(short, long, value_parser)]
    scene: PathBuf,

    /// Opacity of the projected photograph, overrides the scene file
    #[clap(short, long, value_parser)]
    opacity: Option<f32>,

    /// Paint the raw photograph colors, without lighting
    #[clap(long, value_parser)]
    no_lighting: bool,

    /// Keep mesh buffers on the GPU between frames
    #[clap(long, value_parser)]
    cache: bool,

    /// Project onto every mesh instead of only the current one
    #[clap(short, long, value_parser)]
    all_meshes: bool,

    /// Rasterize as wireframe
    #[clap(short, long, value_parser)]
    wire: bool,

    /// Pretend the driver cannot keep buffers, submitting geometry every frame
    #[clap(long, value_parser)]
    no_buffer_objects: bool,
}

#[derive(Deserialize, Debug)]
struct SceneFile {
    raster: RasterFile,
    meshes: Vec<MeshFile>,
    /// Index into `meshes`
    #[serde(default)]
    current: usize,
    #[serde(default)]
    camera: CameraFile,
    #[serde(default)]
    config: DrawConfig,
}

#[derive(Deserialize, Debug)]
struct RasterFile {
    intrinsics: Intrinsics,
    /// Camera center in world space
    position: [f32; 3],
    /// Camera to world rotation, `[i, j, k, w]`
    rotation: [f32; 4],
    /// PNG, relative to the scene file
    image: PathBuf,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
enum Shape {
    #[default]
    Cube,
    Triangles {
        positions: Vec<[f32; 3]>,
        triangles: Vec<[usize; 3]>,
    },
}

#[derive(Deserialize, Debug)]
struct MeshFile {
    #[serde(default)]
    shape: Shape,
    #[serde(default)]
    translation: [f32; 3],
    #[serde(default = "unit_scale")]
    scale: f32,
}

fn unit_scale() -> f32 {
    1.
}

#[derive(Deserialize, Debug)]
#[serde(default)]
struct CameraFile {
    eye: [f32; 3],
    target: [f32; 3],
    /// Vertical field of view in degrees
    fov: f32,
}

impl Default for CameraFile {
    fn default() -> Self {
        Self {
            eye: [3., 3., 5.],
            target: [0.; 3],
            fov: 45.,
        }
    }
}

impl CameraFile {
    fn host_view(&self, aspect: f32) -> HostView {
        let view = Isometry3::look_at_rh(
            &Point3::from(self.eye),
            &Point3::from(self.target),
            &Vector3::y(),
        );
        let projection = Perspective3::new(aspect, self.fov.to_radians(), 0.01, 1000.);
        HostView {
            view: view.to_homogeneous(),
            view_projection: projection.as_matrix() * view.to_homogeneous(),
            // Headlight
            light_to_obj: view.inverse().to_homogeneous(),
        }
    }
}

fn load_document(path: &Path) -> Result<(Document, CameraFile, DrawConfig)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let scene: SceneFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;

    let image_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&scene.raster.image);
    let image = load_color_png(&image_path)
        .with_context(|| format!("loading raster {}", image_path.display()))?;
    let raster = RasterShot::from_position_rotation(
        scene.raster.intrinsics,
        scene.raster.position,
        scene.raster.rotation,
        image,
    );

    let meshes = scene
        .meshes
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            let id = MeshId(i as u32);
            let mut mesh = match m.shape {
                Shape::Cube => Mesh::unit_cube(id),
                Shape::Triangles {
                    positions,
                    triangles,
                } => Mesh::from_triangles(id, &positions, &triangles)
                    .with_context(|| format!("mesh {i} in {}", path.display()))?,
            };
            mesh.transform = Matrix4::new_translation(&Vector3::from(m.translation))
                * Matrix4::new_scaling(m.scale);
            Ok(mesh)
        })
        .collect::<Result<Vec<_>>>()?;
    info!("loaded {} meshes from {}", meshes.len(), path.display());

    let current_mesh = (scene.current < meshes.len()).then(|| MeshId(scene.current as u32));
    let document = Document {
        meshes,
        current_mesh,
        raster: Some(Arc::new(raster)),
    };
    Ok((document, scene.camera, scene.config))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (document, camera, mut config) = load_document(&args.scene)?;
    if let Some(opacity) = args.opacity {
        config.opacity = opacity;
    }
    config.lighting &= !args.no_lighting;
    config.use_geometry_cache |= args.cache;
    if args.all_meshes {
        config.participation = Participation::AllMeshes;
    }
    if args.wire {
        config.draw_mode = DrawMode::Wire;
    }

    // Set up opengl
    unsafe {
        let (gl, window, event_loop) = {
            let event_loop = glutin::event_loop::EventLoop::new();
            let window_builder = glutin::window::WindowBuilder::new()
                .with_title("rasterproj")
                .with_inner_size(glutin::dpi::LogicalSize::new(1024.0, 768.0));
            let window = glutin::ContextBuilder::new()
                .with_vsync(true)
                .with_depth_buffer(24)
                .with_gl_profile(glutin::GlProfile::Core)
                .with_gl(glutin::GlRequest::Specific(glutin::Api::OpenGl, (3, 3)))
                .build_windowed(window_builder, &event_loop)
                .context("creating window")?
                .make_current()
                .map_err(|(_, e)| e)
                .context("making GL context current")?;
            let gl =
                glow::Context::from_loader_function(|s| window.get_proc_address(s) as *const _);
            (GlBackend::new(gl), window, event_loop)
        };

        let mut capabilities = Capabilities::detect(&gl);
        capabilities.buffer_caching &= !args.no_buffer_objects;
        let mut scene = SceneController::new();
        scene
            .activate(&gl, capabilities)
            .context("starting projector")?;

        gl.gl().clear_color(0.1, 0.1, 0.1, 1.0);
        gl.gl().enable(glow::DEPTH_TEST);

        use glutin::event::{Event, WindowEvent};
        use glutin::event_loop::ControlFlow;

        event_loop.run(move |event, _, control_flow| {
            *control_flow = ControlFlow::Wait;
            match event {
                Event::LoopDestroyed => {
                    return;
                }
                Event::MainEventsCleared => {
                    window.window().request_redraw();
                }
                Event::RedrawRequested(_) => {
                    let size = window.window().inner_size();
                    let aspect = size.width.max(1) as f32 / size.height.max(1) as f32;

                    gl.gl().clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
                    if let Err(e) = scene.draw(&gl, &document, &camera.host_view(aspect), &config)
                    {
                        error!("{e}");
                        scene.deactivate(&gl);
                        *control_flow = ControlFlow::Exit;
                        return;
                    }

                    if let Err(e) = window.swap_buffers() {
                        error!("{e}");
                    }
                }
                Event::WindowEvent { ref event, .. } => match event {
                    WindowEvent::Resized(physical_size) => {
                        window.resize(*physical_size);
                        let (w, h) = (physical_size.width as i32, physical_size.height as i32);
                        gl.gl().viewport(0, 0, w, h);
                    }
                    WindowEvent::CloseRequested => {
                        scene.deactivate(&gl);
                        *control_flow = ControlFlow::Exit
                    }
                    _ => (),
                },
                _ => (),
            }
        });
    }
}
