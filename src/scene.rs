//! Frame-to-frame orchestration of the projector.
//!
//! [`SceneController`] watches the host document, decides what has to be
//! rebuilt (geometry buffers, color map, projection, depth map), then paints
//! the participating meshes.
use std::sync::Arc;

use ahash::AHashSet;
use log::{debug, info};
use nalgebra::Matrix4;

use crate::backend::{Backend, Capabilities};
use crate::bounds::Aabb;
use crate::compositor::{Compositor, HostView};
use crate::config::{DrawConfig, Participation};
use crate::depth::{DepthMap, DepthPass};
use crate::error::{Error, Result};
use crate::geometry::GeometryBufferCache;
use crate::mesh::{Document, Mesh, MeshId};
use crate::projection::{ProjectionConfig, ProjectionState};
use crate::shading::ShadingParams;
use crate::shot::RasterShot;
use crate::texture::ColorMap;

/// Prepended to every shader source
pub const SHADER_VERSION: &str = "#version 330 core";

/// Everything about the participants that the depth map depends on
#[derive(Clone, Debug, PartialEq)]
struct ParticipantKey {
    participation: Participation,
    projection: ProjectionConfig,
    meshes: Vec<(MeshId, u64, bool, Matrix4<f32>)>,
}

impl ParticipantKey {
    fn new(config: &DrawConfig, meshes: &[&Mesh]) -> Self {
        Self {
            participation: config.participation,
            projection: config.projection,
            meshes: meshes
                .iter()
                .map(|m| (m.id(), m.version(), m.visible, m.transform))
                .collect(),
        }
    }
}

/// Textures and matrices derived from the current raster
struct RasterResources<B: Backend> {
    shot: Arc<RasterShot>,
    color: ColorMap<B>,
    projection: ProjectionState,
    depth: DepthMap<B>,
}

impl<B: Backend> RasterResources<B> {
    fn release(self, backend: &B) {
        self.color.release(backend);
        self.depth.release(backend);
    }
}

struct Active<B: Backend> {
    depth_pass: DepthPass<B>,
    compositor: Compositor<B>,
    cache: GeometryBufferCache<B>,
    key: Option<ParticipantKey>,
    bounds: Aabb,
    raster: Option<RasterResources<B>>,
}

impl<B: Backend> Active<B> {
    /// Color, then projection, then depth
    fn build_raster(
        &self,
        backend: &B,
        shot: &Arc<RasterShot>,
        participants: &[&Mesh],
        config: &DrawConfig,
    ) -> Result<RasterResources<B>> {
        let color = ColorMap::create(backend, &shot.image)?;
        let projection = ProjectionState::build(shot, &self.bounds, &config.projection);
        let depth = match self.render_depth(backend, &projection, participants, &color) {
            Ok(depth) => depth,
            Err(e) => {
                color.release(backend);
                return Err(e);
            }
        };

        Ok(RasterResources {
            shot: shot.clone(),
            color,
            projection,
            depth,
        })
    }

    fn render_depth(
        &self,
        backend: &B,
        projection: &ProjectionState,
        participants: &[&Mesh],
        color: &ColorMap<B>,
    ) -> Result<DepthMap<B>> {
        self.depth_pass.render(
            backend,
            participants,
            &self.cache,
            projection,
            color.width,
            color.height,
        )
    }

    fn release_raster(&mut self, backend: &B) {
        if let Some(raster) = self.raster.take() {
            debug!("releasing raster textures");
            raster.release(backend);
        }
    }
}

/// Drives the projector across frames.
///
/// Inactive until [`SceneController::activate`] compiles both programs; from
/// then on every [`SceneController::draw`] refreshes whatever the document
/// change invalidated and paints the raster onto the participating meshes.
pub struct SceneController<B: Backend> {
    active: Option<Active<B>>,
}

impl<B: Backend> Default for SceneController<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> SceneController<B> {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Compiles and links the depth and projective programs. On failure
    /// nothing stays allocated and the controller remains inactive.
    pub fn activate(&mut self, backend: &B, capabilities: Capabilities) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let depth_pass = DepthPass::create(backend, SHADER_VERSION)?;
        let compositor = match Compositor::create(backend, SHADER_VERSION) {
            Ok(c) => c,
            Err(e) => {
                depth_pass.release(backend);
                return Err(e);
            }
        };

        info!("raster projector active ({:?})", capabilities);
        self.active = Some(Active {
            depth_pass,
            compositor,
            cache: GeometryBufferCache::new(capabilities),
            key: None,
            bounds: Aabb::empty(),
            raster: None,
        });
        Ok(())
    }

    /// Releases every GPU object the controller owns
    pub fn deactivate(&mut self, backend: &B) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.release_raster(backend);
        active.cache.clear(backend);
        active.depth_pass.release(backend);
        active.compositor.release(backend);
        info!("raster projector released");
    }

    /// Projection of the current raster, if one is loaded
    pub fn projection(&self) -> Option<&ProjectionState> {
        Some(&self.active.as_ref()?.raster.as_ref()?.projection)
    }

    /// Bounds of the participating meshes as of the last frame
    pub fn bounds(&self) -> Option<&Aabb> {
        self.active.as_ref().map(|a| &a.bounds)
    }

    pub fn cache(&self) -> Option<&GeometryBufferCache<B>> {
        self.active.as_ref().map(|a| &a.cache)
    }

    /// Runs one frame: detect changes, rebuild what they invalidated, paint.
    pub fn draw(
        &mut self,
        backend: &B,
        document: &Document,
        view: &HostView,
        config: &DrawConfig,
    ) -> Result<()> {
        let active = self.active.as_mut().ok_or(Error::NotActive)?;

        let participants: Vec<&Mesh> = match config.participation {
            Participation::CurrentMesh => document.current().into_iter().collect(),
            Participation::AllMeshes => document.meshes.iter().collect(),
        };

        let key = ParticipantKey::new(config, &participants);
        let scene_changed = active.key.as_ref() != Some(&key);
        if scene_changed {
            active.bounds = Aabb::empty();
            for mesh in participants.iter().filter(|m| m.visible) {
                active.bounds.add_transformed(&mesh.transform, &mesh.local_bounds());
            }
            let keep: AHashSet<MeshId> = participants.iter().map(|m| m.id()).collect();
            active.cache.retain(backend, &keep);
            // Committed once projection and depth have caught up
            active.key = None;
            debug!(
                "participants changed: {} meshes, bounds {:?}",
                participants.len(),
                active.bounds
            );
        }

        for mesh in &participants {
            active.cache.ensure(backend, mesh, config.use_geometry_cache)?;
        }

        let Some(shot) = &document.raster else {
            active.release_raster(backend);
            active.key = Some(key);
            return Ok(());
        };

        let same_raster = matches!(&active.raster, Some(r) if Arc::ptr_eq(&r.shot, shot));
        if !same_raster {
            debug!("raster changed, rebuilding color, projection and depth");
            active.release_raster(backend);
            active.raster = Some(active.build_raster(backend, shot, &participants, config)?);
        } else if scene_changed {
            debug!("scene changed, rebuilding projection and depth");
            let projection = ProjectionState::build(shot, &active.bounds, &config.projection);
            if let Some(color) = active.raster.as_ref().map(|r| &r.color) {
                let depth = active.render_depth(backend, &projection, &participants, color)?;
                if let Some(raster) = active.raster.as_mut() {
                    std::mem::replace(&mut raster.depth, depth).release(backend);
                    raster.projection = projection;
                }
            }
        }
        active.key = Some(key);

        let Some(raster) = &active.raster else {
            return Ok(());
        };
        let params = ShadingParams::new(
            &raster.projection,
            raster.shot.viewpoint(),
            view.light_to_obj,
            config,
        );
        active.compositor.draw(
            backend,
            &raster.color,
            &raster.depth,
            &params,
            view,
            config,
            &participants,
            &active.cache,
        )
    }
}
