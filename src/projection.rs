//! Raster camera frustum and the matrices derived from it.
//!
//! Matrices are stored for column vectors (`M * v`), which is what nalgebra
//! and GLSL use. Written for row vectors the shadow projection reads
//! `pose × projection × bias`; for column vectors that composition is
//! `bias * projection * pose`.
use log::warn;
use nalgebra::{Matrix4, Point2, Point3, Vector4};
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::intrinsics::Frustum;
use crate::shot::RasterShot;

/// Fallbacks for degenerate near/far planes
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Smallest near plane accepted as computed
    pub near_epsilon: f32,
    /// Near plane used when the computed one is below `near_epsilon`
    pub default_near: f32,
    /// Depth range used when the far plane does not lie beyond the near one
    pub default_span: f32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            near_epsilon: 1e-4,
            default_near: 0.1,
            default_span: 1000.,
        }
    }
}

/// Clamps applied while building a [`ProjectionState`]; each field holds the
/// value that was computed before it got replaced.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PlaneCorrections {
    pub near_clamped: Option<f32>,
    pub far_extended: Option<f32>,
}

impl PlaneCorrections {
    pub fn any(&self) -> bool {
        self.near_clamped.is_some() || self.far_extended.is_some()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProjectionState {
    pub near: f32,
    pub far: f32,
    /// Extents on the near plane
    pub frustum: Frustum,
    pub projection: Matrix4<f32>,
    /// World to raster camera
    pub pose: Matrix4<f32>,
    /// World to raster texture space, before the perspective divide
    pub shadow_projection: Matrix4<f32>,
    pub corrections: PlaneCorrections,
}

/// Maps clip space [-1, 1]³ onto texture space [0, 1]³
pub fn bias_matrix() -> Matrix4<f32> {
    #[rustfmt::skip]
    let bias = Matrix4::new(
        0.5, 0.0, 0.0, 0.5,
        0.0, 0.5, 0.0, 0.5,
        0.0, 0.0, 0.5, 0.5,
        0.0, 0.0, 0.0, 1.0,
    );
    bias
}

/// Off-axis perspective projection, as `glFrustum` builds it
pub fn perspective(frustum: &Frustum, near: f32, far: f32) -> Matrix4<f32> {
    let Frustum {
        left: l,
        right: r,
        bottom: b,
        top: t,
        ..
    } = *frustum;

    let mut m = Matrix4::zeros();
    m[(0, 0)] = 2. * near / (r - l);
    m[(0, 2)] = (r + l) / (r - l);
    m[(1, 1)] = 2. * near / (t - b);
    m[(1, 2)] = (t + b) / (t - b);
    m[(2, 2)] = (near + far) / (near - far);
    m[(2, 3)] = 2. * near * far / (near - far);
    m[(3, 2)] = -1.;
    m
}

/// Camera-space depth range spanned by the corners of `bounds`
pub fn depth_range(shot: &RasterShot, bounds: &Aabb) -> (f32, f32) {
    if bounds.is_empty() {
        return (0., 0.);
    }
    bounds
        .corners()
        .iter()
        .map(|c| shot.depth_of(c))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}

impl ProjectionState {
    pub fn build(shot: &RasterShot, bounds: &Aabb, config: &ProjectionConfig) -> Self {
        let (mut near, mut far) = depth_range(shot, bounds);
        let mut corrections = PlaneCorrections::default();

        if !(near >= config.near_epsilon) {
            warn!(
                "near plane {near} below {}, using {}",
                config.near_epsilon, config.default_near
            );
            corrections.near_clamped = Some(near);
            near = config.default_near;
        }
        if !(far > near) {
            warn!(
                "far plane {far} not beyond near plane {near}, using {}",
                near + config.default_span
            );
            corrections.far_extended = Some(far);
            far = near + config.default_span;
        }

        let frustum = shot.intrinsics.frustum().at_distance(near);
        let projection = perspective(&frustum, near, far);
        let pose = shot.world_to_camera();
        let shadow_projection = bias_matrix() * projection * pose;

        Self {
            near,
            far,
            frustum,
            projection,
            pose,
            shadow_projection,
            corrections,
        }
    }

    /// Homogeneous raster texture coordinate of a world point
    pub fn project_homogeneous(&self, world: &Point3<f32>) -> Vector4<f32> {
        self.shadow_projection * world.to_homogeneous()
    }

    /// Raster texture coordinate of a world point after the perspective divide
    pub fn project(&self, world: &Point3<f32>) -> Point2<f32> {
        let p = self.project_homogeneous(world);
        Point2::new(p.x / p.w, p.y / p.w)
    }
}
