use nalgebra::{Isometry3, Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

use crate::image::RasterImage;
use crate::intrinsics::Intrinsics;

/// A calibrated photograph: intrinsics, pose and pixels.
///
/// Owned by the host document and shared as `Arc<RasterShot>`; the projector
/// tracks it by pointer identity and never mutates it.
#[derive(Clone, Debug)]
pub struct RasterShot {
    pub intrinsics: Intrinsics,
    /// Camera to world. The camera looks down its local -Z axis, +Y up.
    pub pose: Isometry3<f32>,
    pub image: RasterImage,
}

impl RasterShot {
    pub fn new(intrinsics: Intrinsics, pose: Isometry3<f32>, image: RasterImage) -> Self {
        Self {
            intrinsics,
            pose,
            image,
        }
    }

    /// Camera at `eye` looking at `target`
    pub fn look_at(
        intrinsics: Intrinsics,
        eye: Point3<f32>,
        target: Point3<f32>,
        up: Vector3<f32>,
        image: RasterImage,
    ) -> Self {
        // look_at_rh builds world -> camera
        let view = Isometry3::look_at_rh(&eye, &target, &up);
        Self::new(intrinsics, view.inverse(), image)
    }

    /// Pose from a position and a rotation quaternion `[i, j, k, w]`
    pub fn from_position_rotation(
        intrinsics: Intrinsics,
        position: [f32; 3],
        rotation: [f32; 4],
        image: RasterImage,
    ) -> Self {
        let [i, j, k, w] = rotation;
        let rotation = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(w, i, j, k));
        let pose = Isometry3::from_parts(Translation3::from(position), rotation);
        Self::new(intrinsics, pose, image)
    }

    pub fn world_to_camera(&self) -> Matrix4<f32> {
        self.pose.inverse().to_homogeneous()
    }

    /// World-space camera center
    pub fn viewpoint(&self) -> Point3<f32> {
        Point3::from(self.pose.translation.vector)
    }

    /// Distance in front of the camera (along its view axis) of a world point
    pub fn depth_of(&self, world: &Point3<f32>) -> f32 {
        -self.pose.inverse_transform_point(world).z
    }
}
