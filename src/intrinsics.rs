use serde::{Deserialize, Serialize};

/// Pinhole intrinsics of a raster's camera
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Width of the image in pixels
    pub width: u32,
    /// Height of the image in pixels
    pub height: u32,
    /// Horizontal coordinate of the principal point of the image, as a pixel offset from the left edge
    pub ppx: f32,
    /// Vertical coordinate of the principal point of the image, as a pixel offset from the top edge
    pub ppy: f32,
    /// Focal length of the image plane, as a multiple of pixel width
    pub fx: f32,
    /// Focal length of the image plane, as a multiple of pixel height
    pub fy: f32,
}

/// View frustum extents on the plane at distance `focal` from the eye
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub focal: f32,
}

impl Intrinsics {
    /// Camera with the principal point at the image center and square pixels
    pub fn centered(width: u32, height: u32, focal: f32) -> Self {
        Self {
            width,
            height,
            ppx: width as f32 / 2.,
            ppy: height as f32 / 2.,
            fx: focal,
            fy: focal,
        }
    }

    /// Extents measured in horizontal pixel units; the vertical ones are
    /// rescaled by `fx / fy` so both axes share the focal distance `fx`.
    pub fn frustum(&self) -> Frustum {
        let aspect = self.fx / self.fy;
        Frustum {
            left: -self.ppx,
            right: self.width as f32 - self.ppx,
            bottom: -(self.height as f32 - self.ppy) * aspect,
            top: self.ppy * aspect,
            focal: self.fx,
        }
    }
}

impl Frustum {
    /// Same frustum, with extents moved to the plane at `distance`
    pub fn at_distance(&self, distance: f32) -> Frustum {
        let k = distance / self.focal;
        Frustum {
            left: self.left * k,
            right: self.right * k,
            bottom: self.bottom * k,
            top: self.top * k,
            focal: distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_frustum_is_symmetric() {
        let f = Intrinsics::centered(640, 480, 500.).frustum();
        assert_eq!(f.left, -320.);
        assert_eq!(f.right, 320.);
        assert_eq!(f.bottom, -240.);
        assert_eq!(f.top, 240.);
        assert_eq!(f.focal, 500.);
    }

    #[test]
    fn test_off_center_frustum() {
        let intr = Intrinsics {
            width: 100,
            height: 50,
            ppx: 30.,
            ppy: 10.,
            fx: 200.,
            fy: 100.,
        };
        let f = intr.frustum();
        assert_eq!(f.left, -30.);
        assert_eq!(f.right, 70.);
        assert_eq!(f.top, 20.);
        assert_eq!(f.bottom, -80.);
    }

    #[test]
    fn test_rescale_keeps_angles() {
        let f = Intrinsics::centered(640, 480, 500.).frustum();
        let n = f.at_distance(0.5);
        assert!((n.right / n.focal - f.right / f.focal).abs() < 1e-6);
        assert!((n.top / n.focal - f.top / f.focal).abs() < 1e-6);
        assert_eq!(n.focal, 0.5);
    }
}
