use nalgebra::{Matrix4, Point3};

/// Axis-aligned box; starts out empty
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn add_point(&mut self, p: &Point3<f32>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Grows to contain `other` as seen through `transform`
    pub fn add_transformed(&mut self, transform: &Matrix4<f32>, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        for corner in other.corners() {
            self.add_point(&transform.transform_point(&corner));
        }
    }

    pub fn corners(&self) -> [Point3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_empty() {
        let mut b = Aabb::empty();
        assert!(b.is_empty());
        b.add_point(&Point3::new(1., 2., 3.));
        assert!(!b.is_empty());
        assert_eq!(b.min, b.max);
    }

    #[test]
    fn test_add_transformed() {
        let unit = Aabb::new(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5));
        let xf = Matrix4::new_translation(&Vector3::new(10., 0., 0.))
            * Matrix4::new_rotation(Vector3::z() * std::f32::consts::FRAC_PI_4);

        let mut scene = Aabb::empty();
        scene.add_transformed(&Matrix4::identity(), &unit);
        scene.add_transformed(&xf, &unit);

        let half_diag = 0.5 * 2f32.sqrt();
        assert!((scene.max.x - (10. + half_diag)).abs() < 1e-5);
        assert!((scene.min.x + 0.5).abs() < 1e-5);
        assert!((scene.max.y - half_diag).abs() < 1e-5);
        assert!((scene.max.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_empty_input_ignored() {
        let mut scene = Aabb::empty();
        scene.add_transformed(&Matrix4::identity(), &Aabb::empty());
        assert!(scene.is_empty());
    }
}
