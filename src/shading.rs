//! CPU rendition of the projective shader in `shaders/projective.*`.
//!
//! Takes the same inputs as the GPU program and makes the same decisions in
//! the same order, so the discard rules and the lighting term can be checked
//! without a GL context.
use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

use crate::config::{DrawConfig, LightParams};
use crate::projection::ProjectionState;

/// Visibility at or below this counts as occluded
pub const VISIBILITY_THRESHOLD: f32 = 0.001;

/// Uniform values shared by every mesh in one compositing pass
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShadingParams {
    /// `u_ProjMat`
    pub shadow_projection: Matrix4<f32>,
    /// `u_Viewpoint`
    pub viewpoint: Point3<f32>,
    /// `u_LightToObj`
    pub light_to_obj: Matrix4<f32>,
    /// `u_IsLightActivated`
    pub lighting: bool,
    /// `u_AlphaValue`
    pub alpha: f32,
    /// `u_LightAmbient`, `u_LightDiffuse`
    pub light: LightParams,
}

impl ShadingParams {
    pub fn new(
        projection: &ProjectionState,
        viewpoint: Point3<f32>,
        light_to_obj: Matrix4<f32>,
        config: &DrawConfig,
    ) -> Self {
        Self {
            shadow_projection: projection.shadow_projection,
            viewpoint,
            light_to_obj,
            lighting: config.lighting,
            alpha: config.alpha(),
            light: config.light,
        }
    }
}

/// Per-vertex outputs, interpolated across a triangle on the GPU
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Varyings {
    /// Homogeneous raster texture coordinate
    pub projected: Vector4<f32>,
    pub normal: Vector3<f32>,
    /// From the surface point to the raster viewpoint
    pub raster_view: Vector3<f32>,
    pub light: Vector3<f32>,
}

pub fn project_vertex(
    params: &ShadingParams,
    model: &Matrix4<f32>,
    position: &Point3<f32>,
    normal: &Vector3<f32>,
) -> Varyings {
    let world = model * position.to_homogeneous();
    let linear: Matrix3<f32> = model.fixed_slice::<3, 3>(0, 0).into_owned();

    Varyings {
        projected: params.shadow_projection * world,
        normal: linear * normal,
        raster_view: params.viewpoint.coords - world.xyz(),
        light: params.light_to_obj.column(2).xyz(),
    }
}

/// Why a fragment was dropped
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Discard {
    BackFacing,
    OutsideFrustum,
    Occluded,
}

/// The two texture lookups of the projective shader
pub trait MapSampler {
    /// Shadow comparison against the depth map: 1 visible, 0 hidden
    fn visibility(&self, projected: &Vector4<f32>) -> f32;
    /// RGBA color of the raster, channels in [0, 1]
    fn color(&self, projected: &Vector4<f32>) -> Vector4<f32>;
}

/// Color of one fragment, or the reason it was discarded
pub fn shade(
    params: &ShadingParams,
    varyings: &Varyings,
    maps: &dyn MapSampler,
) -> Result<Vector4<f32>, Discard> {
    if varyings.normal.dot(&varyings.raster_view) <= 0. {
        return Err(Discard::BackFacing);
    }

    let p = &varyings.projected;
    let (u, v) = (p.x / p.w, p.y / p.w);
    if !(0. ..=1.).contains(&u) || !(0. ..=1.).contains(&v) {
        return Err(Discard::OutsideFrustum);
    }

    if maps.visibility(p) <= VISIBILITY_THRESHOLD {
        return Err(Discard::Occluded);
    }

    let mut color = maps.color(p);

    if params.lighting {
        let l = varyings.light.normalize();
        let n = varyings.normal.normalize();
        let kd = l.dot(&n).max(0.);
        let ambient = Vector4::from(params.light.ambient);
        let diffuse = Vector4::from(params.light.diffuse);
        color = ambient + kd * diffuse.component_mul(&color);
    }

    Ok(Vector4::new(color.x, color.y, color.z, params.alpha))
}

/// Nearest-texel lookups into uploaded texture data
pub struct TexelSampler<'a> {
    /// Packed RGB8, bottom row first
    pub color: &'a [u8],
    pub width: usize,
    pub height: usize,
    /// Stored depths in [0, 1], bottom row first; `None` hides nothing
    pub depth: Option<&'a [f32]>,
}

impl TexelSampler<'_> {
    fn texel(&self, u: f32, v: f32) -> usize {
        // Repeat wrap
        let wrap = |t: f32, n: usize| ((t - t.floor()) * n as f32).min(n as f32 - 1.) as usize;
        wrap(v, self.height) * self.width + wrap(u, self.width)
    }
}

impl MapSampler for TexelSampler<'_> {
    fn visibility(&self, p: &Vector4<f32>) -> f32 {
        let Some(depth) = self.depth else {
            return 1.;
        };
        let stored = depth[self.texel(p.x / p.w, p.y / p.w)];
        if p.z / p.w <= stored {
            1.
        } else {
            0.
        }
    }

    fn color(&self, p: &Vector4<f32>) -> Vector4<f32> {
        let i = 3 * self.texel(p.x / p.w, p.y / p.w);
        let [r, g, b] = [0, 1, 2].map(|c| self.color[i + c] as f32 / 255.);
        Vector4::new(r, g, b, 1.)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::bounds::Aabb;
    use crate::image::Image;
    use crate::intrinsics::Intrinsics;
    use crate::mesh::{Mesh, MeshId};
    use crate::projection::ProjectionConfig;
    use crate::shot::RasterShot;
    use crate::texture::color_texels;

    const W: usize = 8;
    const H: usize = 8;

    struct Scene {
        cube: Mesh,
        shot: RasterShot,
        params: ShadingParams,
        texels: Vec<u8>,
    }

    /// Unit cube at the origin, raster 10 units up +Z looking at it
    fn scene(config: &DrawConfig) -> Scene {
        let image = Image::new([200u8, 100, 50].repeat(W * H), W, 3);
        let shot = RasterShot::look_at(
            Intrinsics::centered(W as u32, H as u32, 16.),
            Point3::new(0., 0., 10.),
            Point3::origin(),
            Vector3::y(),
            image,
        );
        let cube = Mesh::unit_cube(MeshId(0));
        let mut bounds = Aabb::empty();
        bounds.add_transformed(&cube.transform, &cube.local_bounds());
        let projection = ProjectionState::build(&shot, &bounds, &ProjectionConfig::default());
        let params = ShadingParams::new(
            &projection,
            shot.viewpoint(),
            Matrix4::identity(),
            config,
        );
        let texels = color_texels(&shot.image).unwrap();
        Scene {
            cube,
            shot,
            params,
            texels,
        }
    }

    /// Counts lookups so tests can tell whether a discarded fragment sampled
    struct Counting<'a> {
        inner: TexelSampler<'a>,
        lookups: Cell<usize>,
    }

    impl MapSampler for Counting<'_> {
        fn visibility(&self, p: &Vector4<f32>) -> f32 {
            self.lookups.set(self.lookups.get() + 1);
            self.inner.visibility(p)
        }

        fn color(&self, p: &Vector4<f32>) -> Vector4<f32> {
            self.lookups.set(self.lookups.get() + 1);
            self.inner.color(p)
        }
    }

    fn sampler(texels: &[u8]) -> TexelSampler<'_> {
        TexelSampler {
            color: texels,
            width: W,
            height: H,
            depth: None,
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_front_face_gets_raster_color() {
        let config = DrawConfig {
            lighting: false,
            opacity: 1.0,
            ..Default::default()
        };
        let s = scene(&config);
        let maps = sampler(&s.texels);

        // Every corner of the +Z side, plus its center
        let front: Vec<_> = s
            .cube
            .vertices()
            .iter()
            .filter(|v| v.normal == Vector3::z())
            .map(|v| (v.position, v.normal))
            .chain([(Point3::new(0., 0., 0.5), Vector3::z())])
            .collect();
        assert_eq!(front.len(), 5);

        for (p, n) in front {
            let var = project_vertex(&s.params, &s.cube.transform, &p, &n);
            let color = shade(&s.params, &var, &maps).unwrap();
            assert!(close(color.x, 200. / 255.));
            assert!(close(color.y, 100. / 255.));
            assert!(close(color.z, 50. / 255.));
            assert_eq!(color.w, 1.0);
        }
    }

    #[test]
    fn test_face_center_hits_image_center() {
        let s = scene(&DrawConfig::default());
        let var = project_vertex(
            &s.params,
            &s.cube.transform,
            &Point3::new(0., 0., 0.5),
            &Vector3::z(),
        );
        let p = var.projected;
        assert!(close(p.x / p.w, 0.5) && close(p.y / p.w, 0.5));
        assert!(close(s.shot.depth_of(&Point3::new(0., 0., 0.5)), 9.5));
    }

    #[test]
    fn test_other_faces_back_facing_without_sampling() {
        let s = scene(&DrawConfig::default());
        let maps = Counting {
            inner: sampler(&s.texels),
            lookups: Cell::new(0),
        };

        for v in s.cube.vertices().iter().filter(|v| v.normal != Vector3::z()) {
            let var = project_vertex(&s.params, &s.cube.transform, &v.position, &v.normal);
            assert_eq!(shade(&s.params, &var, &maps), Err(Discard::BackFacing));
        }
        assert_eq!(maps.lookups.get(), 0);
    }

    #[test]
    fn test_outside_footprint_discarded_regardless_of_settings() {
        for lighting in [false, true] {
            let config = DrawConfig {
                lighting,
                ..Default::default()
            };
            let s = scene(&config);
            let maps = Counting {
                inner: sampler(&s.texels),
                lookups: Cell::new(0),
            };

            // Half-width of the footprint at depth 10 is 4 * 10 / 16 = 2.5
            let var = project_vertex(
                &s.params,
                &Matrix4::identity(),
                &Point3::new(3., 0., 0.),
                &Vector3::z(),
            );
            assert_eq!(shade(&s.params, &var, &maps), Err(Discard::OutsideFrustum));
            assert_eq!(maps.lookups.get(), 0);
        }
    }

    #[test]
    fn test_occluded_fragment_discarded() {
        let s = scene(&DrawConfig::default());
        let depth = vec![0.1; W * H];
        let maps = TexelSampler {
            depth: Some(&depth),
            ..sampler(&s.texels)
        };
        let var = project_vertex(
            &s.params,
            &Matrix4::identity(),
            // Cube center, behind the front face
            &Point3::origin(),
            &Vector3::z(),
        );
        assert_eq!(shade(&s.params, &var, &maps), Err(Discard::Occluded));

        // Stored depth at the far plane hides nothing
        let depth = vec![1.0; W * H];
        let maps = TexelSampler {
            depth: Some(&depth),
            ..sampler(&s.texels)
        };
        assert!(shade(&s.params, &var, &maps).is_ok());
    }

    #[test]
    fn test_lighting_term() {
        let config = DrawConfig {
            lighting: true,
            opacity: 0.5,
            ..Default::default()
        };
        let mut s = scene(&config);
        let maps = sampler(&s.texels);
        let var = project_vertex(
            &s.params,
            &s.cube.transform,
            &Point3::new(0., 0., 0.5),
            &Vector3::z(),
        );

        // Light straight down the normal: ambient + diffuse * color
        let lit = shade(&s.params, &var, &maps).unwrap();
        assert!(close(lit.x, 0.2 + 0.8 * 200. / 255.));
        assert_eq!(lit.w, 0.5);

        // Light from behind: ambient only
        s.params.light_to_obj = Matrix4::new_nonuniform_scaling(&Vector3::new(1., 1., -1.));
        let var = project_vertex(
            &s.params,
            &s.cube.transform,
            &Point3::new(0., 0., 0.5),
            &Vector3::z(),
        );
        let unlit = shade(&s.params, &var, &maps).unwrap();
        assert!(close(unlit.x, 0.2) && close(unlit.y, 0.2));
    }

    #[test]
    fn test_top_of_image_lands_on_top_of_footprint() {
        // Red top half, blue bottom half
        let mut data = vec![];
        for row in 0..H {
            let px = if row < H / 2 { [255, 0, 0] } else { [0, 0, 255] };
            data.extend(px.repeat(W));
        }
        let texels = color_texels(&Image::new(data, W, 3)).unwrap();
        let s = scene(&DrawConfig::default());
        let maps = sampler(&texels);

        let up = project_vertex(&s.params, &Matrix4::identity(), &Point3::new(0., 1., 0.), &Vector3::z());
        assert_eq!(maps.color(&up.projected).x, 1.);
        let down = project_vertex(&s.params, &Matrix4::identity(), &Point3::new(0., -1., 0.), &Vector3::z());
        assert_eq!(maps.color(&down.projected).z, 1.);
    }
}
