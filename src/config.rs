use serde::{Deserialize, Serialize};

use crate::projection::ProjectionConfig;

/// Which meshes receive the raster
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Participation {
    CurrentMesh,
    AllMeshes,
}

/// How the host is currently rasterizing meshes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawMode {
    Points,
    Wire,
    Fill,
    /// Hidden-line view; the raster is painted along the edges, as in `Wire`
    Hidden,
}

/// Light and material products used when lighting is on
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightParams {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            ambient: [0.2, 0.2, 0.2, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
        }
    }
}

/// Per-frame settings from the host
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Alpha of the projected color, clamped to [0, 1]
    pub opacity: f32,
    pub lighting: bool,
    pub use_geometry_cache: bool,
    pub participation: Participation,
    pub draw_mode: DrawMode,
    pub light: LightParams,
    pub point_size: f32,
    /// Scale points by their eye distance relative to the mesh center
    pub point_attenuation: bool,
    pub projection: ProjectionConfig,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            lighting: true,
            use_geometry_cache: false,
            participation: Participation::CurrentMesh,
            draw_mode: DrawMode::Fill,
            light: LightParams::default(),
            point_size: 3.0,
            point_attenuation: true,
            projection: ProjectionConfig::default(),
        }
    }
}

impl DrawConfig {
    pub fn alpha(&self) -> f32 {
        if self.opacity.is_nan() {
            return 1.0;
        }
        self.opacity.clamp(0., 1.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: DrawConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DrawConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config: DrawConfig =
            serde_json::from_str(r#"{"opacity": 0.25, "participation": "all-meshes", "draw_mode": "wire"}"#)
                .unwrap();
        assert_eq!(config.opacity, 0.25);
        assert_eq!(config.participation, Participation::AllMeshes);
        assert_eq!(config.draw_mode, DrawMode::Wire);
        assert!(config.lighting);
    }

    #[test]
    fn test_alpha_clamped() {
        let mut config = DrawConfig::default();
        config.opacity = 3.;
        assert_eq!(config.alpha(), 1.);
        config.opacity = -1.;
        assert_eq!(config.alpha(), 0.);
    }
}
