use log::debug;

use crate::backend::Backend;
use crate::error::Result;
use crate::image::RasterImage;

/// Texel data as uploaded for a raster image: packed RGB, last image row first,
/// so the top of the photograph sits at v = 1.
pub fn color_texels(image: &RasterImage) -> Result<Vec<u8>> {
    Ok(image.to_rgb()?.flipped_rows())
}

/// The raster photograph as a sampleable texture
pub struct ColorMap<B: Backend> {
    pub texture: B::Texture,
    pub width: u32,
    pub height: u32,
}

impl<B: Backend> ColorMap<B> {
    /// Uploads the whole image as a new linear, repeat-wrapped RGB texture
    pub fn create(backend: &B, image: &RasterImage) -> Result<Self> {
        let texels = color_texels(image)?;
        let (width, height) = (image.width() as u32, image.height() as u32);
        let texture = backend.create_color_texture(width, height, &texels)?;
        debug!("uploaded {width}x{height} raster color map");
        Ok(Self {
            texture,
            width,
            height,
        })
    }

    pub fn release(self, backend: &B) {
        backend.delete_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use crate::image::Image;

    #[test]
    fn test_texels_bottom_row_first() {
        // 1x2 RGBA: red on top, blue below
        let image = Image::new(vec![255, 0, 0, 255, 0, 0, 255, 255], 1, 4);
        assert_eq!(color_texels(&image).unwrap(), vec![0, 0, 255, 255, 0, 0]);
    }

    #[test]
    fn test_create_and_release() {
        let gl = FakeBackend::new();
        let image = Image::new(vec![0; 4 * 3 * 3], 4, 3);
        let map = ColorMap::create(&gl, &image).unwrap();
        assert_eq!((map.width, map.height), (4, 3));
        assert_eq!(
            gl.calls(),
            vec![Call::CreateColorTexture {
                id: map.texture,
                width: 4,
                height: 3
            }]
        );
        map.release(&gl);
        assert_eq!(gl.live_count(), 0);
    }
}
