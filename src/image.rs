use png::{BitDepth, ColorType, Transformations};
use std::fs::File;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Image<T> {
    /// Image data, top row first
    data: Vec<T>,
    /// Width * Stride
    row_size: usize,
    /// Number of channels per pixel
    stride: usize,
}

impl<T> Image<T> {
    pub fn new(data: Vec<T>, width: usize, stride: usize) -> Self {
        Self {
            data,
            row_size: width * stride,
            stride,
        }
    }

    pub fn height(&self) -> usize {
        if self.row_size == 0 {
            return 0;
        }
        self.data.len() / self.row_size
    }

    pub fn width(&self) -> usize {
        if self.stride == 0 {
            return 0;
        }
        self.row_size / self.stride
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn map<U, const N: usize>(&self, f: impl Fn(&[T]) -> [U; N]) -> Image<U> {
        let data = self
            .data()
            .chunks_exact(self.stride)
            .map(f)
            .flatten()
            .collect();
        Image::new(data, self.width(), N)
    }
}

impl<T: Copy> Image<T> {
    /// Rows in reverse order: the last image row comes first
    pub fn flipped_rows(&self) -> Vec<T> {
        if self.row_size == 0 {
            return vec![];
        }
        self.data
            .chunks_exact(self.row_size)
            .rev()
            .flatten()
            .copied()
            .collect()
    }
}

/// 8-bit color photograph attached to a raster
pub type RasterImage = Image<u8>;

impl RasterImage {
    /// Converts any 8-bit layout (gray, gray+alpha, RGB, RGBA) to packed RGB
    pub fn to_rgb(&self) -> Result<RasterImage> {
        if self.is_empty() {
            return Err(Error::BadImage("image has no pixels".into()));
        }
        if self.data.len() % self.row_size != 0 {
            return Err(Error::BadImage(format!(
                "{} bytes is not a whole number of {}-byte rows",
                self.data.len(),
                self.row_size
            )));
        }

        Ok(match self.stride {
            1 | 2 => self.map(|p| [p[0]; 3]),
            3 => self.clone(),
            4 => self.map(|p| [p[0], p[1], p[2]]),
            n => return Err(Error::BadImage(format!("unsupported channel count {n}"))),
        })
    }
}

pub fn load_color_png(path: impl AsRef<Path>) -> Result<RasterImage> {
    let mut decoder = png::Decoder::new(File::open(path)?);
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);

    let mut reader = decoder.read_info()?;

    let mut data = vec![0; reader.output_buffer_size()];

    let info = reader.next_frame(&mut data)?;

    if info.bit_depth != BitDepth::Eight {
        return Err(Error::BadImage(format!(
            "expected 8-bit samples, got {:?}",
            info.bit_depth
        )));
    }

    let stride = match info.color_type {
        ColorType::Grayscale => 1,
        ColorType::GrayscaleAlpha => 2,
        ColorType::Rgb => 3,
        ColorType::Rgba => 4,
        other => return Err(Error::BadImage(format!("unexpected color type {other:?}"))),
    };

    data.truncate(info.buffer_size());

    Image::new(data, info.width as usize, stride).to_rgb()
}
