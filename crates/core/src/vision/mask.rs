use std::path::Path;

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use super::filters::gaussian_blur;
use crate::{error::ExportError, ingest::Plane};

/// Soft compositing mask. `1.0` shows the incoming shot, `0.0` the
/// outgoing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl TransitionMask {
    /// Samples `f` at every pixel centre, passing normalised `(x, y)`.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(f32, f32) -> f32) -> Self {
        let (w, h) = (width.max(1), height.max(1));
        let mut data = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let nx = (x as f32 + 0.5) / w as f32;
                let ny = (y as f32 + 0.5) / h as f32;
                data.push(f(nx, ny).clamp(0.0, 1.0));
            }
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }

    /// Softens the mask edge with a Gaussian of `sigma` pixels.
    pub fn feathered(self, sigma: f32) -> Self {
        let plane = Plane::from_fn(self.width as usize, self.height as usize, |x, y| {
            self.data[y * self.width as usize + x]
        });
        let blurred = gaussian_blur(&plane, sigma);
        Self {
            width: self.width,
            height: self.height,
            data: blurred.data().iter().map(|v| v.clamp(0.0, 1.0)).collect(),
        }
    }

    pub fn value_at(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            0.0
        } else {
            self.data.iter().sum::<f32>() / self.data.len() as f32
        }
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([(self.value_at(x, y) * 255.0).round() as u8])
        })
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        self.to_gray_image()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|err| ExportError::Destination {
                path: path.to_path_buf(),
                source: std::io::Error::other(err.to_string()),
            })
    }
}
