//! Image ingestion.
//!
//! A [`Shot`] owns the decoded raster plus the grayscale and HSV views the
//! extractors read. Shots are consumed by feature extraction and dropped with
//! it, so raw pixels never reach the matchers or the planner.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use image::{imageops::FilterType, RgbImage};
use serde::{Deserialize, Serialize};

use crate::{config::IngestConfig, EngineError, Result};

/// Stable identifier of a shot within a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShotId(String);

impl ShotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Uses the file stem, falling back to the full path.
    pub fn from_path(path: &Path) -> Self {
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-channel f32 raster, row major.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Reads with edge replication for out-of-range coordinates.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.get(x, y)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    pub fn std_dev(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .data
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f32>()
            / self.data.len() as f32;
        variance.sqrt()
    }

    /// Box-averages the plane so that neither side exceeds `max_dimension`.
    pub fn downsample(&self, max_dimension: usize) -> Plane {
        let longest = self.width.max(self.height);
        if longest <= max_dimension || max_dimension == 0 {
            return self.clone();
        }
        let factor = (longest as f32 / max_dimension as f32).ceil() as usize;
        let width = (self.width / factor).max(1);
        let height = (self.height / factor).max(1);
        Plane::from_fn(width, height, |x, y| {
            let mut sum = 0.0;
            let mut count = 0usize;
            for sy in y * factor..((y + 1) * factor).min(self.height) {
                for sx in x * factor..((x + 1) * factor).min(self.width) {
                    sum += self.get(sx, sy);
                    count += 1;
                }
            }
            if count == 0 {
                0.0
            } else {
                sum / count as f32
            }
        })
    }
}

/// HSV view of a shot. Hue is in degrees `[0, 360)`, saturation and value in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct HsvPlanes {
    pub hue: Plane,
    pub saturation: Plane,
    pub value: Plane,
}

/// A decoded still standing in for one clip of the sequence.
#[derive(Debug)]
pub struct Shot {
    id: ShotId,
    path: Option<PathBuf>,
    rgb: RgbImage,
    gray: Plane,
    hsv: HsvPlanes,
}

impl Shot {
    /// Decodes the image at `path`. Failure is an [`EngineError::ImageLoad`]
    /// that only concerns this shot.
    pub fn load(path: impl AsRef<Path>, config: &IngestConfig) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|err| EngineError::image_load(path, err))?;
        let mut shot = Self::from_rgb(ShotId::from_path(path), decoded.to_rgb8(), config)
            .map_err(|err| EngineError::image_load(path, err))?;
        shot.path = Some(path.to_path_buf());
        Ok(shot)
    }

    /// Builds a shot from an in-memory raster, downscaling it to the
    /// configured working size.
    pub fn from_rgb(id: ShotId, rgb: RgbImage, config: &IngestConfig) -> Result<Self> {
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(EngineError::invalid_input("image has no pixels"));
        }

        let longest = width.max(height);
        let rgb = if longest > config.max_dimension {
            let scale = config.max_dimension as f32 / longest as f32;
            let new_width = ((width as f32 * scale).round() as u32).max(1);
            let new_height = ((height as f32 * scale).round() as u32).max(1);
            image::imageops::resize(&rgb, new_width, new_height, FilterType::Triangle)
        } else {
            rgb
        };

        let (gray, hsv) = derive_views(&rgb);
        Ok(Self {
            id,
            path: None,
            rgb,
            gray,
            hsv,
        })
    }

    pub fn id(&self) -> &ShotId {
        &self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn width(&self) -> usize {
        self.rgb.width() as usize
    }

    pub fn height(&self) -> usize {
        self.rgb.height() as usize
    }

    pub fn min_dimension(&self) -> usize {
        self.width().min(self.height())
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn gray(&self) -> &Plane {
        &self.gray
    }

    pub fn hsv(&self) -> &HsvPlanes {
        &self.hsv
    }
}

fn derive_views(rgb: &RgbImage) -> (Plane, HsvPlanes) {
    let width = rgb.width() as usize;
    let height = rgb.height() as usize;
    let mut gray = Plane::new(width, height);
    let mut hue = Plane::new(width, height);
    let mut saturation = Plane::new(width, height);
    let mut value = Plane::new(width, height);

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0.map(|c| c as f32 / 255.0);
        let (x, y) = (x as usize, y as usize);
        gray.set(x, y, 0.299 * r + 0.587 * g + 0.114 * b);
        let (h, s, v) = rgb_to_hsv(r, g, b);
        hue.set(x, y, h);
        saturation.set(x, y, s);
        value.set(x, y, v);
    }

    (
        gray,
        HsvPlanes {
            hue,
            saturation,
            value,
        },
    )
}

/// Converts normalised RGB into (hue degrees, saturation, value).
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };

    (hue.rem_euclid(360.0), saturation, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn converts_primary_colors_to_hsv() {
        let (h, s, v) = rgb_to_hsv(1.0, 0.0, 0.0);
        assert!(h.abs() < 1e-3 && (s - 1.0).abs() < 1e-6 && (v - 1.0).abs() < 1e-6);
        let (h, _, _) = rgb_to_hsv(0.0, 1.0, 0.0);
        assert!((h - 120.0).abs() < 1e-3);
        let (h, _, _) = rgb_to_hsv(0.0, 0.0, 1.0);
        assert!((h - 240.0).abs() < 1e-3);
        let (_, s, v) = rgb_to_hsv(0.5, 0.5, 0.5);
        assert_eq!(s, 0.0);
        assert!((v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downscales_large_rasters() {
        let rgb = RgbImage::from_pixel(1024, 256, Rgb([10, 20, 30]));
        let config = IngestConfig { max_dimension: 256 };
        let shot = Shot::from_rgb(ShotId::new("wide"), rgb, &config).unwrap();
        assert_eq!(shot.width(), 256);
        assert_eq!(shot.height(), 64);
        assert_eq!(shot.gray().width(), 256);
    }

    #[test]
    fn missing_files_report_image_load_errors() {
        let err = Shot::load("/definitely/not/here.png", &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::ImageLoad { .. }));
    }

    #[test]
    fn plane_downsample_averages_blocks() {
        let plane = Plane::from_fn(4, 4, |x, _| if x < 2 { 0.0 } else { 1.0 });
        let small = plane.downsample(2);
        assert_eq!((small.width(), small.height()), (2, 2));
        assert_eq!(small.get(0, 0), 0.0);
        assert_eq!(small.get(1, 1), 1.0);
    }

    #[test]
    fn shot_ids_come_from_file_stems() {
        let id = ShotId::from_path(Path::new("/shots/opening_wide.jpg"));
        assert_eq!(id.as_str(), "opening_wide");
    }
}
