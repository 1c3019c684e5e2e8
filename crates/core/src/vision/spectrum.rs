use std::{fmt, sync::Arc};

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::{num_complex::Complex32, Fft, FftPlanner};

use crate::{ingest::Plane, EngineError, Result};

/// 2D magnitude spectrum helper. Rows go through a real-to-complex plan and
/// columns through a complex plan. Plans are cached per size, so one analyzer
/// can be reused across shots of equal dimensions.
pub struct SpectrumAnalyzer {
    real_planner: RealFftPlanner<f32>,
    complex_planner: FftPlanner<f32>,
    plans: Option<FftResources>,
}

struct FftResources {
    width: usize,
    height: usize,
    rows: Arc<dyn RealToComplex<f32>>,
    columns: Arc<dyn Fft<f32>>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            real_planner: RealFftPlanner::new(),
            complex_planner: FftPlanner::new(),
            plans: None,
        }
    }

    /// Share of spectral magnitude that lies outside a disk of radius
    /// `low_radius_fraction * min(width, height)` around DC.
    pub fn high_frequency_ratio(&mut self, plane: &Plane, low_radius_fraction: f32) -> Result<f32> {
        let (width, height) = (plane.width(), plane.height());
        if width < 2 || height < 2 {
            return Ok(0.0);
        }

        let plans = self.prepare(width, height);
        let half = width / 2 + 1;
        let mut spectrum = vec![Complex32::new(0.0, 0.0); half * height];

        let mut row_in = plans.rows.make_input_vec();
        let mut row_out = plans.rows.make_output_vec();
        for y in 0..height {
            for x in 0..width {
                row_in[x] = plane.get(x, y);
            }
            plans
                .rows
                .process(&mut row_in, &mut row_out)
                .map_err(|err| EngineError::Fft(err.to_string()))?;
            for (kx, bin) in row_out.iter().enumerate() {
                spectrum[y * half + kx] = Complex32::new(bin.re, bin.im);
            }
        }

        let radius = width.min(height) as f32 * low_radius_fraction;
        let mut column = vec![Complex32::new(0.0, 0.0); height];
        let (mut high, mut total) = (0.0_f64, 0.0_f64);
        for kx in 0..half {
            for ky in 0..height {
                column[ky] = spectrum[ky * half + kx];
            }
            plans.columns.process(&mut column);

            // Bins other than DC and Nyquist stand in for their mirrored twin.
            let weight = if kx == 0 || (width % 2 == 0 && kx == width / 2) {
                1.0
            } else {
                2.0
            };
            for (ky, bin) in column.iter().enumerate() {
                let fy = if ky <= height / 2 { ky } else { height - ky };
                let distance = (kx as f32).hypot(fy as f32);
                let magnitude = weight * bin.norm() as f64;
                total += magnitude;
                if distance > radius {
                    high += magnitude;
                }
            }
        }

        if total <= f64::EPSILON {
            Ok(0.0)
        } else {
            Ok((high / total).clamp(0.0, 1.0) as f32)
        }
    }

    fn prepare(&mut self, width: usize, height: usize) -> &FftResources {
        if let Some(plans) = self
            .plans
            .take()
            .filter(|plans| plans.width == width && plans.height == height)
        {
            return self.plans.insert(plans);
        }

        let plans = FftResources {
            width,
            height,
            rows: self.real_planner.plan_fft_forward(width),
            columns: self.complex_planner.plan_fft_forward(height),
        };
        self.plans.insert(plans)
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("plans", &self.plans.as_ref().map(|p| (p.width, p.height)))
            .finish()
    }
}
