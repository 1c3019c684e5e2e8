//! Image-geometry and signal-processing primitives shared by the feature
//! extractors: filtering, edge detection, Hough transforms, contour geometry,
//! spectral analysis, clustering and mask generation.

pub mod contours;
pub mod filters;
pub mod hough;
pub mod kmeans;
pub mod mask;
pub mod spectrum;

pub use filters::{EdgeMap, Gradients, Keypoint};
pub use hough::{Circle, Segment};
pub use mask::TransitionMask;
pub use spectrum::SpectrumAnalyzer;
