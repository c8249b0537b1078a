//! Numerical collaborators of the pipeline: baseline fitting, spike
//! deconvolution and peak finding. Each sits behind a trait so the
//! processing stages can be driven by other implementations.

pub mod baseline;
pub mod deconvolution;
pub mod linalg;
pub mod peaks;

pub use baseline::{BaselineEstimator, ModPolyBaseline};
pub use deconvolution::{Deconvolution, OasisDeconvolver, SpikeDeconvolver};
pub use peaks::{PeakFinder, ProminencePeakFinder};
