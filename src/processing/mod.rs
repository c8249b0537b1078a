//! Per-trace and per-recording processing stages

pub mod batch;
pub mod budget;
pub mod bursts;
pub mod denoise;
pub mod sttc;

pub use batch::{BatchAligner, BatchResult, CellAnalysis, CellReport};
pub use budget::CellBudget;
pub use bursts::BurstDetector;
pub use denoise::{DenoisedSignal, DenoisingPipeline};
pub use sttc::{RecordingSpan, circular_shift, sttc, sttc_matrix, surrogate_threshold};
