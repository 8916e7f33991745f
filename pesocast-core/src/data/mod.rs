//! Data normalization: raw feeds onto a common time axis.

pub mod align;
pub mod frame;

pub use align::{align_series, AlignConfig, AlignmentError};
pub use frame::{AlignedFrame, FrameError, Frequency};
