//! Frame-paced dispatch of UI handlers, gated by engine activity.

pub mod driver;
pub mod frame;

pub use driver::FrameDriver;
pub use frame::{FrameHandle, FrameScheduler};
