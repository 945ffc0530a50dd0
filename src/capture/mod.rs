/// Frame capture
///
/// The capture loop pushes every frame into a small [`FrameRing`]; triggers
/// go through the [`CaptureDispatcher`], which copies a frame and the aim
/// calibration into a job and offers it to the bounded processing queue.

pub mod dispatcher;
pub mod ring_buffer;
pub mod source;

pub use dispatcher::{CaptureDispatcher, DispatchOutcome};
pub use ring_buffer::{FramePick, FrameRing, RingBuffer};
pub use source::{zoom_region, FrameSource, ReplaySource, ZoomRegion};
