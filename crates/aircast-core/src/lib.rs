// crates/aircast-core/src/lib.rs
//
// Pure data for the playout pipeline — no threads, no I/O, no GPU.
// Everything the engine crate composes per tick lives here: pixel formats,
// frame buffers, the draw-frame composition tree, transforms and tweening,
// video formats with their audio cadences, and the monitor state map.

pub mod draw_frame;
pub mod easing;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod monitor;
pub mod pixel_format;
pub mod transform;
pub mod video_format;

pub use draw_frame::{DrawFrame, FrameVisitor};
pub use easing::Ease;
pub use error::PlayoutError;
pub use frame::{CommitFn, ConstFrame, MutableFrame, StreamTag};
pub use geometry::FrameGeometry;
pub use pixel_format::{PixelFormat, PixelFormatDesc};
pub use transform::{
    AudioTransform, BlendMode, FrameTransform, ImageTransform, SideDataTransform, TweenedTransform,
};
pub use video_format::{FormatRepository, VideoField, VideoFormat, VideoFormatDesc};
