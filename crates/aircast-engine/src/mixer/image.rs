// crates/aircast-engine/src/mixer/image.rs
//
// The image-mixer contract.
//
// The engine does not care whether compositing happens on a GPU or in
// software — it walks each layer's draw-frame tree into the mixer
// (`push`/`visit`/`pop`), then asks for the composited BGRA raster via
// `render`, whose reply is awaited one tick later (pipeline depth 2).
//
// Methods take `&self`: a render-backend naturally serializes its own
// command stream, and the channel shares the mixer with producers through
// the `FrameFactory` side of the contract.

use aircast_core::{ConstFrame, FrameTransform, FrameVisitor, MutableFrame, PixelFormatDesc, StreamTag, VideoFormatDesc};

use crate::sync::Reply;

/// Allocates producer frames whose `commit` hook uploads planes at freeze
/// time (GPU backends) or keeps them in place (software).
pub trait FrameFactory: Send + Sync {
    fn create_frame(&self, tag: StreamTag, desc: &PixelFormatDesc) -> MutableFrame;
}

pub trait ImageMixer: FrameFactory {
    fn push(&self, transform: &FrameTransform);
    fn visit(&self, frame: &ConstFrame);
    fn pop(&self);

    /// Composite everything visited since the last call into one
    /// `width * height * 4` BGRA buffer in display order.
    fn render(&self, format: &VideoFormatDesc) -> Reply<Vec<u8>>;
}

/// Adapts the shared `&self` mixer to the `&mut self` visitor that
/// `DrawFrame::accept` expects.
pub struct ImageMixerVisitor<'a> {
    mixer: &'a dyn ImageMixer,
}

impl<'a> ImageMixerVisitor<'a> {
    pub fn new(mixer: &'a dyn ImageMixer) -> Self {
        Self { mixer }
    }
}

impl FrameVisitor for ImageMixerVisitor<'_> {
    fn push(&mut self, transform: &FrameTransform) {
        self.mixer.push(transform);
    }

    fn visit(&mut self, frame: &ConstFrame) {
        self.mixer.visit(frame);
    }

    fn pop(&mut self) {
        self.mixer.pop();
    }
}
