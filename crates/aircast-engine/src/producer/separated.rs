// crates/aircast-engine/src/producer/separated.rs
//
// Fill + key pairing.
//
// Two parallel producers (RGB fill, luma key) combine into one keyed
// frame. Per-field buffers hold whichever side arrives first, so the pair
// stays frame-accurate no matter how fields are polled; a tick where only
// one side delivered yields blank and keeps the buffered half.

use aircast_core::monitor;
use aircast_core::{DrawFrame, VideoField};

use crate::producer::{BoxedProducer, FramePair, FrameProducer};

pub struct SeparatedProducer {
    fill: BoxedProducer,
    key:  BoxedProducer,
    fill_frames: FramePair,
    key_frames:  FramePair,
    state: monitor::State,
}

impl SeparatedProducer {
    pub fn new(fill: BoxedProducer, key: BoxedProducer) -> Self {
        Self {
            fill,
            key,
            fill_frames: FramePair::default(),
            key_frames: FramePair::default(),
            state: monitor::State::new(),
        }
    }

    fn update_state(&mut self) {
        let mut state = self.fill.state();
        state.insert_state("keyer", self.key.state());
        self.state = state;
    }
}

impl FrameProducer for SeparatedProducer {
    fn receive(&mut self, field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame> {
        let mut fill = self.fill_frames.get(field);
        let mut key = self.key_frames.get(field);

        if fill.is_blank() {
            fill = self.fill.receive(field, nb_samples)?;
        }
        if key.is_blank() {
            key = self.key.receive(field, nb_samples)?;
        }

        if fill.is_blank() || key.is_blank() {
            self.fill_frames.set(field, fill);
            self.key_frames.set(field, key);
            self.update_state();
            return Ok(DrawFrame::default());
        }

        self.fill_frames.clear(field);
        self.key_frames.clear(field);
        self.update_state();
        Ok(DrawFrame::mask(fill, key))
    }

    fn last_frame(&mut self, field: VideoField) -> DrawFrame {
        DrawFrame::mask(self.fill.last_frame(field), self.key.last_frame(field))
    }

    fn first_frame(&mut self, field: VideoField) -> DrawFrame {
        DrawFrame::mask(self.fill.first_frame(field), self.key.first_frame(field))
    }

    fn frame_number(&self) -> u32 {
        self.fill.frame_number()
    }

    fn nb_frames(&self) -> u32 {
        self.fill.nb_frames().min(self.key.nb_frames())
    }

    /// Both sides get the command; the fill's answer is the one reported.
    fn call(&mut self, params: &[String]) -> anyhow::Result<String> {
        let _ = self.key.call(params);
        self.fill.call(params)
    }

    fn is_ready(&mut self) -> bool {
        self.fill.is_ready() && self.key.is_ready()
    }

    fn state(&self) -> monitor::State {
        self.state.clone()
    }

    fn name(&self) -> String {
        "separated".into()
    }

    fn print(&self) -> String {
        format!("separated[fill:{}|key:{}]", self.fill.print(), self.key.print())
    }
}
