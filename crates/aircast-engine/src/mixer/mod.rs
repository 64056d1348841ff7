// crates/aircast-engine/src/mixer/mod.rs
//
// The mixer: one const frame out per tick, pipelined one tick deep.
//
// Each layer's tree is walked twice (once into the audio mixer, once
// into the image mixer) and both results are queued as a pending frame.
// The queue only yields once it holds two entries, so the image backend
// always has a full tick to complete a render before anyone waits on it.
// The price is a single empty frame at channel start.

pub mod audio;
pub mod image;
pub mod software;

use std::collections::VecDeque;
use std::sync::Arc;

use aircast_core::monitor;
use aircast_core::{ConstFrame, DrawFrame, PixelFormatDesc, VideoFormatDesc};

use crate::mixer::audio::{AudioMixer, MasterVolume};
use crate::mixer::image::{ImageMixer, ImageMixerVisitor};
use crate::sync::Reply;

struct PendingFrame {
    image:  Reply<Vec<u8>>,
    audio:  Vec<i32>,
    width:  usize,
    height: usize,
}

pub struct Mixer {
    audio_mixer: AudioMixer,
    image_mixer: Arc<dyn ImageMixer>,
    buffer:      VecDeque<PendingFrame>,
    state:       monitor::State,
}

impl Mixer {
    pub fn new(image_mixer: Arc<dyn ImageMixer>) -> Self {
        Self {
            audio_mixer: AudioMixer::new(),
            image_mixer,
            buffer: VecDeque::new(),
            state: monitor::State::new(),
        }
    }

    /// Composite one tick. `frames` are the stage's layer frames in
    /// ascending layer order.
    pub fn mix(
        &mut self,
        frames: Vec<DrawFrame>,
        format: &VideoFormatDesc,
        nb_samples: usize,
    ) -> ConstFrame {
        for mut frame in frames {
            frame.accept(&mut self.audio_mixer);
            frame.transform.image.layer_depth = 1;
            let mut visitor = ImageMixerVisitor::new(self.image_mixer.as_ref());
            frame.accept(&mut visitor);
        }

        let image = self.image_mixer.render(format);
        let audio = self.audio_mixer.mix(format, nb_samples);

        let mut state = monitor::State::new();
        state.insert_state("audio", self.audio_mixer.state());
        self.state = state;

        self.buffer.push_back(PendingFrame {
            image,
            audio,
            width: format.width,
            height: format.height,
        });

        // Pipeline priming: nothing comes out until two ticks are queued.
        if self.buffer.len() < 2 {
            return ConstFrame::default();
        }

        let pending = self.buffer.pop_front().expect("len checked above");
        let Some(image_data) = pending.image.wait() else {
            log::error!("[mixer] image backend dropped a render, emitting empty frame");
            return ConstFrame::default();
        };

        ConstFrame::new(
            vec![image_data],
            pending.audio,
            PixelFormatDesc::bgra(pending.width, pending.height),
        )
    }

    pub fn master_volume(&self) -> MasterVolume {
        self.audio_mixer.master_volume()
    }

    pub fn state(&self) -> monitor::State {
        self.state.clone()
    }

    pub fn audio_buffer_overflow_count(&self) -> u64 {
        self.audio_mixer.buffer_overflow_count()
    }

    pub fn audio_clipping_count(&self) -> u64 {
        self.audio_mixer.clipping_count()
    }
}
