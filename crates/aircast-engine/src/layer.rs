// crates/aircast-engine/src/layer.rs
//
// One stage slot: a foreground producer, an optional background, and the
// handoff rules between them.
//
// The layer is where producer failures stop: any error from the
// foreground's `receive` logs, clears the layer, and yields a blank frame.
// The channel never sees it.

use aircast_core::monitor;
use aircast_core::{DrawFrame, VideoField};

use crate::producer::{BoxedProducer, FramedProducer, FrameProducer};

#[derive(Default)]
pub struct Layer {
    foreground: Option<BoxedProducer>,
    background: Option<BoxedProducer>,
    auto_play:  bool,
    paused:     bool,
    state:      monitor::State,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Stage a producer in the background. With `auto_play` on an empty
    /// layer it plays immediately; with `preview` it becomes the paused
    /// foreground so its first frame shows.
    pub fn load(&mut self, producer: BoxedProducer, preview: bool, auto_play: bool) {
        self.background = Some(producer);
        self.auto_play = auto_play;

        if self.auto_play && self.foreground.is_none() {
            self.play();
        } else if preview {
            self.foreground = self.background.take();
            self.paused = true;
        }
    }

    /// Promote the background to foreground. The incoming producer gets the
    /// outgoing one as its leading producer — live if we were playing, a
    /// stilled copy of its last picture if we were paused.
    pub fn play(&mut self) {
        if let Some(mut background) = self.background.take() {
            let leading: Option<BoxedProducer> = if !self.paused {
                self.foreground.take()
            } else {
                self.foreground.as_mut().map(|fg| {
                    Box::new(FramedProducer::new(DrawFrame::still(
                        fg.last_frame(VideoField::Progressive),
                    ))) as BoxedProducer
                })
            };
            if let Some(leading) = leading {
                background.leading_producer(leading);
            }

            self.foreground = Some(background);
            self.auto_play = false;
        }

        self.paused = false;
    }

    pub fn stop(&mut self) {
        self.foreground = None;
        self.auto_play = false;
    }

    pub fn receive(&mut self, field: VideoField, nb_samples: usize) -> DrawFrame {
        match self.try_receive(field, nb_samples) {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("[layer] producer failed, clearing: {e:#}");
                self.stop();
                DrawFrame::default()
            }
        }
    }

    fn try_receive(&mut self, field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame> {
        // A finished producer (transition done, clip over) hands its
        // replacement over exactly once.
        if let Some(fg) = self.foreground.as_mut() {
            if let Some(next) = fg.following_producer() {
                self.foreground = Some(next);
            }
        }

        let mut frames_left: i64 = 0;
        if self.auto_play {
            if let Some(delta) = self.background.as_ref().and_then(|bg| bg.auto_play_delta()) {
                let time = self.foreground.as_ref().map_or(0, |fg| fg.frame_number()) as i64;
                let duration = self.foreground.as_ref().map_or(0, |fg| fg.nb_frames()) as i64;
                frames_left = duration - time - delta;
                if frames_left < 1 {
                    self.play();
                }
            }
        }

        let mut frame = match (&mut self.foreground, self.paused) {
            (Some(fg), false) => fg.receive(field, nb_samples)?,
            _ => DrawFrame::default(),
        };
        if frame.is_blank() {
            // Not ready (or paused): hold the last picture, muted.
            if let Some(fg) = self.foreground.as_mut() {
                frame = DrawFrame::still(fg.last_frame(field));
            }
        }

        let mut state = monitor::State::new();
        if let Some(fg) = &self.foreground {
            state.insert_state("foreground", fg.state());
            state.insert("foreground/producer", fg.name());
        } else {
            state.insert("foreground/producer", "empty");
        }
        state.insert("foreground/paused", self.paused);
        if frames_left > 0 {
            state.insert("foreground/frames_left", frames_left);
        }
        match &self.background {
            Some(bg) => {
                state.insert_state("background", bg.state());
                state.insert("background/producer", bg.name());
            }
            None => state.insert("background/producer", "empty"),
        }
        self.state = state;

        Ok(frame)
    }

    /// First frame of the background, for preview routes. A background that
    /// cannot preview yet just yields blank.
    pub fn receive_background(&mut self, field: VideoField, _nb_samples: usize) -> DrawFrame {
        match self.background.as_mut() {
            Some(bg) => bg.first_frame(field),
            None => DrawFrame::default(),
        }
    }

    pub fn call(&mut self, params: &[String]) -> anyhow::Result<String> {
        match self.foreground.as_mut() {
            Some(fg) => fg.call(params),
            None => anyhow::bail!("no foreground producer"),
        }
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn foreground_name(&self) -> Option<String> {
        self.foreground.as_ref().map(|p| p.name())
    }

    pub fn state(&self) -> monitor::State {
        self.state.clone()
    }
}
