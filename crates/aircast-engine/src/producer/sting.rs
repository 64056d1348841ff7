// crates/aircast-engine/src/producer/sting.rs
//
// Sting transition: a key (luminance mask) clip decides when the source
// gives way to the destination, with an optional overlay drawn on top and
// an optional audio crossfade window.
//
// `mask_filename == "empty"` selects cut mode: no mask at all, the source
// plays until `trigger_point`, then the destination, with the overlay
// rendered throughout. This is the engine's real hard cut.
//
// All four inputs buffer per field so interlaced polling cannot pair a
// field-A source with a field-B mask.

use aircast_core::monitor;
use aircast_core::{DrawFrame, Ease, VideoField};

use crate::producer::registry::ProducerDependencies;
use crate::producer::{BoxedProducer, FramePair, FrameProducer};

/// Sting-mode duration when the mask is infinite and no audio fade bounds
/// the transition.
pub const STING_FALLBACK_DURATION: u32 = 600;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct StingInfo {
    pub mask_filename:    String,
    pub overlay_filename: Option<String>,
    pub trigger_point:    u32,
    pub audio_fade_start: u32,
    pub audio_fade_duration: Option<u32>,
}

pub struct StingProducer {
    info:        StingInfo,
    is_cut_mode: bool,
    current_frame: u32,
    state:       monitor::State,

    dst_frames:     FramePair,
    src_frames:     FramePair,
    mask_frames:    FramePair,
    overlay_frames: FramePair,

    dst:     Option<BoxedProducer>,
    src:     Option<BoxedProducer>,
    mask:    Option<BoxedProducer>,
    overlay: Option<BoxedProducer>,
}

impl StingProducer {
    pub fn new(
        destination: BoxedProducer,
        info: StingInfo,
        mask: Option<BoxedProducer>,
        overlay: Option<BoxedProducer>,
    ) -> Self {
        let is_cut_mode = info.mask_filename.eq_ignore_ascii_case("empty");
        Self {
            info,
            is_cut_mode,
            current_frame: 0,
            state: monitor::State::new(),
            dst_frames: FramePair::default(),
            src_frames: FramePair::default(),
            mask_frames: FramePair::default(),
            overlay_frames: FramePair::default(),
            dst: Some(destination),
            src: None,
            mask,
            overlay,
        }
    }

    /// Overlay length with infinite clips clamped to zero: an endless
    /// overlay must not pin the transition open forever.
    fn overlay_duration(&self) -> u32 {
        match &self.overlay {
            Some(overlay) => {
                let n = overlay.nb_frames();
                if n == u32::MAX { 0 } else { n }
            }
            None => 0,
        }
    }

    fn cut_duration(&self) -> u32 {
        self.info.trigger_point.max(self.overlay_duration())
    }

    pub fn target_duration(&self) -> Option<u32> {
        if self.is_cut_mode {
            return Some(self.cut_duration());
        }

        let mask_frames = self.mask.as_ref()?.nb_frames();

        if mask_frames == u32::MAX {
            return Some(match self.info.audio_fade_duration {
                Some(fade) => self.info.audio_fade_start + fade,
                None => STING_FALLBACK_DURATION,
            });
        }

        Some(match self.info.audio_fade_duration {
            Some(fade) => mask_frames.max(self.info.audio_fade_start + fade),
            None => mask_frames,
        })
    }

    /// Audio crossfade phase for the current tick.
    ///
    /// With a fade window: flat 0 before `audio_fade_start`, linear to 1
    /// across `min(total - start, fade_duration)` frames, flat 1 after.
    /// Without one: linear across the whole transition.
    fn get_audio_delta(&self) -> f64 {
        let Some(total) = self.target_duration() else { return 0.0 };

        if let Some(fade) = self.info.audio_fade_duration {
            if self.current_frame < self.info.audio_fade_start {
                return 0.0;
            }
            let frame = self.current_frame - self.info.audio_fade_start;
            let duration = total.saturating_sub(self.info.audio_fade_start).min(fade);
            if frame > duration {
                return 1.0;
            }
            return Ease::Linear.tween(frame as f64, 0.0, 1.0, duration as f64);
        }

        Ease::Linear.tween(self.current_frame as f64, 0.0, 1.0, total as f64)
    }

    fn fetch(
        producer: &mut Option<BoxedProducer>,
        buffer: &mut FramePair,
        field: VideoField,
        nb_samples: usize,
        fallback_to_last: bool,
    ) -> anyhow::Result<DrawFrame> {
        let mut frame = buffer.get(field);
        if frame.is_blank() {
            if let Some(p) = producer.as_mut() {
                frame = p.receive(field, nb_samples)?;
                buffer.set(field, frame.clone());
                if frame.is_blank() && fallback_to_last {
                    frame = p.last_frame(field);
                }
            }
        }
        Ok(frame)
    }

    fn receive_cut(&mut self, field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame> {
        let mut src = Self::fetch(&mut self.src, &mut self.src_frames, field, nb_samples, true)?;

        let mut dst = DrawFrame::default();
        if self.current_frame >= self.info.trigger_point {
            dst = Self::fetch(&mut self.dst, &mut self.dst_frames, field, nb_samples, true)?;
        }

        let audio_delta = self.get_audio_delta();
        src.transform.audio.volume = 1.0 - audio_delta;
        dst.transform.audio.volume = audio_delta;

        let result = if self.current_frame < self.info.trigger_point { src } else { dst };

        let overlay = Self::fetch(&mut self.overlay, &mut self.overlay_frames, field, nb_samples, true)?;

        self.src_frames.clear(field);
        self.dst_frames.clear(field);
        self.overlay_frames.clear(field);
        self.current_frame += 1;

        if !overlay.is_blank() && !result.is_blank() {
            return Ok(DrawFrame::over(result, overlay));
        }
        Ok(result)
    }

    fn receive_sting(&mut self, field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame> {
        let src = Self::fetch(&mut self.src, &mut self.src_frames, field, nb_samples, true)?;

        let started_dst = self.current_frame >= self.info.trigger_point;
        let mut dst = self.dst_frames.get(field);
        if dst.is_blank() && started_dst {
            dst = Self::fetch(&mut self.dst, &mut self.dst_frames, field, nb_samples, true)?;
            if dst.is_blank() {
                // Destination still warming up: hold the source, try again
                // next tick without advancing.
                self.src_frames.clear(field);
                return Ok(src);
            }
        }

        let mut mask = Self::fetch(&mut self.mask, &mut self.mask_frames, field, nb_samples, false)?;

        let expecting_overlay = self.overlay.is_some();
        let mut overlay =
            Self::fetch(&mut self.overlay, &mut self.overlay_frames, field, nb_samples, false)?;

        let mask_and_overlay_valid = !mask.is_blank() && (!expecting_overlay || !overlay.is_blank());

        if self.current_frame == 0 && !mask_and_overlay_valid {
            self.src_frames.clear(field);
            return Ok(src);
        }

        if !mask_and_overlay_valid {
            mask = self.mask.as_mut().map_or_else(DrawFrame::default, |p| p.last_frame(field));
            overlay = self.overlay.as_mut().map_or_else(DrawFrame::default, |p| p.last_frame(field));
        }

        let result = self.compose(dst, src, mask, overlay);

        self.dst_frames.clear(field);
        self.src_frames.clear(field);

        if mask_and_overlay_valid {
            self.mask_frames.clear(field);
            self.overlay_frames.clear(field);
            self.current_frame += 1;
        }

        Ok(result)
    }

    /// Four-layer stack, list order: inverted mask keys the outgoing
    /// source, the mask keys the incoming destination, overlay on top.
    fn compose(
        &self,
        mut dst: DrawFrame,
        mut src: DrawFrame,
        mask: DrawFrame,
        overlay: DrawFrame,
    ) -> DrawFrame {
        let delta = self.get_audio_delta();
        src.transform.audio.volume = 1.0 - delta;
        dst.transform.audio.volume = delta;

        let mut mask_key = mask.clone();
        mask_key.transform.image.is_key = true;
        let mut mask_key_inverted = mask;
        mask_key_inverted.transform.image.is_key = true;
        mask_key_inverted.transform.image.invert = true;

        let mut frames = vec![mask_key_inverted, src, mask_key, dst];
        if !overlay.is_blank() {
            frames.push(overlay);
        }
        DrawFrame::from_list(frames)
    }

    fn update_state(&mut self, duration: Option<u32>) {
        let mut state = self.dst.as_ref().map_or_else(monitor::State::new, |d| d.state());
        state.insert("transition/type", if self.is_cut_mode { "cut" } else { "sting" });
        if let Some(total) = duration {
            state.insert_list(
                "transition/frame",
                vec![self.current_frame as i32, total as i32],
            );
        }
        self.state = state;
    }
}

impl FrameProducer for StingProducer {
    fn receive(&mut self, field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame> {
        let duration = self.target_duration();

        let result = if duration.is_some_and(|d| self.current_frame >= d) {
            match self.dst.as_mut() {
                Some(dst) => dst.receive(field, nb_samples),
                None => Ok(DrawFrame::default()),
            }
        } else if self.is_cut_mode {
            self.receive_cut(field, nb_samples)
        } else {
            self.receive_sting(field, nb_samples)
        };

        self.update_state(duration);
        result
    }

    fn last_frame(&mut self, field: VideoField) -> DrawFrame {
        let done = self.target_duration().is_some_and(|d| self.current_frame >= d);
        match (&mut self.src, &mut self.dst) {
            (_, Some(dst)) if done => dst.last_frame(field),
            (Some(src), _) => src.last_frame(field),
            (None, Some(dst)) => dst.last_frame(field),
            (None, None) => DrawFrame::default(),
        }
    }

    fn first_frame(&mut self, field: VideoField) -> DrawFrame {
        self.dst.as_mut().map_or_else(DrawFrame::default, |d| d.first_frame(field))
    }

    fn nb_frames(&self) -> u32 {
        self.dst.as_ref().map_or(0, |d| d.nb_frames())
    }

    fn frame_number(&self) -> u32 {
        self.dst.as_ref().map_or(0, |d| d.frame_number())
    }

    fn call(&mut self, params: &[String]) -> anyhow::Result<String> {
        match self.dst.as_mut() {
            Some(dst) => dst.call(params),
            None => anyhow::bail!("sting already handed off"),
        }
    }

    fn leading_producer(&mut self, leading: BoxedProducer) {
        self.src = Some(leading);
    }

    fn following_producer(&mut self) -> Option<BoxedProducer> {
        self.dst.as_ref()?;

        if self.is_cut_mode {
            if self.current_frame >= self.cut_duration() {
                return self.dst.take();
            }
            return None;
        }

        if let Some(fade) = self.info.audio_fade_duration {
            if self.current_frame >= self.info.audio_fade_start + fade {
                return self.dst.take();
            }
        }

        if self.target_duration().is_some_and(|d| self.current_frame >= d) {
            return self.dst.take();
        }
        None
    }

    /// In cut mode the outgoing layer's auto-play must fire at the hard
    /// cut; in sting mode at the mask's end.
    fn auto_play_delta(&self) -> Option<i64> {
        if self.is_cut_mode {
            return Some(self.cut_duration() as i64);
        }
        self.mask.as_ref().map(|m| m.nb_frames() as i64)
    }

    fn is_ready(&mut self) -> bool {
        self.dst.as_mut().is_some_and(|d| d.is_ready())
    }

    fn state(&self) -> monitor::State {
        self.state.clone()
    }

    fn name(&self) -> String {
        "transition".into()
    }

    fn print(&self) -> String {
        let src = self.src.as_ref().map_or_else(|| "empty".into(), |p| p.print());
        let dst = self.dst.as_ref().map_or_else(|| "empty".into(), |p| p.print());
        format!("sting[{src}=>{dst}]")
    }
}

/// Build a sting from filenames: the mask and overlay are created through
/// the producer registry like any other source.
pub fn create_sting_producer(
    dependencies: &ProducerDependencies,
    destination: BoxedProducer,
    info: StingInfo,
) -> anyhow::Result<BoxedProducer> {
    let is_cut_mode = info.mask_filename.eq_ignore_ascii_case("empty");

    let mask = if is_cut_mode {
        None
    } else {
        let params = vec![info.mask_filename.clone()];
        Some(
            dependencies
                .registry
                .create_producer(dependencies, &params)?
                .ok_or_else(|| {
                    aircast_core::PlayoutError::InvalidArgument(format!(
                        "no producer for sting mask {:?}",
                        info.mask_filename
                    ))
                })?,
        )
    };

    let overlay = match &info.overlay_filename {
        Some(filename) => {
            let params = vec![filename.clone()];
            Some(
                dependencies
                    .registry
                    .create_producer(dependencies, &params)?
                    .ok_or_else(|| {
                        aircast_core::PlayoutError::InvalidArgument(format!(
                            "no producer for sting overlay {filename:?}"
                        ))
                    })?,
            )
        }
        None => None,
    };

    Ok(Box::new(StingProducer::new(destination, info, mask, overlay)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::test_support::TestProducer;

    fn cut_sting(trigger: u32, overlay_frames: Option<u32>) -> StingProducer {
        let dst = Box::new(TestProducer::solid("green", [0, 255, 0, 255], u32::MAX));
        let src = Box::new(TestProducer::solid("red", [0, 0, 255, 255], u32::MAX));
        let overlay = overlay_frames
            .map(|n| Box::new(TestProducer::solid("blue", [255, 0, 0, 255], n)) as BoxedProducer);

        let mut sting = StingProducer::new(
            dst,
            StingInfo {
                mask_filename: "empty".into(),
                trigger_point: trigger,
                ..Default::default()
            },
            None,
            overlay,
        );
        sting.leading_producer(src);
        sting
    }

    fn leaf_name(frame: &DrawFrame) -> Option<[u8; 4]> {
        frame.leaf()?.image_data(0).map(|d| [d[0], d[1], d[2], d[3]])
    }

    const RED: [u8; 4] = [0, 0, 255, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [255, 0, 0, 255];

    #[test]
    fn cut_mode_switches_at_trigger_and_hands_off() {
        let mut sting = cut_sting(10, None);

        for tick in 0..10 {
            assert!(sting.following_producer().is_none(), "tick {tick}");
            let frame = sting.receive(VideoField::Progressive, 0).unwrap();
            assert_eq!(leaf_name(&frame), Some(RED), "tick {tick}");
        }

        // Counter reached 10: handoff is available exactly now.
        let dst = sting.following_producer().expect("handoff at trigger");
        assert_eq!(dst.name(), "green");
    }

    #[test]
    fn cut_mode_with_overlay_stacks_it_and_waits_for_it() {
        let mut sting = cut_sting(3, Some(7));

        for tick in 0..7u32 {
            assert!(sting.following_producer().is_none(), "tick {tick}");
            let frame = sting.receive(VideoField::Progressive, 0).unwrap();
            let children = frame.children().expect("composite with overlay");
            let below = leaf_name(&children[0]).unwrap();
            let above = leaf_name(&children[1]).unwrap();
            assert_eq!(below, if tick < 3 { RED } else { GREEN }, "tick {tick}");
            assert_eq!(above, BLUE, "tick {tick}");
        }

        // Overlay ran out at 7 > trigger 3; destination takes over now.
        assert!(sting.following_producer().is_some());
    }

    #[test]
    fn cut_duration_clamps_infinite_overlay() {
        let sting = cut_sting(5, Some(u32::MAX));
        assert_eq!(sting.target_duration(), Some(5));
        assert_eq!(sting.auto_play_delta(), Some(5));
    }

    fn mask_sting(mask_frames: u32, fade: Option<(u32, u32)>) -> StingProducer {
        let dst = Box::new(TestProducer::solid("green", [0, 255, 0, 255], u32::MAX));
        let src = Box::new(TestProducer::solid("red", [0, 0, 255, 255], u32::MAX));
        let mask = Box::new(TestProducer::solid("mask", [255, 255, 255, 255], mask_frames));

        let mut sting = StingProducer::new(
            dst,
            StingInfo {
                mask_filename: "mask.mov".into(),
                audio_fade_start: fade.map_or(0, |f| f.0),
                audio_fade_duration: fade.map(|f| f.1),
                ..Default::default()
            },
            Some(mask),
            None,
        );
        sting.leading_producer(src);
        sting
    }

    #[test]
    fn sting_mode_composes_keyed_stack() {
        let mut sting = mask_sting(50, None);
        let frame = sting.receive(VideoField::Progressive, 0).unwrap();
        let children = frame.children().expect("keyed stack");
        assert_eq!(children.len(), 4);

        // Inverted mask keys the source, plain mask keys the destination.
        assert!(children[0].transform.image.is_key);
        assert!(children[0].transform.image.invert);
        assert_eq!(leaf_name(&children[1]), Some(RED));
        assert!(children[2].transform.image.is_key);
        assert!(!children[2].transform.image.invert);
        assert_eq!(leaf_name(&children[3]), Some(GREEN));
    }

    #[test]
    fn sting_duration_follows_mask_unless_fade_extends_it() {
        assert_eq!(mask_sting(40, None).target_duration(), Some(40));
        assert_eq!(mask_sting(40, Some((30, 25))).target_duration(), Some(55));
        assert_eq!(mask_sting(40, Some((10, 10))).target_duration(), Some(40));
    }

    #[test]
    fn infinite_mask_falls_back() {
        assert_eq!(
            mask_sting(u32::MAX, None).target_duration(),
            Some(STING_FALLBACK_DURATION)
        );
        assert_eq!(mask_sting(u32::MAX, Some((20, 30))).target_duration(), Some(50));
    }

    #[test]
    fn audio_delta_respects_fade_window() {
        let mut sting = mask_sting(100, Some((10, 20)));
        // Before the window.
        assert_eq!(sting.get_audio_delta(), 0.0);
        // Advance into the window.
        for _ in 0..20 {
            sting.receive(VideoField::Progressive, 0).unwrap();
        }
        let delta = sting.get_audio_delta();
        assert!((delta - 0.5).abs() < 1e-9, "{delta}");
    }

    #[test]
    fn sting_audio_crossfade_is_linear_without_window() {
        let mut sting = mask_sting(10, None);
        for _ in 0..5 {
            sting.receive(VideoField::Progressive, 0).unwrap();
        }
        let frame = sting.receive(VideoField::Progressive, 0).unwrap();
        let children = frame.children().unwrap();
        // current_frame = 5 of 10 when composing this tick.
        assert!((children[1].transform.audio.volume - 0.5).abs() < 1e-9);
        assert!((children[3].transform.audio.volume - 0.5).abs() < 1e-9);
    }
}
