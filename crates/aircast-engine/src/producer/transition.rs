// crates/aircast-engine/src/producer/transition.rs
//
// Simple transitions: cut, mix, push, slide, wipe.
//
// A transition is a producer that wraps its destination and, via
// `leading_producer`, the source it replaces. The layer treats it as any
// other foreground; once the transition completes, `following_producer`
// hands the destination back and the wrapper disappears. The layer never
// learns a transition happened.

use aircast_core::monitor;
use aircast_core::{DrawFrame, Ease, VideoField};

use crate::producer::{BoxedProducer, FrameProducer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransitionType {
    /// Holds the source until the duration elapses, then hands off — the
    /// frame counter exists only to drive `following_producer`. The sting
    /// producer's "empty" mode is the immediate cut.
    #[default]
    Cut,
    Mix,
    Push,
    Slide,
    Wipe,
}

impl TransitionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionType::Cut   => "cut",
            TransitionType::Mix   => "mix",
            TransitionType::Push  => "push",
            TransitionType::Slide => "slide",
            TransitionType::Wipe  => "wipe",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransitionDirection {
    #[default]
    FromLeft,
    FromRight,
}

#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct TransitionInfo {
    pub duration:  u32,
    pub direction: TransitionDirection,
    pub kind:      TransitionType,
    pub ease:      Ease,
}

pub struct TransitionProducer {
    info:          TransitionInfo,
    current_frame: u32,
    has_dst_frame: bool,
    state:         monitor::State,
    dst:           Option<BoxedProducer>,
    src:           Option<BoxedProducer>,
}

impl TransitionProducer {
    pub fn new(destination: BoxedProducer, info: TransitionInfo) -> Self {
        Self {
            info,
            current_frame: 0,
            has_dst_frame: false,
            state: monitor::State::new(),
            dst: Some(destination),
            src: None,
        }
    }

    fn update_state(&mut self) {
        let mut state = self.dst.as_ref().map_or_else(monitor::State::new, |d| d.state());
        state.insert("transition/type", self.info.kind.as_str());
        state.insert_list(
            "transition/frame",
            vec![self.current_frame as i32, self.info.duration as i32],
        );
        self.state = state;
    }

    /// Compose one in-flight frame. `delta` is the eased phase for THIS
    /// tick, i.e. 0 on the first composed frame.
    fn compose(&self, mut dst_frame: DrawFrame, mut src_frame: DrawFrame) -> DrawFrame {
        if self.info.kind == TransitionType::Cut {
            return src_frame;
        }

        let delta = self.info.ease.apply(self.current_frame as f64 / self.info.duration as f64);
        let dir = match self.info.direction {
            TransitionDirection::FromLeft  => 1.0,
            TransitionDirection::FromRight => -1.0,
        };

        src_frame.transform.audio.volume = 1.0 - delta;
        dst_frame.transform.audio.volume = delta;

        match self.info.kind {
            TransitionType::Mix => {
                dst_frame.transform.image.opacity = delta;
                dst_frame.transform.image.is_mix = true;
                src_frame.transform.image.opacity = 1.0 - delta;
                src_frame.transform.image.is_mix = true;
            }
            TransitionType::Slide => {
                dst_frame.transform.image.fill_translation[0] = (-1.0 + delta) * dir;
            }
            TransitionType::Push => {
                dst_frame.transform.image.fill_translation[0] = (-1.0 + delta) * dir;
                src_frame.transform.image.fill_translation[0] = delta * dir;
            }
            TransitionType::Wipe => {
                dst_frame.transform.image.clip_scale[0] = delta;
            }
            TransitionType::Cut => unreachable!(),
        }

        DrawFrame::over(src_frame, dst_frame)
    }
}

impl FrameProducer for TransitionProducer {
    fn receive(&mut self, field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame> {
        let Some(dst_producer) = self.dst.as_mut() else {
            return Ok(DrawFrame::default());
        };

        let mut dst = dst_producer.receive(field, nb_samples)?;
        if dst.is_blank() {
            dst = dst_producer.last_frame(field);
        }

        let mut src = DrawFrame::default();
        if let Some(src_producer) = self.src.as_mut() {
            src = src_producer.receive(field, nb_samples)?;
            if src.is_blank() {
                src = src_producer.last_frame(field);
            }
        }

        // Destination not ready yet: hold the outgoing picture.
        if dst.is_blank() {
            self.update_state();
            return Ok(src);
        }
        self.has_dst_frame = true;

        if self.current_frame >= self.info.duration {
            self.update_state();
            return Ok(dst);
        }

        let result = self.compose(dst, src);
        self.current_frame += 1;
        self.update_state();
        Ok(result)
    }

    fn last_frame(&mut self, field: VideoField) -> DrawFrame {
        match (&mut self.src, &mut self.dst) {
            (_, Some(dst)) if self.current_frame >= self.info.duration => dst.last_frame(field),
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
            None => anyhow::bail!("transition already handed off"),
        }
    }

    fn leading_producer(&mut self, leading: BoxedProducer) {
        self.src = Some(leading);
    }

    fn following_producer(&mut self) -> Option<BoxedProducer> {
        if self.has_dst_frame && self.current_frame >= self.info.duration {
            self.dst.take()
        } else {
            None
        }
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
        format!("transition[{src}=>{dst}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::test_support::TestProducer;
    use aircast_core::monitor::Value;

    fn mix_over_5() -> TransitionProducer {
        let dst = Box::new(TestProducer::solid("green", [0, 255, 0, 255], u32::MAX));
        let src = Box::new(TestProducer::solid("red", [0, 0, 255, 255], u32::MAX));
        let mut t = TransitionProducer::new(
            dst,
            TransitionInfo {
                duration: 5,
                direction: TransitionDirection::FromLeft,
                kind: TransitionType::Mix,
                ease: Ease::Linear,
            },
        );
        t.leading_producer(src);
        t
    }

    fn opacities(frame: &DrawFrame) -> (f64, f64) {
        let children = frame.children().expect("composed frame");
        (children[0].transform.image.opacity, children[1].transform.image.opacity)
    }

    #[test]
    fn mix_opacity_follows_tick_over_duration() {
        let mut t = mix_over_5();
        for k in 0..5u32 {
            let frame = t.receive(VideoField::Progressive, 0).unwrap();
            let (src_opacity, dst_opacity) = opacities(&frame);
            let expected = k as f64 / 5.0;
            assert!((dst_opacity - expected).abs() < 1e-9, "tick {k}");
            assert!((src_opacity - (1.0 - expected)).abs() < 1e-9, "tick {k}");
            let children = frame.children().unwrap();
            assert!(children[0].transform.image.is_mix);
            assert!(children[1].transform.image.is_mix);
        }
    }

    #[test]
    fn audio_crossfades_with_video() {
        let mut t = mix_over_5();
        t.receive(VideoField::Progressive, 0).unwrap();
        let frame = t.receive(VideoField::Progressive, 0).unwrap();
        let children = frame.children().unwrap();
        assert!((children[0].transform.audio.volume - 0.8).abs() < 1e-9);
        assert!((children[1].transform.audio.volume - 0.2).abs() < 1e-9);
    }

    #[test]
    fn following_fires_exactly_at_duration() {
        let mut t = mix_over_5();
        for _ in 0..5 {
            assert!(t.following_producer().is_none());
            t.receive(VideoField::Progressive, 0).unwrap();
        }
        // Counter has reached 5; this tick returns pure destination and the
        // handoff is available.
        let frame = t.receive(VideoField::Progressive, 0).unwrap();
        assert!(frame.children().is_none(), "no longer composed");
        let dst = t.following_producer().expect("handoff");
        assert_eq!(dst.name(), "green");
        assert!(t.following_producer().is_none(), "handoff happens once");
    }

    #[test]
    fn push_translates_both_sides() {
        let dst = Box::new(TestProducer::solid("b", [1, 1, 1, 255], u32::MAX));
        let src = Box::new(TestProducer::solid("a", [2, 2, 2, 255], u32::MAX));
        let mut t = TransitionProducer::new(
            dst,
            TransitionInfo {
                duration: 4,
                direction: TransitionDirection::FromLeft,
                kind: TransitionType::Push,
                ease: Ease::Linear,
            },
        );
        t.leading_producer(src);

        t.receive(VideoField::Progressive, 0).unwrap();
        let frame = t.receive(VideoField::Progressive, 0).unwrap(); // delta = 0.25
        let children = frame.children().unwrap();
        assert!((children[1].transform.image.fill_translation[0] - (-0.75)).abs() < 1e-9);
        assert!((children[0].transform.image.fill_translation[0] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn wipe_grows_destination_clip() {
        let dst = Box::new(TestProducer::solid("b", [1, 1, 1, 255], u32::MAX));
        let src = Box::new(TestProducer::solid("a", [2, 2, 2, 255], u32::MAX));
        let mut t = TransitionProducer::new(
            dst,
            TransitionInfo { duration: 2, kind: TransitionType::Wipe, ..Default::default() },
        );
        t.leading_producer(src);

        t.receive(VideoField::Progressive, 0).unwrap();
        let frame = t.receive(VideoField::Progressive, 0).unwrap(); // delta = 0.5
        let children = frame.children().unwrap();
        assert!((children[1].transform.image.clip_scale[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cut_holds_source_until_handoff() {
        let dst = Box::new(TestProducer::solid("green", [0, 255, 0, 255], u32::MAX));
        let src = Box::new(TestProducer::solid("red", [0, 0, 255, 255], u32::MAX));
        let mut t = TransitionProducer::new(
            dst,
            TransitionInfo { duration: 3, kind: TransitionType::Cut, ..Default::default() },
        );
        t.leading_producer(src);

        for _ in 0..3 {
            let frame = t.receive(VideoField::Progressive, 0).unwrap();
            // Cut returns the bare source frame, not a composition.
            assert!(frame.children().is_none());
        }
        t.receive(VideoField::Progressive, 0).unwrap();
        assert!(t.following_producer().is_some());
    }

    #[test]
    fn state_reports_type_and_progress() {
        let mut t = mix_over_5();
        t.receive(VideoField::Progressive, 0).unwrap();
        let state = t.state();
        assert_eq!(state.get("transition/type"), Some(&[Value::Str("mix".into())][..]));
        assert_eq!(
            state.get("transition/frame"),
            Some(&[Value::I32(1), Value::I32(5)][..])
        );
    }
}
