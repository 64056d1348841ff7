// crates/aircast-engine/src/scenarios.rs
//
// Full-pipeline scenarios: stopped channels driven tick by tick, output
// captured at the consumer and verified down to the pixel. These cover
// the cross-component behavior no single module test can: transition
// producers composited by the software mixer, sting handoffs observed
// through the layer, and swaps between whole channels.

use std::sync::Arc;

use aircast_core::monitor::Value;
use aircast_core::{ConstFrame, FormatRepository, VideoFormatDesc};

use crate::channel::VideoChannel;
use crate::consumer::test_support::RecordingConsumer;
use crate::mixer::software::SoftwareImageMixer;
use crate::producer::test_support::TestProducer;
use crate::producer::{
    StingInfo, StingProducer, TransitionInfo, TransitionProducer, TransitionType,
};

const RED: [u8; 4] = [0, 0, 255, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [255, 0, 0, 255];

fn format_25p() -> VideoFormatDesc {
    // 4x4 raster at 25p: every composite fits in one glance.
    VideoFormatDesc::custom(4, 4, 25000, 1000, "test25p", vec![1920])
}

fn channel_with_capture() -> (VideoChannel, Arc<parking_lot::Mutex<Vec<(aircast_core::VideoField, ConstFrame)>>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let channel = VideoChannel::new_stopped(
        1,
        format_25p(),
        Arc::new(SoftwareImageMixer::new()),
        Box::new(|_| {}),
    );
    let consumer = RecordingConsumer::new(1);
    let frames = consumer.frames.clone();
    channel.add_consumer(Box::new(consumer)).unwrap();
    (channel, frames)
}

fn first_pixel(frame: &ConstFrame) -> [u8; 4] {
    let data = frame.image_data(0).unwrap();
    [data[0], data[1], data[2], data[3]]
}

fn solid(name: &str, bgra: [u8; 4]) -> Box<TestProducer> {
    Box::new(TestProducer::solid(name, bgra, u32::MAX))
}

// ── Mix transition, end to end ────────────────────────────────────────────────

#[test]
fn mix_transition_blends_linearly_then_hands_off() {
    let (channel, captured) = channel_with_capture();

    channel.stage().load(0, solid("red", RED), false, false);
    channel.stage().play(0);

    let transition = TransitionProducer::new(
        solid("green", GREEN),
        TransitionInfo {
            duration: 5,
            kind: TransitionType::Mix,
            ease: aircast_core::Ease::Linear,
            ..Default::default()
        },
    );
    channel.stage().load(0, Box::new(transition), false, false);
    channel.stage().play(0);

    // 9 channel ticks → 8 delivered frames (one priming tick).
    for _ in 0..9 {
        channel.tick();
    }

    let frames = captured.lock();
    assert_eq!(frames.len(), 8);

    // Delivered frame k corresponds to producer tick k: delta = k / 5.
    assert_eq!(first_pixel(&frames[0].1), RED);

    let px = first_pixel(&frames[3].1);
    // src * 0.4 + dst * 0.6, composited gamma-less: R 102, G 153.
    assert_eq!(px[0], 0);
    assert!((px[1] as i32 - 153).abs() <= 1, "G {}", px[1]);
    assert!((px[2] as i32 - 102).abs() <= 1, "R {}", px[2]);
    assert_eq!(px[3], 255);

    for (tick, (_, frame)) in frames.iter().enumerate().skip(5) {
        assert_eq!(first_pixel(frame), GREEN, "tick {tick}");
    }

    // Transition wrapper is gone: the layer reports the bare destination.
    assert_eq!(
        channel.state().get("stage/layer/0/foreground/producer"),
        Some(&[Value::Str("green".into())][..])
    );
}

// ── Sting cut mode with overlay, end to end ───────────────────────────────────

#[test]
fn sting_cut_mode_overlays_then_cuts_then_unwraps() {
    let (channel, captured) = channel_with_capture();

    channel.stage().load(0, solid("red", RED), false, false);
    channel.stage().play(0);

    let sting = StingProducer::new(
        solid("green", GREEN),
        StingInfo {
            mask_filename: "empty".into(),
            trigger_point: 3,
            ..Default::default()
        },
        None,
        Some(Box::new(TestProducer::solid("blue", BLUE, 7))),
    );
    channel.stage().load(0, Box::new(sting), false, false);
    channel.stage().play(0);

    for _ in 0..11 {
        channel.tick();
    }

    let frames = captured.lock();
    assert_eq!(frames.len(), 10);

    for (tick, (_, frame)) in frames.iter().enumerate() {
        let expected = if tick < 7 {
            // Opaque overlay on top, source or destination beneath.
            BLUE
        } else {
            GREEN
        };
        assert_eq!(first_pixel(frame), expected, "tick {tick}");
    }

    assert_eq!(
        channel.state().get("stage/layer/0/foreground/producer"),
        Some(&[Value::Str("green".into())][..])
    );
}

// ── Sting trigger visibility without overlay ──────────────────────────────────

#[test]
fn sting_cut_mode_switches_source_at_trigger() {
    let (channel, captured) = channel_with_capture();

    channel.stage().load(0, solid("red", RED), false, false);
    channel.stage().play(0);

    let sting = StingProducer::new(
        solid("green", GREEN),
        StingInfo { mask_filename: "empty".into(), trigger_point: 4, ..Default::default() },
        None,
        None,
    );
    channel.stage().load(0, Box::new(sting), false, false);
    channel.stage().play(0);

    for _ in 0..9 {
        channel.tick();
    }

    let frames = captured.lock();
    for (tick, (_, frame)) in frames.iter().enumerate() {
        let expected = if tick < 4 { RED } else { GREEN };
        assert_eq!(first_pixel(frame), expected, "tick {tick}");
    }
}

// ── Swap atomicity across channels ────────────────────────────────────────────

#[test]
fn cross_channel_swap_is_atomic_under_tick_load() {
    let a = VideoChannel::new_stopped(
        1,
        format_25p(),
        Arc::new(SoftwareImageMixer::new()),
        Box::new(|_| {}),
    );
    let b = VideoChannel::new_stopped(
        2,
        format_25p(),
        Arc::new(SoftwareImageMixer::new()),
        Box::new(|_| {}),
    );

    a.stage().load(5, solid("alpha", RED), false, false);
    a.stage().play(5);
    b.stage().load(5, solid("beta", GREEN), false, false);
    b.stage().play(5);
    a.tick();
    b.tick();

    a.stage().swap_layer(5, 5, b.stage(), true);
    a.tick();
    b.tick();

    let name = |channel: &VideoChannel| {
        channel
            .state()
            .get("stage/layer/5/foreground/producer")
            .and_then(|v| match &v[0] {
                Value::Str(s) => Some(s.clone()),
                _ => None,
            })
    };
    // Fully exchanged — never one side only.
    assert_eq!(name(&a).as_deref(), Some("beta"));
    assert_eq!(name(&b).as_deref(), Some("alpha"));
}

// ── Preview / background routing ──────────────────────────────────────────────

#[test]
fn background_route_previews_the_loaded_producer() {
    let channel = Arc::new(VideoChannel::new_stopped(
        1,
        format_25p(),
        Arc::new(SoftwareImageMixer::new()),
        Box::new(|_| {}),
    ));

    channel.stage().load(4, solid("live", RED), false, false);
    channel.stage().play(4);
    channel.stage().load(4, solid("next", GREEN), false, false);

    let route = channel.route(4, crate::route::RouteMode::Background);
    let probe = route.connect();

    channel.tick();
    channel.tick();

    let frames: Vec<_> = probe.try_iter().collect();
    assert_eq!(frames.len(), 2);
    assert!(!frames[0].is_blank(), "background preview should flow");
}
