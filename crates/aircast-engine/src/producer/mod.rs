// crates/aircast-engine/src/producer/mod.rs
//
// The producer contract and the plumbing every producer shares.
//
// A producer is anything that can answer "give me the frame for this tick"
// — media, generators, routed feeds, and the transition wrappers that
// impersonate their destination. The layer only ever talks to this trait;
// a transition is a producer wrapping two others, not a layer feature.

mod color;
mod registry;
mod route;
mod separated;
mod sting;
mod transition;

pub use color::{create_color_producer, ColorProducer};
pub use registry::{ProducerDependencies, ProducerFactory, ProducerRegistry};
pub use route::{create_route_producer, RouteProducer};
pub use separated::SeparatedProducer;
pub use sting::{create_sting_producer, StingInfo, StingProducer, STING_FALLBACK_DURATION};
pub use transition::{TransitionDirection, TransitionInfo, TransitionProducer, TransitionType};

use std::sync::atomic::{AtomicI32, Ordering};

use aircast_core::monitor;
use aircast_core::{DrawFrame, VideoField};

pub type BoxedProducer = Box<dyn FrameProducer>;

/// Frame source contract. Every method except `receive` has a safe
/// default so small producers stay small.
pub trait FrameProducer: Send {
    /// Produce the frame for this tick. A blank frame means "not ready yet"
    /// and is not an error; an `Err` marks the producer failed and clears
    /// its layer.
    fn receive(&mut self, field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame>;

    /// Most recent successfully produced frame for `field`. Never fails.
    fn last_frame(&mut self, _field: VideoField) -> DrawFrame {
        DrawFrame::default()
    }

    /// The first frame this producer will emit, for background preview.
    /// Callers treat a blank result as "not ready" rather than waiting.
    fn first_frame(&mut self, field: VideoField) -> DrawFrame {
        self.last_frame(field)
    }

    /// Total clip length in source frames; `u32::MAX` for live/infinite.
    fn nb_frames(&self) -> u32 {
        u32::MAX
    }

    /// Current playhead in source frames.
    fn frame_number(&self) -> u32 {
        0
    }

    /// Producer-specific command surface (LOOP, SEEK, …).
    fn call(&mut self, params: &[String]) -> anyhow::Result<String> {
        anyhow::bail!("{}: unknown command {:?}", self.name(), params)
    }

    /// Hand over the producer being replaced. Called exactly once when a
    /// transition starts.
    fn leading_producer(&mut self, _leading: BoxedProducer) {}

    /// The producer that should replace this one, once. `Some` means done;
    /// the layer swaps it in at the start of the next tick.
    fn following_producer(&mut self) -> Option<BoxedProducer> {
        None
    }

    /// When set, the layer auto-plays its background this many source
    /// frames before the foreground ends.
    fn auto_play_delta(&self) -> Option<i64> {
        None
    }

    fn is_ready(&mut self) -> bool {
        true
    }

    fn state(&self) -> monitor::State {
        monitor::State::new()
    }

    fn paused(&mut self, _value: bool) {}

    fn name(&self) -> String;

    /// Debug-printable identity; defaults to `name`.
    fn print(&self) -> String {
        self.name()
    }
}

// ── Per-field frame buffering ─────────────────────────────────────────────────

/// Field-A/field-B frame slots. Producers that pair streams (fill+key,
/// sting inputs) buffer per field so interlaced polling cannot tear pairs.
/// `Progressive` and `A` share a slot.
#[derive(Default)]
pub struct FramePair {
    field1: DrawFrame,
    field2: DrawFrame,
}

impl FramePair {
    pub fn get(&self, field: VideoField) -> DrawFrame {
        match field {
            VideoField::B => self.field2.clone(),
            _ => self.field1.clone(),
        }
    }

    pub fn set(&mut self, field: VideoField, frame: DrawFrame) {
        match field {
            VideoField::B => self.field2 = frame,
            _ => self.field1 = frame,
        }
    }

    pub fn clear(&mut self, field: VideoField) {
        self.set(field, DrawFrame::default());
    }
}

// ── Framed (still) producer ───────────────────────────────────────────────────

/// Replays one fixed frame forever. The layer uses this to hand a paused
/// foreground's last picture to an incoming transition.
pub struct FramedProducer {
    frame: DrawFrame,
}

impl FramedProducer {
    pub fn new(frame: DrawFrame) -> Self {
        Self { frame }
    }
}

impl FrameProducer for FramedProducer {
    fn receive(&mut self, _field: VideoField, _nb_samples: usize) -> anyhow::Result<DrawFrame> {
        Ok(self.frame.clone())
    }

    fn last_frame(&mut self, _field: VideoField) -> DrawFrame {
        self.frame.clone()
    }

    fn name(&self) -> String {
        "framed".into()
    }
}

// ── Destroy proxy ─────────────────────────────────────────────────────────────

/// Producers may take hundreds of milliseconds to tear down (file handles,
/// subprocesses), so destruction is offloaded to a detached thread. At most
/// `MAX_ASYNC_DESTRUCTIONS` may be in flight; exceeding the cap is a bug
/// upstream and is logged, not fatal.
const MAX_ASYNC_DESTRUCTIONS: i32 = 8;

static ASYNC_DESTRUCTIONS: AtomicI32 = AtomicI32::new(0);

pub struct DestroyProxy {
    inner: Option<BoxedProducer>,
}

impl DestroyProxy {
    pub fn wrap(producer: BoxedProducer) -> BoxedProducer {
        Box::new(Self { inner: Some(producer) })
    }

    fn inner(&mut self) -> &mut BoxedProducer {
        self.inner.as_mut().expect("proxy emptied only on drop")
    }
}

impl Drop for DestroyProxy {
    fn drop(&mut self) {
        let Some(producer) = self.inner.take() else { return };
        let name = producer.print();

        let in_flight = ASYNC_DESTRUCTIONS.fetch_add(1, Ordering::SeqCst) + 1;
        if in_flight > MAX_ASYNC_DESTRUCTIONS {
            log::error!("[producer] {in_flight} concurrent async destructions (cap {MAX_ASYNC_DESTRUCTIONS})");
        }

        std::thread::spawn(move || {
            log::debug!("[producer] destroying {name} off-thread");
            drop(producer);
            ASYNC_DESTRUCTIONS.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

impl FrameProducer for DestroyProxy {
    fn receive(&mut self, field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame> {
        self.inner().receive(field, nb_samples)
    }

    fn last_frame(&mut self, field: VideoField) -> DrawFrame {
        self.inner().last_frame(field)
    }

    fn first_frame(&mut self, field: VideoField) -> DrawFrame {
        self.inner().first_frame(field)
    }

    fn nb_frames(&self) -> u32 {
        self.inner.as_ref().map_or(0, |p| p.nb_frames())
    }

    fn frame_number(&self) -> u32 {
        self.inner.as_ref().map_or(0, |p| p.frame_number())
    }

    fn call(&mut self, params: &[String]) -> anyhow::Result<String> {
        self.inner().call(params)
    }

    fn leading_producer(&mut self, leading: BoxedProducer) {
        self.inner().leading_producer(leading)
    }

    fn following_producer(&mut self) -> Option<BoxedProducer> {
        self.inner().following_producer()
    }

    fn auto_play_delta(&self) -> Option<i64> {
        self.inner.as_ref().and_then(|p| p.auto_play_delta())
    }

    fn is_ready(&mut self) -> bool {
        self.inner().is_ready()
    }

    fn state(&self) -> monitor::State {
        self.inner.as_ref().map_or_else(monitor::State::new, |p| p.state())
    }

    fn paused(&mut self, value: bool) {
        self.inner().paused(value)
    }

    fn name(&self) -> String {
        self.inner.as_ref().map_or_else(|| "destroyed".into(), |p| p.name())
    }

    fn print(&self) -> String {
        self.inner.as_ref().map_or_else(|| "destroyed".into(), |p| p.print())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use aircast_core::{ConstFrame, PixelFormatDesc, StreamTag};

    /// Solid-color producer with a fixed frame count and optional silent
    /// audio, shared by layer/stage/mixer/channel tests.
    pub struct TestProducer {
        pub frame:      DrawFrame,
        pub total:      u32,
        pub position:   u32,
        pub tag:        StreamTag,
        pub with_audio: bool,
        pub fail_next:  bool,
        name:           String,
    }

    impl TestProducer {
        pub fn solid(name: &str, bgra: [u8; 4], total: u32) -> Self {
            let tag = StreamTag::new();
            let pixels: Vec<u8> = bgra.repeat(4);
            let frame = ConstFrame::new(vec![pixels], vec![], PixelFormatDesc::bgra(2, 2))
                .with_tag(tag);
            Self {
                frame: DrawFrame::from(frame),
                total,
                position: 0,
                tag,
                with_audio: false,
                fail_next: false,
                name: name.to_owned(),
            }
        }

        pub fn silent(name: &str, total: u32) -> Self {
            let mut p = Self::solid(name, [0, 0, 0, 255], total);
            p.with_audio = true;
            p
        }
    }

    impl FrameProducer for TestProducer {
        fn receive(&mut self, _field: VideoField, nb_samples: usize) -> anyhow::Result<DrawFrame> {
            if self.fail_next {
                anyhow::bail!("induced failure");
            }
            self.position = self.position.saturating_add(1);
            if self.with_audio {
                let frame = ConstFrame::new(
                    vec![vec![0u8; 16]],
                    vec![0; nb_samples * 2],
                    PixelFormatDesc::bgra(2, 2),
                )
                .with_tag(self.tag);
                return Ok(DrawFrame::from(frame));
            }
            Ok(self.frame.clone())
        }

        fn last_frame(&mut self, _field: VideoField) -> DrawFrame {
            self.frame.clone()
        }

        fn nb_frames(&self) -> u32 {
            self.total
        }

        fn frame_number(&self) -> u32 {
            self.position
        }

        fn name(&self) -> String {
            self.name.clone()
        }
    }

    #[test]
    fn destroy_proxy_drops_off_thread() {
        struct Canary(std::sync::Arc<std::sync::atomic::AtomicBool>);
        impl FrameProducer for Canary {
            fn receive(&mut self, _: VideoField, _: usize) -> anyhow::Result<DrawFrame> {
                Ok(DrawFrame::default())
            }
            fn name(&self) -> String {
                "canary".into()
            }
        }
        impl Drop for Canary {
            fn drop(&mut self) {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let dropped = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let proxy = DestroyProxy::wrap(Box::new(Canary(dropped.clone())));
        drop(proxy);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while !dropped.load(std::sync::atomic::Ordering::SeqCst) {
            assert!(std::time::Instant::now() < deadline, "inner producer never dropped");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn framed_producer_replays_its_frame() {
        let mut p = FramedProducer::new(DrawFrame::empty());
        let a = p.receive(VideoField::Progressive, 0).unwrap();
        let b = p.receive(VideoField::Progressive, 0).unwrap();
        assert_eq!(a, DrawFrame::empty());
        assert_eq!(a, b);
    }

    #[test]
    fn frame_pair_keeps_fields_separate() {
        let mut pair = FramePair::default();
        pair.set(VideoField::A, DrawFrame::empty());
        assert!(!pair.get(VideoField::A).is_blank());
        assert!(pair.get(VideoField::B).is_blank());
        assert!(!pair.get(VideoField::Progressive).is_blank());
    }
}
