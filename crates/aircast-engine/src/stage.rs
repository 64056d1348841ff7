// crates/aircast-engine/src/stage.rs
//
// The stage: ordered layers, their tweened transforms, and the per-tick
// produce pass.
//
// All mutation goes through the stage lock, the channel's serial
// executor: a `load` issued before a `play` is observed in that order,
// and the produce pass sees a consistent set of layers. Cross-channel
// swaps take both stage locks in ascending channel order, the one and
// only cross-channel locking rule in the engine.

use std::collections::BTreeMap;

use aircast_core::monitor;
use aircast_core::{DrawFrame, Ease, FrameTransform, TweenedTransform, VideoField};
use parking_lot::{Mutex, MutexGuard};

use crate::layer::Layer;
use crate::producer::BoxedProducer;

/// What one layer contributed this tick. `background` is only fetched for
/// layers in the routed-background set.
#[derive(Clone, Debug, Default)]
pub struct LayerFrame {
    pub foreground:     DrawFrame,
    pub background:     DrawFrame,
    pub has_background: bool,
}

#[derive(Default)]
struct StageState {
    layers:    BTreeMap<i32, Layer>,
    tweens:    BTreeMap<i32, TweenedTransform>,
    published: monitor::State,
}

impl StageState {
    fn layer(&mut self, index: i32) -> &mut Layer {
        self.layers.entry(index).or_default()
    }
}

pub struct Stage {
    channel_index: i32,
    state:         Mutex<StageState>,
}

pub type TransformFn = Box<dyn FnOnce(FrameTransform) -> FrameTransform + Send>;

impl Stage {
    pub fn new(channel_index: i32) -> Self {
        Self { channel_index, state: Mutex::new(StageState::default()) }
    }

    pub fn channel_index(&self) -> i32 {
        self.channel_index
    }

    /// The per-tick produce pass, ascending layer order: advance tweens,
    /// collect each layer's frame wrapped in its current transform, fetch
    /// backgrounds for routed layers, and hand every entry to the routing
    /// callback before returning the lot to the mixer.
    pub fn produce(
        &self,
        field: VideoField,
        nb_samples: usize,
        routed_background: &[i32],
        routing_cb: impl Fn(i32, &LayerFrame),
    ) -> BTreeMap<i32, LayerFrame> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for tween in state.tweens.values_mut() {
            tween.tick(1);
        }

        let mut frames: BTreeMap<i32, LayerFrame> = BTreeMap::new();
        for (&index, layer) in state.layers.iter_mut() {
            let produced = layer.receive(field, nb_samples);
            let transform = state.tweens.entry(index).or_default().fetch();
            frames.insert(
                index,
                LayerFrame {
                    foreground: DrawFrame::push_with(produced, transform),
                    background: DrawFrame::default(),
                    has_background: false,
                },
            );
        }

        for &index in routed_background {
            if let (Some(layer), Some(entry)) = (state.layers.get_mut(&index), frames.get_mut(&index)) {
                entry.background = layer.receive_background(field, nb_samples);
                entry.has_background = layer.has_background();
            }
        }

        let mut published = monitor::State::new();
        for (&index, layer) in state.layers.iter() {
            published.insert_state(&format!("layer/{index}"), layer.state());
        }
        state.published = published;

        for (&index, entry) in frames.iter() {
            routing_cb(index, entry);
        }

        frames
    }

    // ── Layer operations ──────────────────────────────────────────────────────

    pub fn load(&self, index: i32, producer: BoxedProducer, preview: bool, auto_play: bool) {
        self.state.lock().layer(index).load(producer, preview, auto_play);
    }

    pub fn play(&self, index: i32) {
        self.state.lock().layer(index).play();
    }

    pub fn pause(&self, index: i32) {
        self.state.lock().layer(index).pause();
    }

    pub fn resume(&self, index: i32) {
        self.state.lock().layer(index).resume();
    }

    pub fn stop(&self, index: i32) {
        self.state.lock().layer(index).stop();
    }

    pub fn clear(&self, index: i32) {
        self.state.lock().layers.remove(&index);
    }

    pub fn clear_all(&self) {
        self.state.lock().layers.clear();
    }

    pub fn call(&self, index: i32, params: &[String]) -> anyhow::Result<String> {
        self.state.lock().layer(index).call(params)
    }

    // ── Transform operations ──────────────────────────────────────────────────

    pub fn apply_transform(
        &self,
        index: i32,
        transform: impl FnOnce(FrameTransform) -> FrameTransform,
        mix_duration: u32,
        ease: Ease,
    ) {
        let mut state = self.state.lock();
        let tween = state.tweens.entry(index).or_default();
        let src = tween.fetch();
        let dst = transform(*tween.dest());
        state.tweens.insert(index, TweenedTransform::new(src, dst, mix_duration, ease));
    }

    pub fn apply_transforms(&self, batch: Vec<(i32, TransformFn, u32, Ease)>) {
        let mut state = self.state.lock();
        for (index, transform, duration, ease) in batch {
            let tween = state.tweens.entry(index).or_default();
            let src = tween.fetch();
            let dst = transform(*tween.dest());
            state.tweens.insert(index, TweenedTransform::new(src, dst, duration, ease));
        }
    }

    pub fn clear_transform(&self, index: i32) {
        self.state.lock().tweens.remove(&index);
    }

    pub fn clear_transforms(&self) {
        self.state.lock().tweens.clear();
    }

    pub fn get_current_transform(&self, index: i32) -> FrameTransform {
        self.state.lock().tweens.entry(index).or_default().fetch()
    }

    // ── Cross-channel swaps ───────────────────────────────────────────────────

    /// Lock two stages without deadlocking: ascending channel index, with
    /// the object address as the tiebreak.
    fn lock_pair<'a>(
        &'a self,
        other: &'a Stage,
    ) -> (MutexGuard<'a, StageState>, MutexGuard<'a, StageState>) {
        let self_first = (self.channel_index, self as *const _ as usize)
            < (other.channel_index, other as *const _ as usize);
        if self_first {
            let mine = self.state.lock();
            let theirs = other.state.lock();
            (mine, theirs)
        } else {
            let theirs = other.state.lock();
            let mine = self.state.lock();
            (mine, theirs)
        }
    }

    /// Swap every layer with `other`, atomically for both channels.
    pub fn swap_layers(&self, other: &Stage, swap_transforms: bool) {
        if std::ptr::eq(self, other) {
            return;
        }
        let (mut mine, mut theirs) = self.lock_pair(other);
        std::mem::swap(&mut mine.layers, &mut theirs.layers);
        if swap_transforms {
            std::mem::swap(&mut mine.tweens, &mut theirs.tweens);
        }
    }

    /// Swap one layer with a layer on `other` (or within this stage when
    /// `other` is self). No tick on either channel observes a half-swap.
    pub fn swap_layer(&self, index: i32, other_index: i32, other: &Stage, swap_transforms: bool) {
        if std::ptr::eq(self, other) {
            let mut state = self.state.lock();
            if index == other_index {
                return;
            }
            let mine = std::mem::take(state.layer(index));
            let theirs = std::mem::replace(state.layer(other_index), mine);
            *state.layer(index) = theirs;
            if swap_transforms {
                let mine = state.tweens.remove(&index).unwrap_or_default();
                let theirs = state.tweens.remove(&other_index).unwrap_or_default();
                state.tweens.insert(index, theirs);
                state.tweens.insert(other_index, mine);
            }
            return;
        }

        let (mut mine, mut theirs) = self.lock_pair(other);
        let my_layer = std::mem::take(mine.layer(index));
        let their_layer = std::mem::replace(theirs.layer(other_index), my_layer);
        *mine.layer(index) = their_layer;
        if swap_transforms {
            let my_tween = mine.tweens.remove(&index).unwrap_or_default();
            let their_tween = theirs.tweens.remove(&other_index).unwrap_or_default();
            mine.tweens.insert(index, their_tween);
            theirs.tweens.insert(other_index, my_tween);
        }
    }

    pub fn state(&self) -> monitor::State {
        self.state.lock().published.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::test_support::TestProducer;

    const P: VideoField = VideoField::Progressive;

    fn producer(name: &str) -> BoxedProducer {
        Box::new(TestProducer::solid(name, [1, 2, 3, 255], u32::MAX))
    }

    fn produce(stage: &Stage) -> BTreeMap<i32, LayerFrame> {
        stage.produce(P, 960, &[], |_, _| {})
    }

    #[test]
    fn layers_come_back_in_ascending_index_order() {
        let stage = Stage::new(1);
        for index in [30, 10, 20] {
            stage.load(index, producer(&format!("p{index}")), false, false);
            stage.play(index);
        }
        let frames = produce(&stage);
        let indices: Vec<i32> = frames.keys().copied().collect();
        assert_eq!(indices, vec![10, 20, 30]);
    }

    #[test]
    fn produced_frames_carry_the_layer_transform() {
        let stage = Stage::new(1);
        stage.load(10, producer("p"), false, false);
        stage.play(10);
        stage.apply_transform(10, |mut t| {
            t.image.opacity = 0.5;
            t
        }, 0, Ease::Linear);

        let frames = produce(&stage);
        assert!((frames[&10].foreground.transform.image.opacity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn transform_tweens_advance_once_per_tick() {
        let stage = Stage::new(1);
        stage.load(10, producer("p"), false, false);
        stage.play(10);
        stage.apply_transform(10, |mut t| {
            t.image.opacity = 0.0;
            t
        }, 4, Ease::Linear);

        let opacities: Vec<f64> = (0..5)
            .map(|_| produce(&stage)[&10].foreground.transform.image.opacity)
            .collect();
        // Tween ticks before fetch: first produced frame is already 1/4 in.
        for (i, opacity) in opacities.iter().enumerate() {
            let expected = 1.0 - ((i + 1) as f64 / 4.0).min(1.0);
            assert!((opacity - expected).abs() < 1e-9, "tick {i}: {opacity}");
        }
    }

    #[test]
    fn clear_transform_snaps_back_to_identity() {
        let stage = Stage::new(1);
        stage.load(10, producer("p"), false, false);
        stage.play(10);
        stage.apply_transform(10, |mut t| {
            t.image.opacity = 0.0;
            t
        }, 0, Ease::Linear);
        stage.clear_transform(10);
        let frames = produce(&stage);
        assert_eq!(frames[&10].foreground.transform, FrameTransform::default());
    }

    #[test]
    fn routed_background_set_controls_background_fetch() {
        let stage = Stage::new(1);
        stage.load(10, producer("fg"), false, false);
        stage.play(10);
        stage.load(10, producer("bg"), false, false);

        let frames = stage.produce(P, 960, &[], |_, _| {});
        assert!(!frames[&10].has_background);
        assert!(frames[&10].background.is_blank());

        let frames = stage.produce(P, 960, &[10], |_, _| {});
        assert!(frames[&10].has_background);
        assert!(!frames[&10].background.is_blank());
    }

    #[test]
    fn routing_callback_sees_every_layer() {
        let stage = Stage::new(1);
        stage.load(10, producer("a"), false, false);
        stage.play(10);
        stage.load(20, producer("b"), false, false);
        stage.play(20);

        let seen = std::sync::Mutex::new(Vec::new());
        stage.produce(P, 960, &[], |index, _| seen.lock().unwrap().push(index));
        assert_eq!(*seen.lock().unwrap(), vec![10, 20]);
    }

    #[test]
    fn swap_layer_within_a_stage() {
        let stage = Stage::new(1);
        stage.load(10, producer("a"), false, false);
        stage.play(10);
        stage.load(20, producer("b"), false, false);
        stage.play(20);

        stage.swap_layer(10, 20, &stage, false);
        stage.produce(P, 960, &[], |_, _| {});
        let state = stage.state();
        assert_eq!(
            state.get("layer/10/foreground/producer"),
            Some(&[monitor::Value::Str("b".into())][..])
        );
        assert_eq!(
            state.get("layer/20/foreground/producer"),
            Some(&[monitor::Value::Str("a".into())][..])
        );
    }

    #[test]
    fn swap_layers_across_stages_moves_everything() {
        let a = Stage::new(1);
        let b = Stage::new(2);
        a.load(10, producer("mine"), false, false);
        a.play(10);

        a.swap_layers(&b, true);
        assert!(produce(&a).is_empty());
        let frames = produce(&b);
        assert_eq!(frames.len(), 1);
        assert!(frames.contains_key(&10));
    }

    #[test]
    fn cross_stage_swaps_from_both_sides_do_not_deadlock() {
        use std::sync::Arc;
        let a = Arc::new(Stage::new(1));
        let b = Arc::new(Stage::new(2));
        a.load(10, producer("a"), false, false);
        b.load(10, producer("b"), false, false);

        let (a2, b2) = (a.clone(), b.clone());
        let t1 = std::thread::spawn(move || {
            for _ in 0..500 {
                a2.swap_layer(10, 10, &b2, true);
            }
        });
        let (a3, b3) = (a.clone(), b.clone());
        let t2 = std::thread::spawn(move || {
            for _ in 0..500 {
                b3.swap_layer(10, 10, &a3, true);
            }
        });
        t1.join().unwrap();
        t2.join().unwrap();
    }
}
