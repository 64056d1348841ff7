// crates/aircast-engine/src/channel.rs
//
// One channel: one pipeline, one loop thread, one frame per tick.
//
// The loop never stops for a failure: producers clear their layer,
// consumers detach, everything else logs and carries on to the next
// tick. The only exit is the abort flag at teardown.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use aircast_core::monitor;
use aircast_core::{DrawFrame, VideoField, VideoFormatDesc};
use parking_lot::Mutex;

use crate::consumer::FrameConsumer;
use crate::mixer::audio::MasterVolume;
use crate::mixer::image::{FrameFactory, ImageMixer};
use crate::mixer::Mixer;
use crate::output::Output;
use crate::route::{Route, RouteId, RouteMode};
use crate::stage::{LayerFrame, Stage};

pub type TickCallback = Box<dyn Fn(&monitor::State) + Send + Sync>;

struct ChannelCore {
    index:         i32,
    format_desc:   Mutex<VideoFormatDesc>,
    stage:         Stage,
    mixer:         Mutex<Mixer>,
    output:        Mutex<Output>,
    routes:        Mutex<BTreeMap<RouteId, Weak<Route>>>,
    state:         Mutex<monitor::State>,
    frame_counter: AtomicU64,
    abort_request: AtomicBool,
    on_tick:       TickCallback,
}

impl ChannelCore {
    /// One full produce → mix → consume pass.
    fn tick(&self) {
        let format = self.format_desc.lock().clone();

        let counter = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let nb_samples = format.audio_cadence[counter as usize % format.audio_cadence.len()];
        let field = if format.field_count == 2 {
            if counter % 2 == 0 { VideoField::A } else { VideoField::B }
        } else {
            VideoField::Progressive
        };

        let frame_timer = Instant::now();

        // Layers whose background a route needs this tick.
        let routed_background: Vec<i32> = {
            let routes = self.routes.lock();
            routes
                .iter()
                .filter(|(id, route)| route.strong_count() > 0 && id.mode != RouteMode::Foreground)
                .map(|(id, _)| id.index)
                .collect()
        };

        // Produce.
        let produce_timer = Instant::now();
        let layer_frames = self.stage.produce(field, nb_samples, &routed_background, |layer, frame| {
            self.emit_layer_routes(layer, frame)
        });
        let produce_time = produce_timer.elapsed().as_secs_f64();

        let frames: Vec<DrawFrame> =
            layer_frames.values().map(|lf| lf.foreground.clone()).collect();
        self.emit_channel_routes(&frames);

        // Mix.
        let mix_timer = Instant::now();
        let mixed = self.mixer.lock().mix(frames, &format, nb_samples);
        let mix_time = mix_timer.elapsed().as_secs_f64();

        // Consume.
        let consume_timer = Instant::now();
        self.output.lock().send(field, mixed, &format);
        let consume_time = consume_timer.elapsed().as_secs_f64();

        let mut state = monitor::State::new();
        state.insert_state("stage", self.stage.state());
        state.insert_state("mixer", self.mixer.lock().state());
        state.insert_state("output", self.output.lock().state());
        state.insert_list(
            "framerate",
            vec![format.time_scale as i64, format.duration as i64],
        );
        // Scaled for the 2-frames-per-division graph display.
        let scale = format.fps * 0.5;
        state.insert("diag/produce-time", produce_time * scale);
        state.insert("diag/mix-time", mix_time * scale);
        state.insert("diag/consume-time", consume_time * scale);

        let tick_timer = Instant::now();
        (self.on_tick)(&state);
        state.insert("diag/tick-time", tick_timer.elapsed().as_secs_f64() * scale);
        state.insert("diag/frame-time", frame_timer.elapsed().as_secs_f64() * scale);

        *self.state.lock() = state;
    }

    /// Per-layer route fan-out, invoked from the stage pass with the
    /// route map locked here: subscribers must not re-enter this channel's
    /// stage.
    fn emit_layer_routes(&self, layer: i32, frame: &LayerFrame) {
        let routes = self.routes.lock();
        for (id, weak) in routes.iter() {
            if id.index != layer {
                continue;
            }
            let Some(route) = weak.upgrade() else { continue };

            let selected = match id.mode {
                RouteMode::Background => &frame.background,
                RouteMode::Next if frame.has_background => &frame.background,
                _ => &frame.foreground,
            };
            route.signal(DrawFrame::pop(selected));
        }
    }

    /// The whole-channel tap (index -1): the ordered layer stack before
    /// composition, transforms intact.
    fn emit_channel_routes(&self, frames: &[DrawFrame]) {
        let routes = self.routes.lock();
        for (id, weak) in routes.iter() {
            if id.index != -1 {
                continue;
            }
            if let Some(route) = weak.upgrade() {
                route.signal(DrawFrame::from_list(frames.to_vec()));
            }
        }
    }

    fn route(&self, index: i32, mode: RouteMode) -> Arc<Route> {
        let mut routes = self.routes.lock();
        let id = RouteId { index, mode };

        if let Some(route) = routes.get(&id).and_then(Weak::upgrade) {
            return route;
        }

        let mut name = self.index.to_string();
        if index != -1 {
            name.push_str(&format!("/{index}"));
        }
        match mode {
            RouteMode::Background => name.push_str("/background"),
            RouteMode::Next => name.push_str("/next"),
            RouteMode::Foreground => {}
        }

        let route = Arc::new(Route::new(self.format_desc.lock().clone(), name));
        routes.insert(id, Arc::downgrade(&route));
        route
    }
}

pub struct VideoChannel {
    core:          Arc<ChannelCore>,
    thread:        Mutex<Option<std::thread::JoinHandle<()>>>,
    master_volume: MasterVolume,
    frame_factory: Arc<dyn FrameFactory>,
}

impl VideoChannel {
    /// Create the channel and start its loop thread.
    pub fn new<M>(
        index: i32,
        format_desc: VideoFormatDesc,
        image_mixer: Arc<M>,
        on_tick: TickCallback,
    ) -> Self
    where
        M: ImageMixer + 'static,
    {
        let channel = Self::new_stopped(index, format_desc, image_mixer, on_tick);

        let core = channel.core.clone();
        let handle = std::thread::Builder::new()
            .name(format!("channel-{index}"))
            .spawn(move || {
                log::info!("[channel {}] loop started", core.index);
                while !core.abort_request.load(Ordering::Relaxed) {
                    core.tick();
                }
                log::info!("[channel {}] loop stopped", core.index);
            })
            .expect("spawn channel thread");
        *channel.thread.lock() = Some(handle);

        channel
    }

    /// Create without a loop thread; every tick is driven by the caller.
    /// Used by tests and by hosts that slave a channel to an external
    /// clock.
    pub fn new_stopped<M>(
        index: i32,
        format_desc: VideoFormatDesc,
        image_mixer: Arc<M>,
        on_tick: TickCallback,
    ) -> Self
    where
        M: ImageMixer + 'static,
    {
        let frame_factory: Arc<dyn FrameFactory> = image_mixer.clone();
        let mixer = Mixer::new(image_mixer);
        let master_volume = mixer.master_volume();

        let core = Arc::new(ChannelCore {
            index,
            format_desc: Mutex::new(format_desc.clone()),
            stage: Stage::new(index),
            mixer: Mutex::new(mixer),
            output: Mutex::new(Output::new(format_desc, index)),
            routes: Mutex::new(BTreeMap::new()),
            state: Mutex::new(monitor::State::new()),
            frame_counter: AtomicU64::new(0),
            abort_request: AtomicBool::new(false),
            on_tick,
        });

        Self { core, thread: Mutex::new(None), master_volume, frame_factory }
    }

    /// Drive one tick by hand (stopped channels only; a running channel
    /// ticks itself).
    pub fn tick(&self) {
        self.core.tick();
    }

    pub fn index(&self) -> i32 {
        self.core.index
    }

    pub fn stage(&self) -> &Stage {
        &self.core.stage
    }

    pub fn video_format_desc(&self) -> VideoFormatDesc {
        self.core.format_desc.lock().clone()
    }

    /// Change the channel format. All producers are dropped first: the
    /// stage is cleared before the new format becomes visible to the loop.
    pub fn set_video_format_desc(&self, format_desc: VideoFormatDesc) {
        self.core.stage.clear_all();
        *self.core.format_desc.lock() = format_desc;
        log::info!("[channel {}] format changed to {}", self.core.index, self.video_format_desc());
    }

    pub fn add_consumer(&self, consumer: Box<dyn FrameConsumer>) -> anyhow::Result<()> {
        self.core.output.lock().add(consumer)
    }

    pub fn remove_consumer(&self, index: i32) -> bool {
        self.core.output.lock().remove(index)
    }

    /// The fan-out tap for `(layer, mode)`, created on first use. Held
    /// weakly here: the route lives as long as some subscriber keeps it.
    pub fn route(&self, index: i32, mode: RouteMode) -> Arc<Route> {
        self.core.route(index, mode)
    }

    pub fn frame_factory(&self) -> Arc<dyn FrameFactory> {
        self.frame_factory.clone()
    }

    pub fn master_volume(&self) -> MasterVolume {
        self.master_volume.clone()
    }

    pub fn state(&self) -> monitor::State {
        self.core.state.lock().clone()
    }

    pub fn audio_buffer_overflow_count(&self) -> u64 {
        self.core.mixer.lock().audio_buffer_overflow_count()
    }

    pub fn audio_clipping_count(&self) -> u64 {
        self.core.mixer.lock().audio_clipping_count()
    }
}

impl Drop for VideoChannel {
    fn drop(&mut self) {
        self.core.abort_request.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}
