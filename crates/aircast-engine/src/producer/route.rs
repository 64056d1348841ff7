// crates/aircast-engine/src/producer/route.rs
//
// Routed input: replays frames tapped from another channel's stage layer.
//
// Holding the `Arc<Route>` is what keeps the tap alive — the source
// channel only holds a weak reference. One frame is consumed per tick to
// stay cadence-accurate; when the source channel stalls, the last picture
// holds with muted audio rather than repeating samples.

use std::sync::Arc;

use aircast_core::monitor;
use aircast_core::{DrawFrame, StreamTag, VideoField};
use crossbeam_channel::Receiver;

use crate::channel::VideoChannel;
use crate::producer::registry::{ProducerDependencies, ProducerFactory};
use crate::producer::{BoxedProducer, FrameProducer};
use crate::route::{Route, RouteMode};

pub struct RouteProducer {
    route:  Arc<Route>,
    rx:     Receiver<DrawFrame>,
    last:   DrawFrame,
    tag:    StreamTag,
    frames: u32,
}

impl RouteProducer {
    pub fn new(route: Arc<Route>) -> Self {
        let rx = route.connect();
        Self { route, rx, last: DrawFrame::default(), tag: StreamTag::new(), frames: 0 }
    }

    /// Re-home a plain leaf under this producer's stream tag so the audio
    /// mixer books its cadence separately from the source channel's copy.
    /// Composite trees pass through untouched.
    fn retag(&self, frame: DrawFrame) -> DrawFrame {
        match frame.leaf() {
            Some(leaf) => {
                let mut retagged = DrawFrame::from(leaf.with_tag(self.tag));
                retagged.transform = frame.transform;
                retagged
            }
            None => frame,
        }
    }
}

impl FrameProducer for RouteProducer {
    fn receive(&mut self, _field: VideoField, _nb_samples: usize) -> anyhow::Result<DrawFrame> {
        match self.rx.try_recv() {
            Ok(frame) => {
                let frame = self.retag(frame);
                self.last = frame.clone();
                self.frames = self.frames.saturating_add(1);
                Ok(frame)
            }
            // Source behind or gone: freeze the picture, mute the audio.
            Err(_) => Ok(DrawFrame::still(self.last.clone())),
        }
    }

    fn last_frame(&mut self, _field: VideoField) -> DrawFrame {
        self.last.clone()
    }

    fn frame_number(&self) -> u32 {
        self.frames
    }

    fn is_ready(&mut self) -> bool {
        !self.last.is_blank() || !self.rx.is_empty()
    }

    fn state(&self) -> monitor::State {
        let mut state = monitor::State::new();
        state.insert("route", self.route.name.as_str());
        state
    }

    fn name(&self) -> String {
        "route".into()
    }

    fn print(&self) -> String {
        format!("route[{}]", self.route.name)
    }
}

/// Registry factory for `route://<channel>[/<layer>]` specs, with an
/// optional `BACKGROUND` or `NEXT` second parameter.
pub fn create_route_producer() -> ProducerFactory {
    Box::new(|deps: &ProducerDependencies, params: &[String]| {
        let Some(spec) = params.first() else { return Ok(None) };
        let Some(rest) = spec.strip_prefix("route://") else { return Ok(None) };

        let mut parts = rest.splitn(2, '/');
        let channel_index: i32 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("malformed route spec {spec:?}"))?;
        let layer_index: i32 = match parts.next() {
            Some(s) => s.parse().map_err(|_| anyhow::anyhow!("malformed route layer in {spec:?}"))?,
            None => -1,
        };

        let mode = match params.get(1).map(|s| s.to_ascii_uppercase()) {
            Some(ref s) if s == "BACKGROUND" => RouteMode::Background,
            Some(ref s) if s == "NEXT" => RouteMode::Next,
            _ => RouteMode::Foreground,
        };

        let channel: &Arc<VideoChannel> = deps
            .channels
            .iter()
            .find(|c| c.index() == channel_index)
            .ok_or_else(|| anyhow::anyhow!("no channel {channel_index} for {spec:?}"))?;

        let route = channel.route(layer_index, mode);
        Ok(Some(Box::new(RouteProducer::new(route)) as BoxedProducer))
    })
}
