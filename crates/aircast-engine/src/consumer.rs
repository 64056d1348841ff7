// crates/aircast-engine/src/consumer.rs
//
// The consumer contract and the port that runs one.
//
// A consumer implements synchronous `send`/`initialize`; the `Port` gives
// it a dedicated worker thread and turns `send` into a reply the output
// can await in parallel across consumers. Dropping the port disconnects
// the command channel and the worker thread tears the consumer down on
// its way out — consumer destructors never run on a channel thread.

use aircast_core::monitor;
use aircast_core::{ConstFrame, VideoField, VideoFormatDesc};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::sync::{oneshot, Promise, Reply};

pub trait FrameConsumer: Send {
    /// Deliver one frame. `Ok(false)` means "done, please detach me";
    /// an error detaches too.
    fn send(&mut self, field: VideoField, frame: ConstFrame) -> anyhow::Result<bool>;

    /// Called on attach and again on every channel format change.
    fn initialize(&mut self, format: &VideoFormatDesc, channel_index: i32) -> anyhow::Result<()>;

    /// True when this consumer paces the channel (e.g. an SDI card's
    /// hardware clock). With no clocked consumer attached, the channel
    /// paces itself.
    fn has_synchronization_clock(&self) -> bool {
        false
    }

    /// Stable identity within a channel; re-adding the same index
    /// replaces the previous consumer.
    fn index(&self) -> i32;

    fn name(&self) -> String;

    fn print(&self) -> String {
        self.name()
    }

    fn state(&self) -> monitor::State {
        monitor::State::new()
    }
}

enum PortCmd {
    Send(VideoField, ConstFrame, Promise<anyhow::Result<bool>>),
    Initialize(VideoFormatDesc, i32, Promise<anyhow::Result<()>>),
}

/// One attached consumer: its worker thread, command channel, and the
/// identity bits the output needs without crossing threads.
pub struct Port {
    tx:        Sender<PortCmd>,
    index:     i32,
    name:      String,
    has_clock: bool,
    state:     Arc<Mutex<monitor::State>>,
}

impl Port {
    pub fn new(mut consumer: Box<dyn FrameConsumer>) -> Self {
        let index = consumer.index();
        let name = consumer.name();
        let has_clock = consumer.has_synchronization_clock();
        let state = Arc::new(Mutex::new(consumer.state()));

        let (tx, rx) = unbounded::<PortCmd>();
        let shared_state = state.clone();
        let thread_name = format!("port-{index}");
        let _ = std::thread::Builder::new().name(thread_name).spawn(move || {
            while let Ok(cmd) = rx.recv() {
                match cmd {
                    PortCmd::Send(field, frame, promise) => {
                        promise.set(consumer.send(field, frame));
                        *shared_state.lock() = consumer.state();
                    }
                    PortCmd::Initialize(format, channel_index, promise) => {
                        promise.set(consumer.initialize(&format, channel_index));
                    }
                }
            }
            log::debug!("[port] {} detached, destroying consumer off-channel", consumer.print());
        });

        Self { tx, index, name, has_clock, state }
    }

    /// Queue a frame; the reply resolves when the consumer accepted or
    /// rejected it. `None` from the reply means the worker died.
    pub fn send(&self, field: VideoField, frame: ConstFrame) -> Reply<anyhow::Result<bool>> {
        let (promise, reply) = oneshot();
        if self.tx.send(PortCmd::Send(field, frame, promise)).is_err() {
            // Worker gone; the dropped promise makes the reply yield None.
        }
        reply
    }

    pub fn initialize(&self, format: &VideoFormatDesc, channel_index: i32) -> anyhow::Result<()> {
        let (promise, reply) = oneshot();
        self.tx
            .send(PortCmd::Initialize(format.clone(), channel_index, promise))
            .map_err(|_| anyhow::anyhow!("consumer {} worker is gone", self.name))?;
        reply
            .wait()
            .ok_or_else(|| anyhow::anyhow!("consumer {} died during initialize", self.name))?
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_synchronization_clock(&self) -> bool {
        self.has_clock
    }

    pub fn state(&self) -> monitor::State {
        self.state.lock().clone()
    }
}
