// crates/aircast-engine/src/lib.rs
//
// The playout runtime: producers, layers, the stage, the mixers, output
// fan-out, inter-channel routes, and the per-channel tick loop.
//
// Data flows leaves-first each tick:
//
//   producers → layer → stage → mixer → output → consumers
//                         │
//                         └→ routes → producers on other channels
//
// One thread per channel drives the loop; the stage serializes all layer
// and transform mutations behind its lock; every consumer runs on its own
// port thread. See `channel::VideoChannel` for the loop itself.

pub mod channel;
#[cfg(test)]
mod scenarios;
pub mod consumer;
pub mod layer;
pub mod mixer;
pub mod output;
pub mod producer;
pub mod route;
pub mod stage;
pub mod sync;

pub use channel::VideoChannel;
pub use consumer::FrameConsumer;
pub use mixer::image::{FrameFactory, ImageMixer};
pub use mixer::software::SoftwareImageMixer;
pub use mixer::Mixer;
pub use producer::{BoxedProducer, FrameProducer, ProducerDependencies, ProducerRegistry};
pub use route::{Route, RouteMode};
pub use stage::Stage;
pub use sync::{Promise, Reply};
