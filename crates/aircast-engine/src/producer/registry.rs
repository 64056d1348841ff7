// crates/aircast-engine/src/producer/registry.rs
//
// Producer factories.
//
// Factories are consulted in registration order; the first one returning a
// producer wins. A factory declines by returning `Ok(None)` — an `Err`
// means it recognized the request and failed, which aborts the lookup.

use std::sync::Arc;

use aircast_core::VideoFormatDesc;

use crate::channel::VideoChannel;
use crate::mixer::image::FrameFactory;
use crate::producer::{BoxedProducer, DestroyProxy};

/// Everything a factory may need: buffer allocation, sibling channels for
/// routed inputs, and the active format.
#[derive(Clone)]
pub struct ProducerDependencies {
    pub frame_factory: Arc<dyn FrameFactory>,
    pub channels:      Vec<Arc<VideoChannel>>,
    pub format_desc:   VideoFormatDesc,
    pub registry:      Arc<ProducerRegistry>,
}

impl ProducerDependencies {
    pub fn new(
        frame_factory: Arc<dyn FrameFactory>,
        channels: Vec<Arc<VideoChannel>>,
        format_desc: VideoFormatDesc,
        registry: Arc<ProducerRegistry>,
    ) -> Self {
        Self { frame_factory, channels, format_desc, registry }
    }
}

pub type ProducerFactory =
    Box<dyn Fn(&ProducerDependencies, &[String]) -> anyhow::Result<Option<BoxedProducer>> + Send + Sync>;

#[derive(Default)]
pub struct ProducerRegistry {
    factories: Vec<(String, ProducerFactory)>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Not thread-safe: register everything before handing out the registry.
    pub fn register(&mut self, name: &str, factory: ProducerFactory) {
        self.factories.push((name.to_owned(), factory));
    }

    /// Try factories in registration order. `Ok(None)` when nothing
    /// matched. Matches come back wrapped in the destroy proxy so teardown
    /// never runs on a channel thread.
    pub fn create_producer(
        &self,
        dependencies: &ProducerDependencies,
        params: &[String],
    ) -> anyhow::Result<Option<BoxedProducer>> {
        for (name, factory) in &self.factories {
            match factory(dependencies, params) {
                Ok(Some(producer)) => {
                    log::debug!("[producer] {name} created for {params:?}");
                    return Ok(Some(DestroyProxy::wrap(producer)));
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("[producer] factory {name} failed for {params:?}: {e:#}");
                    return Err(e);
                }
            }
        }
        Ok(None)
    }

    /// Whitespace-splitting convenience for single-string specs
    /// ("route://1/10", "#FF0000").
    pub fn create_producer_str(
        &self,
        dependencies: &ProducerDependencies,
        spec: &str,
    ) -> anyhow::Result<Option<BoxedProducer>> {
        let params: Vec<String> = spec.split_whitespace().map(str::to_owned).collect();
        self.create_producer(dependencies, &params)
    }
}
