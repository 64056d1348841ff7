// crates/aircast-engine/src/route.rs
//
// Inter-channel routes: a named fan-out tap on a stage layer.
//
// The channel owns a weak-keyed map of routes; a route stays alive only
// while at least one subscriber (typically a `RouteProducer` on another
// channel) holds its `Arc`. Emission happens on the producing channel's
// loop thread under the route-map lock, so subscribers receive through a
// bounded channel and must never re-enter stage mutation from the
// callback path.

use aircast_core::{DrawFrame, VideoFormatDesc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

/// Frames a slow subscriber may lag behind before new frames are dropped.
const ROUTE_BUFFER_DEPTH: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RouteMode {
    Foreground,
    Background,
    /// Background if one is loaded, otherwise foreground.
    Next,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteId {
    pub index: i32,
    pub mode:  RouteMode,
}

pub struct Route {
    pub format_desc: VideoFormatDesc,
    pub name:        String,
    subscribers:     Mutex<Vec<Sender<DrawFrame>>>,
}

impl Route {
    pub fn new(format_desc: VideoFormatDesc, name: String) -> Self {
        Self { format_desc, name, subscribers: Mutex::new(Vec::new()) }
    }

    /// Subscribe; the receiver sees every emitted frame up to
    /// `ROUTE_BUFFER_DEPTH` of backlog, after which new frames are dropped
    /// for that subscriber.
    pub fn connect(&self) -> Receiver<DrawFrame> {
        let (tx, rx) = bounded(ROUTE_BUFFER_DEPTH);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Emit one frame to every live subscriber. Disconnected subscribers
    /// are pruned; a full backlog drops this frame for that subscriber
    /// rather than blocking the channel thread.
    pub fn signal(&self, frame: DrawFrame) {
        self.subscribers.lock().retain(|tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("[route] {} backlog full, frame dropped", self.name);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircast_core::FormatRepository;

    fn route() -> Route {
        Route::new(FormatRepository::new().find("720p5000"), "1/10".into())
    }

    #[test]
    fn every_subscriber_sees_every_frame() {
        let route = route();
        let a = route.connect();
        let b = route.connect();

        route.signal(DrawFrame::empty());
        route.signal(DrawFrame::empty());

        assert_eq!(a.try_iter().count(), 2);
        assert_eq!(b.try_iter().count(), 2);
    }

    #[test]
    fn disconnected_subscribers_are_pruned() {
        let route = route();
        let rx = route.connect();
        drop(rx);
        route.signal(DrawFrame::empty());
        assert_eq!(route.subscriber_count(), 0);
    }

    #[test]
    fn full_backlog_drops_frames_without_blocking() {
        let route = route();
        let rx = route.connect();
        for _ in 0..ROUTE_BUFFER_DEPTH + 3 {
            route.signal(DrawFrame::empty());
        }
        assert_eq!(rx.try_iter().count(), ROUTE_BUFFER_DEPTH);
        assert_eq!(route.subscriber_count(), 1);
    }
}
