// crates/aircast-engine/src/output.rs
//
// Fan the composite out to every attached consumer.
//
// Sends go out to all ports first, replies are awaited after — consumers
// run their ticks in parallel on their port threads. A consumer that
// errors, declines, or dies is detached on the spot; the channel only
// ever loses that one output.

use std::collections::BTreeMap;
use std::time::Duration;

use aircast_core::monitor;
use aircast_core::{ConstFrame, VideoField, VideoFormatDesc};

use crate::consumer::{FrameConsumer, Port};
use crate::sync::PaceTimer;

pub struct Output {
    channel_index: i32,
    format_desc:   VideoFormatDesc,
    ports:         BTreeMap<i32, Port>,
    sync_timer:    PaceTimer,
    state:         monitor::State,
}

impl Output {
    pub fn new(format_desc: VideoFormatDesc, channel_index: i32) -> Self {
        Self {
            channel_index,
            format_desc,
            ports: BTreeMap::new(),
            sync_timer: PaceTimer::new(),
            state: monitor::State::new(),
        }
    }

    /// Attach under the consumer's own index.
    pub fn add(&mut self, consumer: Box<dyn FrameConsumer>) -> anyhow::Result<()> {
        let index = consumer.index();
        self.add_at(index, consumer)
    }

    /// Attach under an explicit index, replacing whatever held it.
    pub fn add_at(&mut self, index: i32, consumer: Box<dyn FrameConsumer>) -> anyhow::Result<()> {
        self.ports.remove(&index);
        let port = Port::new(consumer);
        port.initialize(&self.format_desc, self.channel_index)?;
        log::info!("[output {}] consumer {} attached at {index}", self.channel_index, port.name());
        self.ports.insert(index, port);
        Ok(())
    }

    pub fn remove(&mut self, index: i32) -> bool {
        let removed = self.ports.remove(&index).is_some();
        if removed {
            log::info!("[output {}] consumer at {index} removed", self.channel_index);
        }
        removed
    }

    pub fn consumer_count(&self) -> usize {
        self.ports.len()
    }

    fn change_channel_format(&mut self, format: &VideoFormatDesc) {
        let channel_index = self.channel_index;
        self.ports.retain(|index, port| match port.initialize(format, channel_index) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "[output {channel_index}] consumer {index} rejected format {format}, detaching: {e:#}"
                );
                false
            }
        });
        self.format_desc = format.clone();
    }

    /// Deliver one tick's frame and pace the loop if no consumer carries
    /// a synchronization clock of its own.
    pub fn send(&mut self, field: VideoField, frame: ConstFrame, format: &VideoFormatDesc) {
        if !frame.is_valid() {
            return;
        }
        // A frame still in the mixer pipeline from before a format change
        // has the old dimensions; drop it rather than feed consumers a
        // mis-sized raster.
        if frame.size() != format.size {
            log::warn!(
                "[output {}] invalid frame dimension {} for {format}",
                self.channel_index,
                frame.size()
            );
            return;
        }

        if self.format_desc != *format {
            self.change_channel_format(format);
        }

        let replies: Vec<(i32, _)> = self
            .ports
            .iter()
            .map(|(&index, port)| (index, port.send(field, frame.clone())))
            .collect();

        for (index, reply) in replies {
            let keep = match reply.wait() {
                Some(Ok(true)) => true,
                Some(Ok(false)) => {
                    log::info!("[output {}] consumer {index} finished, detaching", self.channel_index);
                    false
                }
                Some(Err(e)) => {
                    log::warn!("[output {}] consumer {index} failed, detaching: {e:#}", self.channel_index);
                    false
                }
                None => {
                    log::warn!("[output {}] consumer {index} died, detaching", self.channel_index);
                    false
                }
            };
            if !keep {
                self.ports.remove(&index);
            }
        }

        let mut state = monitor::State::new();
        for (index, port) in &self.ports {
            state.insert_state(&format!("port/{index}"), port.state());
        }
        self.state = state;

        let needs_sync = self.ports.values().all(|p| !p.has_synchronization_clock());
        if needs_sync {
            self.sync_timer.tick(Duration::from_secs_f64(1.0 / format.fps));
        } else {
            self.sync_timer.reset();
        }
    }

    pub fn state(&self) -> monitor::State {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::test_support::RecordingConsumer;
    use aircast_core::{FormatRepository, PixelFormatDesc};
    use std::sync::atomic::Ordering;

    const P: VideoField = VideoField::Progressive;

    fn format() -> VideoFormatDesc {
        FormatRepository::new().find("720p5000")
    }

    fn frame_for(format: &VideoFormatDesc) -> ConstFrame {
        ConstFrame::new(
            vec![vec![0u8; format.size]],
            vec![0; 960 * 2],
            PixelFormatDesc::bgra(format.width, format.height),
        )
    }

    #[test]
    fn frames_reach_every_consumer() {
        let format = format();
        let mut output = Output::new(format.clone(), 1);

        let a = RecordingConsumer::new(1);
        let b = RecordingConsumer::new(2);
        let (fa, fb) = (a.frames.clone(), b.frames.clone());
        output.add(Box::new(a)).unwrap();
        output.add(Box::new(b)).unwrap();

        output.send(P, frame_for(&format), &format);
        output.send(P, frame_for(&format), &format);

        assert_eq!(fa.lock().len(), 2);
        assert_eq!(fb.lock().len(), 2);
    }

    #[test]
    fn invalid_priming_frame_is_skipped() {
        let format = format();
        let mut output = Output::new(format.clone(), 1);
        let consumer = RecordingConsumer::new(1);
        let frames = consumer.frames.clone();
        output.add(Box::new(consumer)).unwrap();

        output.send(P, ConstFrame::default(), &format);
        assert_eq!(frames.lock().len(), 0);
        assert_eq!(output.consumer_count(), 1);
    }

    #[test]
    fn consumer_declining_is_detached() {
        let format = format();
        let mut output = Output::new(format.clone(), 1);
        let mut consumer = RecordingConsumer::new(1);
        consumer.accept = 2;
        output.add(Box::new(consumer)).unwrap();

        output.send(P, frame_for(&format), &format);
        output.send(P, frame_for(&format), &format);
        assert_eq!(output.consumer_count(), 1);
        output.send(P, frame_for(&format), &format);
        assert_eq!(output.consumer_count(), 0);
    }

    #[test]
    fn failing_initialize_rejects_attach() {
        let format = format();
        let mut output = Output::new(format.clone(), 1);
        let mut consumer = RecordingConsumer::new(1);
        consumer.fail_init = true;
        assert!(output.add(Box::new(consumer)).is_err());
        assert_eq!(output.consumer_count(), 0);
    }

    #[test]
    fn format_change_reinitializes_survivors_and_drops_refusers() {
        let old_format = format();
        let new_format = FormatRepository::new().find("1080p5000");
        let mut output = Output::new(old_format.clone(), 1);

        let good = RecordingConsumer::new(1);
        let good_inits = good.initialized.clone();
        output.add(Box::new(good)).unwrap();

        output.send(P, frame_for(&new_format), &new_format);
        assert_eq!(good_inits.load(Ordering::SeqCst), 2);
        assert_eq!(output.consumer_count(), 1);
    }

    #[test]
    fn wrong_sized_frame_is_dropped() {
        let format = format();
        let mut output = Output::new(format.clone(), 1);
        let consumer = RecordingConsumer::new(1);
        let frames = consumer.frames.clone();
        output.add(Box::new(consumer)).unwrap();

        let tiny = ConstFrame::new(vec![vec![0u8; 16]], vec![], PixelFormatDesc::bgra(2, 2));
        output.send(P, tiny, &format);
        assert_eq!(frames.lock().len(), 0);
    }

    #[test]
    fn replacing_an_index_swaps_the_consumer() {
        let format = format();
        let mut output = Output::new(format.clone(), 1);
        let a = RecordingConsumer::new(7);
        let fa = a.frames.clone();
        output.add(Box::new(a)).unwrap();

        let b = RecordingConsumer::new(7);
        let fb = b.frames.clone();
        output.add(Box::new(b)).unwrap();
        assert_eq!(output.consumer_count(), 1);

        output.send(P, frame_for(&format), &format);
        assert_eq!(fa.lock().len(), 0);
        assert_eq!(fb.lock().len(), 1);
    }
}
