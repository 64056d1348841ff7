// crates/aircast-engine/src/mixer/audio.rs
//
// Audio mixdown: per-source volume ramps and cadence alignment.
//
// Samples accumulate in f64 so volume multiplication cannot overflow;
// only the final master-volume step saturates to i32.
//
// Cadence handling: at fractional rates the per-tick sample count varies
// (801, 800, 801, …) while sources deliver their own cadence phase, so
// each source's surplus samples carry over to the next tick, keyed by
// stream tag. A source's very first appearance is padded with one silent
// sample frame; without it the source sits one cadence slot early and
// every later tick re-splits mid-frame.
//
// Volume ramps: the previous tick's volume per tag is remembered and the
// new volume is approached linearly across the tick's samples, so a
// volume change never steps mid-stream. `immediate_volume` skips the ramp
// (transitions that already fade per-tick want their exact value).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use aircast_core::monitor;
use aircast_core::{AudioTransform, ConstFrame, FrameTransform, FrameVisitor, StreamTag, VideoFormatDesc};

/// Sources quieter than this are dropped from the mix entirely.
const SILENCE_THRESHOLD: f64 = 0.002;

/// Ramp only when the volume actually moved; cheaper and avoids f64 fuzz.
const RAMP_THRESHOLD: f64 = 0.001;

/// Shared, atomically updated master volume (linear).
#[derive(Clone)]
pub struct MasterVolume(Arc<AtomicU32>);

impl MasterVolume {
    fn new() -> Self {
        Self(Arc::new(AtomicU32::new(1.0f32.to_bits())))
    }

    pub fn set(&self, volume: f32) {
        self.0.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

struct AudioItem {
    tag:       Option<StreamTag>,
    transform: AudioTransform,
    frame:     ConstFrame,
}

pub struct AudioMixer {
    transform_stack: Vec<AudioTransform>,
    items:           Vec<AudioItem>,

    /// Cadence carryover per stream tag, swapped wholesale every tick so
    /// vanished sources drop their tails.
    audio_streams:    HashMap<StreamTag, Vec<i32>>,
    /// Last applied volume per tag, for ramp starts.
    previous_volumes: HashMap<StreamTag, f64>,

    format_desc:          Option<VideoFormatDesc>,
    channels:             usize,
    max_buffer_size:      usize,
    has_variable_cadence: bool,
    silence_frame:        Vec<i32>,

    master_volume: MasterVolume,
    state:         monitor::State,

    buffer_overflows: u64,
    clippings:        u64,
}

impl AudioMixer {
    pub fn new() -> Self {
        Self {
            transform_stack: vec![AudioTransform::default()],
            items: Vec::new(),
            audio_streams: HashMap::new(),
            previous_volumes: HashMap::new(),
            format_desc: None,
            channels: 0,
            max_buffer_size: 0,
            has_variable_cadence: false,
            silence_frame: Vec::new(),
            master_volume: MasterVolume::new(),
            state: monitor::State::new(),
            buffer_overflows: 0,
            clippings: 0,
        }
    }

    pub fn master_volume(&self) -> MasterVolume {
        self.master_volume.clone()
    }

    pub fn state(&self) -> monitor::State {
        self.state.clone()
    }

    pub fn buffer_overflow_count(&self) -> u64 {
        self.buffer_overflows
    }

    pub fn clipping_count(&self) -> u64 {
        self.clippings
    }

    fn on_format_change(&mut self, format: &VideoFormatDesc) {
        // Both maps go: a stale carryover would splice samples from the
        // old cadence, and a stale volume would restart a ramp mid-slope.
        self.audio_streams.clear();
        self.previous_volumes.clear();

        self.channels = format.audio_channels;
        let max_cadence = format.max_cadence_samples();
        self.max_buffer_size = if max_cadence > 0 {
            2 * max_cadence * self.channels
        } else {
            4000 * self.channels
        };
        self.has_variable_cadence = format.audio_cadence.len() > 1;
        self.silence_frame = vec![0; self.channels];
        self.format_desc = Some(format.clone());
    }

    /// Mix everything visited since the last call into one interleaved
    /// buffer of `nb_samples * channels` samples.
    pub fn mix(&mut self, format: &VideoFormatDesc, nb_samples: usize) -> Vec<i32> {
        if self.format_desc.as_ref() != Some(format) {
            self.on_format_change(format);
        }

        let items = std::mem::take(&mut self.items);
        let dst_size = nb_samples * self.channels;
        let mut mixed = vec![0.0f64; dst_size];

        let mut next_audio_streams: HashMap<StreamTag, Vec<i32>> = HashMap::new();
        let mut next_volumes: HashMap<StreamTag, f64> = HashMap::new();

        let samples_per_frame = nb_samples.max(1);

        for item in &items {
            let samples = item.frame.audio_data();
            let item_size = samples.len();
            if item_size == 0 {
                continue;
            }

            let volume = item.transform.volume;
            let immediate = item.transform.immediate_volume;

            let mut prev_volume = volume;
            if let Some(tag) = item.tag {
                next_volumes.insert(tag, volume);
                if let Some(&prev) = self.previous_volumes.get(&tag) {
                    prev_volume = prev;
                }
            }

            // Cadence carryover, silence-padded on first appearance.
            let leftover: &[i32] = if self.has_variable_cadence {
                match item.tag.and_then(|tag| self.audio_streams.get(&tag)) {
                    Some(buffer) => buffer,
                    None if item.tag.is_some() => &self.silence_frame,
                    None => &[],
                }
            } else {
                &[]
            };
            let last_size = leftover.len();

            let ramping = !immediate && (prev_volume - volume).abs() > RAMP_THRESHOLD;

            for (n, out) in mixed.iter_mut().enumerate() {
                let sample = if n < last_size {
                    leftover[n]
                } else if n < last_size + item_size {
                    samples[n - last_size]
                } else {
                    // Source under-delivered: repeat its final sample frame.
                    let channel_pos = n % self.channels;
                    let offset = item_size as isize - (self.channels - channel_pos) as isize;
                    let offset = if offset < 0 { channel_pos } else { offset as usize };
                    samples[offset.min(item_size - 1)]
                };

                let applied = if ramping {
                    let position =
                        ((n / self.channels) as f64 / samples_per_frame as f64).clamp(0.0, 1.0);
                    prev_volume + (volume - prev_volume) * position
                } else {
                    volume
                };

                *out += sample as f64 * applied;
            }

            if self.has_variable_cadence {
                if let Some(tag) = item.tag {
                    let consumed_from_item = dst_size.saturating_sub(last_size).min(item_size);
                    let tail = &samples[consumed_from_item..];
                    let cap = self.max_buffer_size.min(item_size);
                    let keep = if tail.len() > cap {
                        log::warn!(
                            "[audio] {}",
                            aircast_core::PlayoutError::BufferOverflow { got: tail.len(), cap }
                        );
                        self.buffer_overflows += 1;
                        &tail[..cap]
                    } else {
                        tail
                    };
                    next_audio_streams.insert(tag, keep.to_vec());
                }
            }
        }

        self.previous_volumes = next_volumes;
        self.audio_streams = next_audio_streams;

        let master = self.master_volume.get() as f64;
        let mut result = vec![0i32; dst_size];
        for (out, sample) in result.iter_mut().zip(mixed.iter()) {
            let scaled = sample * master;
            *out = if scaled >= i32::MAX as f64 {
                i32::MAX
            } else if scaled <= i32::MIN as f64 {
                i32::MIN
            } else {
                scaled as i32
            };
        }

        let mut peaks = vec![0i64; self.channels];
        if self.channels > 0 {
            for frame in result.chunks_exact(self.channels) {
                for (peak, &sample) in peaks.iter_mut().zip(frame) {
                    *peak = (*peak).max(sample.unsigned_abs() as i64);
                }
            }
        }
        if peaks.iter().any(|&p| p >= i32::MAX as i64) {
            log::warn!("[audio] output clipping");
            self.clippings += 1;
        }

        let mut state = monitor::State::new();
        state.insert_list("volume", peaks);
        self.state = state;

        result
    }
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameVisitor for AudioMixer {
    fn push(&mut self, transform: &FrameTransform) {
        let top = *self.transform_stack.last().expect("stack never empty");
        self.transform_stack.push(top.compose(&transform.audio));
    }

    fn visit(&mut self, frame: &ConstFrame) {
        let top = *self.transform_stack.last().expect("stack never empty");
        if top.volume < SILENCE_THRESHOLD || frame.audio_data().is_empty() {
            return;
        }
        self.items.push(AudioItem { tag: frame.stream_tag(), transform: top, frame: frame.clone() });
    }

    fn pop(&mut self) {
        self.transform_stack.pop();
    }
}
