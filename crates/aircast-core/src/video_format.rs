// crates/aircast-core/src/video_format.rs
//
// Video formats and audio cadences.
//
// A channel ticks once per output frame, which for interlaced formats is
// once per FIELD: `fps` is the tick rate (`hz * field_count`) and the
// cadence tables below are per tick, which is why the interlaced entries
// are the halved progressive patterns.
//
// A cadence is the cyclic list of samples-per-tick counts that realizes
// 48 kHz exactly against a fractional frame rate: 60000/1001 needs
// 800.8 samples per tick, so five ticks of {801, 800, 801, 801, 801}
// deliver exactly 4004.

use serde::{Deserialize, Serialize};

/// Which field a tick renders. Progressive formats only ever see
/// `Progressive`; interlaced channels alternate `A` and `B`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoField {
    Progressive,
    A,
    B,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoFormat {
    Pal,
    Ntsc,
    X576p2500,
    X720p2398,
    X720p2400,
    X720p2500,
    X720p2997,
    X720p3000,
    X720p5000,
    X720p5994,
    X720p6000,
    X1080i5000,
    X1080i5994,
    X1080i6000,
    X1080p2398,
    X1080p2400,
    X1080p2500,
    X1080p2997,
    X1080p3000,
    X1080p5000,
    X1080p5994,
    X1080p6000,
    X2160p2398,
    X2160p2400,
    X2160p2500,
    X2160p2997,
    X2160p3000,
    X2160p5000,
    X2160p5994,
    X2160p6000,
    Custom,
    Invalid,
}

pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoFormatDesc {
    pub format:        VideoFormat,
    pub field_count:   u32,
    pub width:         usize,
    pub height:        usize,
    pub square_width:  usize,
    pub square_height: usize,
    /// Framerate numerator (e.g. 60000).
    pub time_scale:    u32,
    /// Framerate denominator (e.g. 1001).
    pub duration:      u32,
    /// Full-frame rate in Hz.
    pub hz:            f64,
    /// Tick rate: `hz * field_count`.
    pub fps:           f64,
    /// Output byte size per tick (`width * height * 4`, BGRA).
    pub size:          usize,
    pub name:          String,
    pub audio_sample_rate: u32,
    pub audio_channels:    usize,
    /// Samples per tick, applied cyclically.
    pub audio_cadence: Vec<usize>,
}

impl VideoFormatDesc {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        format: VideoFormat,
        field_count: u32,
        width: usize,
        height: usize,
        square_width: usize,
        square_height: usize,
        time_scale: u32,
        duration: u32,
        name: &str,
        audio_cadence: Vec<usize>,
    ) -> Self {
        let hz = time_scale as f64 / duration as f64;
        Self {
            format,
            field_count,
            width,
            height,
            square_width,
            square_height,
            time_scale,
            duration,
            hz,
            fps: hz * field_count as f64,
            size: width * height * 4,
            name: name.to_owned(),
            audio_sample_rate: AUDIO_SAMPLE_RATE,
            audio_channels: 2,
            audio_cadence,
        }
    }

    /// A user-defined format; equality compares dimensions and framerate
    /// instead of the tag.
    pub fn custom(
        width: usize,
        height: usize,
        time_scale: u32,
        duration: u32,
        name: &str,
        audio_cadence: Vec<usize>,
    ) -> Self {
        Self::new(VideoFormat::Custom, 1, width, height, width, height, time_scale, duration, name, audio_cadence)
    }

    pub fn invalid() -> Self {
        Self::new(VideoFormat::Invalid, 1, 0, 0, 0, 0, 1, 1, "invalid", vec![1])
    }

    pub fn framerate(&self) -> (u32, u32) {
        (self.time_scale, self.duration)
    }

    pub fn is_valid(&self) -> bool {
        self.format != VideoFormat::Invalid
    }

    /// Largest cadence slot; sizes the audio mixer's carryover cap.
    pub fn max_cadence_samples(&self) -> usize {
        self.audio_cadence.iter().copied().max().unwrap_or(0)
    }
}

impl PartialEq for VideoFormatDesc {
    fn eq(&self, other: &Self) -> bool {
        if self.format == VideoFormat::Custom || other.format == VideoFormat::Custom {
            self.format == other.format
                && self.width == other.width
                && self.height == other.height
                && self.framerate() == other.framerate()
        } else {
            self.format == other.format
        }
    }
}

impl Eq for VideoFormatDesc {}

impl std::fmt::Display for VideoFormatDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The predefined format table plus any stored custom formats.
/// Lookup is by lower-cased name.
pub struct FormatRepository {
    formats: std::collections::BTreeMap<String, VideoFormatDesc>,
}

impl FormatRepository {
    pub fn new() -> Self {
        use VideoFormat::*;
        let defaults = vec![
            VideoFormatDesc::new(Pal, 2, 720, 576, 1024, 576, 25000, 1000, "PAL", vec![960]),
            VideoFormatDesc::new(
                Ntsc, 2, 720, 486, 720, 540, 30000, 1001, "NTSC",
                vec![801, 801, 801, 800, 801, 801, 801, 800, 801, 801],
            ),
            VideoFormatDesc::new(X576p2500, 1, 720, 576, 1024, 576, 25000, 1000, "576p2500", vec![1920]),
            VideoFormatDesc::new(X720p2398, 1, 1280, 720, 1280, 720, 24000, 1001, "720p2398", vec![2002]),
            VideoFormatDesc::new(X720p2400, 1, 1280, 720, 1280, 720, 24000, 1000, "720p2400", vec![2000]),
            VideoFormatDesc::new(X720p2500, 1, 1280, 720, 1280, 720, 25000, 1000, "720p2500", vec![1920]),
            VideoFormatDesc::new(
                X720p2997, 1, 1280, 720, 1280, 720, 30000, 1001, "720p2997",
                vec![1602, 1601, 1602, 1601, 1602],
            ),
            VideoFormatDesc::new(X720p3000, 1, 1280, 720, 1280, 720, 30000, 1000, "720p3000", vec![1600]),
            VideoFormatDesc::new(X720p5000, 1, 1280, 720, 1280, 720, 50000, 1000, "720p5000", vec![960]),
            VideoFormatDesc::new(
                X720p5994, 1, 1280, 720, 1280, 720, 60000, 1001, "720p5994",
                vec![801, 800, 801, 801, 801],
            ),
            VideoFormatDesc::new(X720p6000, 1, 1280, 720, 1280, 720, 60000, 1000, "720p6000", vec![800]),
            VideoFormatDesc::new(X1080i5000, 2, 1920, 1080, 1920, 1080, 25000, 1000, "1080i5000", vec![960]),
            VideoFormatDesc::new(
                X1080i5994, 2, 1920, 1080, 1920, 1080, 30000, 1001, "1080i5994",
                vec![801, 801, 801, 800, 801, 801, 801, 800, 801, 801],
            ),
            VideoFormatDesc::new(X1080i6000, 2, 1920, 1080, 1920, 1080, 30000, 1000, "1080i6000", vec![800]),
            VideoFormatDesc::new(X1080p2398, 1, 1920, 1080, 1920, 1080, 24000, 1001, "1080p2398", vec![2002]),
            VideoFormatDesc::new(X1080p2400, 1, 1920, 1080, 1920, 1080, 24000, 1000, "1080p2400", vec![2000]),
            VideoFormatDesc::new(X1080p2500, 1, 1920, 1080, 1920, 1080, 25000, 1000, "1080p2500", vec![1920]),
            VideoFormatDesc::new(
                X1080p2997, 1, 1920, 1080, 1920, 1080, 30000, 1001, "1080p2997",
                vec![1602, 1601, 1602, 1601, 1602],
            ),
            VideoFormatDesc::new(X1080p3000, 1, 1920, 1080, 1920, 1080, 30000, 1000, "1080p3000", vec![1600]),
            VideoFormatDesc::new(X1080p5000, 1, 1920, 1080, 1920, 1080, 50000, 1000, "1080p5000", vec![960]),
            VideoFormatDesc::new(
                X1080p5994, 1, 1920, 1080, 1920, 1080, 60000, 1001, "1080p5994",
                vec![801, 800, 801, 801, 801],
            ),
            VideoFormatDesc::new(X1080p6000, 1, 1920, 1080, 1920, 1080, 60000, 1000, "1080p6000", vec![800]),
            VideoFormatDesc::new(X2160p2398, 1, 3840, 2160, 3840, 2160, 24000, 1001, "2160p2398", vec![2002]),
            VideoFormatDesc::new(X2160p2400, 1, 3840, 2160, 3840, 2160, 24000, 1000, "2160p2400", vec![2000]),
            VideoFormatDesc::new(X2160p2500, 1, 3840, 2160, 3840, 2160, 25000, 1000, "2160p2500", vec![1920]),
            VideoFormatDesc::new(
                X2160p2997, 1, 3840, 2160, 3840, 2160, 30000, 1001, "2160p2997",
                vec![1602, 1601, 1602, 1601, 1602],
            ),
            VideoFormatDesc::new(X2160p3000, 1, 3840, 2160, 3840, 2160, 30000, 1000, "2160p3000", vec![1600]),
            VideoFormatDesc::new(X2160p5000, 1, 3840, 2160, 3840, 2160, 50000, 1000, "2160p5000", vec![960]),
            VideoFormatDesc::new(
                X2160p5994, 1, 3840, 2160, 3840, 2160, 60000, 1001, "2160p5994",
                vec![801, 800, 801, 801, 801],
            ),
            VideoFormatDesc::new(X2160p6000, 1, 3840, 2160, 3840, 2160, 60000, 1000, "2160p6000", vec![800]),
        ];

        let mut formats = std::collections::BTreeMap::new();
        for f in defaults {
            formats.insert(f.name.to_lowercase(), f);
        }
        Self { formats }
    }

    /// Case-insensitive lookup; the invalid descriptor when unknown.
    pub fn find(&self, name: &str) -> VideoFormatDesc {
        self.formats
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(VideoFormatDesc::invalid)
    }

    /// Like `find`, but an unknown name is an error, for control paths
    /// where a typo must not silently become the invalid format.
    pub fn require(&self, name: &str) -> crate::error::Result<VideoFormatDesc> {
        let desc = self.find(name);
        if desc.is_valid() {
            Ok(desc)
        } else {
            Err(crate::error::PlayoutError::InvalidArgument(format!("unknown video format {name:?}")))
        }
    }

    pub fn find_format(&self, format: VideoFormat) -> VideoFormatDesc {
        self.formats
            .values()
            .find(|f| f.format == format)
            .cloned()
            .unwrap_or_else(VideoFormatDesc::invalid)
    }

    /// Register a custom format for later lookup by name.
    pub fn store(&mut self, format: VideoFormatDesc) {
        self.formats.insert(format.name.to_lowercase(), format);
    }

    /// Largest output frame size across all known formats.
    pub fn max_frame_size(&self) -> usize {
        self.formats.values().map(|f| f.size).max().unwrap_or(0)
    }
}

impl Default for FormatRepository {
    fn default() -> Self {
        Self::new()
    }
}
