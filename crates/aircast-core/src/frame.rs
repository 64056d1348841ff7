// crates/aircast-core/src/frame.rs
//
// Frame buffers.
//
// `MutableFrame` is the writable side: a producer asks the frame factory
// for one, fills its planes and audio, then freezes it into a `ConstFrame`.
// Freezing runs the factory's `commit` hook (GPU upload) and stashes the
// returned opaque handle. `ConstFrame` is immutable and reference-counted;
// equality is identity of the shared inner, not content.

use std::any::Any;
use std::sync::Arc;

use uuid::Uuid;

use crate::geometry::FrameGeometry;
use crate::pixel_format::PixelFormatDesc;

/// Identity of a producer's sample stream.
///
/// The audio mixer keys cadence carryover and volume memory by this tag,
/// so a producer must reuse one tag for the lifetime of its stream and a
/// re-routed copy of a frame must carry a different one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamTag(Uuid);

impl StreamTag {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Runs when a mutable frame freezes; returns the opaque (GPU) handle.
pub type CommitFn = Box<dyn FnOnce(&[Vec<u8>]) -> Box<dyn Any + Send + Sync> + Send>;

pub struct MutableFrame {
    tag:        StreamTag,
    image_data: Vec<Vec<u8>>,
    audio_data: Vec<i32>,
    desc:       PixelFormatDesc,
    geometry:   FrameGeometry,
    commit:     Option<CommitFn>,
}

impl MutableFrame {
    pub fn new(
        tag: StreamTag,
        image_data: Vec<Vec<u8>>,
        audio_data: Vec<i32>,
        desc: PixelFormatDesc,
        commit: Option<CommitFn>,
    ) -> Self {
        Self { tag, image_data, audio_data, desc, geometry: FrameGeometry::default(), commit }
    }

    /// Allocate zeroed planes sized per `desc`.
    pub fn with_blank_planes(tag: StreamTag, desc: PixelFormatDesc) -> Self {
        let planes = desc.planes.iter().map(|p| vec![0u8; p.size]).collect();
        Self::new(tag, planes, Vec::new(), desc, None)
    }

    pub fn stream_tag(&self) -> StreamTag {
        self.tag
    }

    pub fn pixel_format_desc(&self) -> &PixelFormatDesc {
        &self.desc
    }

    pub fn image_data(&self, plane: usize) -> &[u8] {
        &self.image_data[plane]
    }

    pub fn image_data_mut(&mut self, plane: usize) -> &mut Vec<u8> {
        &mut self.image_data[plane]
    }

    pub fn audio_data(&self) -> &[i32] {
        &self.audio_data
    }

    pub fn audio_data_mut(&mut self) -> &mut Vec<i32> {
        &mut self.audio_data
    }

    pub fn width(&self) -> usize {
        self.desc.planes.first().map_or(0, |p| p.width)
    }

    pub fn height(&self) -> usize {
        self.desc.planes.first().map_or(0, |p| p.height)
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    pub fn set_geometry(&mut self, geometry: FrameGeometry) {
        self.geometry = geometry;
    }
}

struct Inner {
    tag:        Option<StreamTag>,
    image_data: Vec<Arc<Vec<u8>>>,
    audio_data: Arc<Vec<i32>>,
    desc:       PixelFormatDesc,
    geometry:   FrameGeometry,
    opaque:     Option<Box<dyn Any + Send + Sync>>,
}

/// Immutable, reference-counted frame.
///
/// Cloning is an `Arc` bump. A default `ConstFrame` is the empty frame:
/// `is_valid()` is false and it compares equal to every other default.
#[derive(Clone, Default)]
pub struct ConstFrame {
    inner: Option<Arc<Inner>>,
}

impl ConstFrame {
    /// Construct from read-only buffers. No stream tag; use `with_tag` if
    /// the audio needs cadence bookkeeping.
    pub fn new(image_data: Vec<Vec<u8>>, audio_data: Vec<i32>, desc: PixelFormatDesc) -> Self {
        Self {
            inner: Some(Arc::new(Inner {
                tag:        None,
                image_data: image_data.into_iter().map(Arc::new).collect(),
                audio_data: Arc::new(audio_data),
                desc,
                geometry:   FrameGeometry::default(),
                opaque:     None,
            })),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.as_ref().is_some_and(|i| i.desc.is_valid())
    }

    pub fn stream_tag(&self) -> Option<StreamTag> {
        self.inner.as_ref().and_then(|i| i.tag)
    }

    /// Share the pixel and audio buffers under a new stream tag.
    ///
    /// The result is a distinct frame identity (equality is by inner
    /// pointer), which is exactly what a route wants: same pixels, its own
    /// audio stream.
    pub fn with_tag(&self, tag: StreamTag) -> Self {
        match &self.inner {
            None => Self::default(),
            Some(inner) => Self {
                inner: Some(Arc::new(Inner {
                    tag:        Some(tag),
                    image_data: inner.image_data.clone(),
                    audio_data: inner.audio_data.clone(),
                    desc:       inner.desc.clone(),
                    geometry:   inner.geometry.clone(),
                    opaque:     None,
                })),
            },
        }
    }

    pub fn pixel_format_desc(&self) -> Option<&PixelFormatDesc> {
        self.inner.as_ref().map(|i| &i.desc)
    }

    pub fn image_data(&self, plane: usize) -> Option<&[u8]> {
        self.inner
            .as_ref()
            .and_then(|i| i.image_data.get(plane))
            .map(|p| p.as_slice())
    }

    /// Interleaved i32 samples; empty when the frame carries no audio.
    pub fn audio_data(&self) -> &[i32] {
        self.inner.as_ref().map_or(&[], |i| i.audio_data.as_slice())
    }

    pub fn width(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|i| i.desc.planes.first())
            .map_or(0, |p| p.width)
    }

    pub fn height(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|i| i.desc.planes.first())
            .map_or(0, |p| p.height)
    }

    /// Byte size of plane 0, what consumers validate against the format.
    pub fn size(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|i| i.desc.planes.first())
            .map_or(0, |p| p.size)
    }

    pub fn geometry(&self) -> Option<&FrameGeometry> {
        self.inner.as_ref().map(|i| &i.geometry)
    }

    /// Handle returned by the commit hook at freeze time (GPU texture etc.).
    pub fn opaque(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.inner.as_ref().and_then(|i| i.opaque.as_deref())
    }
}

impl From<MutableFrame> for ConstFrame {
    fn from(mut frame: MutableFrame) -> Self {
        let opaque = frame.commit.take().map(|commit| commit(&frame.image_data));
        Self {
            inner: Some(Arc::new(Inner {
                tag:        Some(frame.tag),
                image_data: frame.image_data.into_iter().map(Arc::new).collect(),
                audio_data: Arc::new(frame.audio_data),
                desc:       frame.desc,
                geometry:   frame.geometry,
                opaque,
            })),
        }
    }
}

impl PartialEq for ConstFrame {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for ConstFrame {}

impl PartialOrd for ConstFrame {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConstFrame {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let addr = |f: &Self| f.inner.as_ref().map_or(0usize, |i| Arc::as_ptr(i) as usize);
        addr(self).cmp(&addr(other))
    }
}

impl std::fmt::Debug for ConstFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstFrame")
            .field("valid", &self.is_valid())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("audio_samples", &self.audio_data().len())
            .finish()
    }
}
