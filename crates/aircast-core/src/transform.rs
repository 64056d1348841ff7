// crates/aircast-core/src/transform.rs
//
// Frame transforms: what a node in the draw-frame tree does to everything
// beneath it.
//
// Composition (`*`) folds a child transform into its parent's coordinate
// space — translations are scaled by the parent's scale, numeric gains
// multiply, sticky flags OR. Tweening interpolates every numeric field
// through an easing curve; flags and enums snap per the rules documented
// on each field.
//
// Float equality uses a 5e-8 epsilon throughout: transforms travel through
// repeated f64 interpolation and exact comparison would flag noise.

use serde::{Deserialize, Serialize};

use crate::easing::Ease;

const EPS: f64 = 5e-8;

#[inline]
fn eq(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() < EPS
}

// ── Blend modes ───────────────────────────────────────────────────────────────

/// Declaration order doubles as severity order: composing two nodes keeps
/// the `max` of their blend modes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BlendMode {
    #[default]
    Normal,
    Lighten,
    Darken,
    Multiply,
    Average,
    Add,
    Subtract,
    Difference,
    Negation,
    Exclusion,
    Screen,
    Overlay,
    SoftLight,
    HardLight,
    ColorDodge,
    ColorBurn,
    LinearDodge,
    LinearBurn,
    LinearLight,
    VividLight,
    PinLight,
    HardMix,
    Reflect,
    Glow,
    Phoenix,
    Contrast,
    Saturation,
    Color,
    Luminosity,
}

// ── Image transform sub-structs ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Chroma {
    pub enable:                    bool,
    pub show_mask:                 bool,
    pub target_hue:                f64,
    pub hue_width:                 f64,
    pub min_saturation:            f64,
    pub min_brightness:            f64,
    pub softness:                  f64,
    pub spill_suppress:            f64,
    pub spill_suppress_saturation: f64,
}

impl Default for Chroma {
    fn default() -> Self {
        Self {
            enable:                    false,
            show_mask:                 false,
            target_hue:                0.0,
            hue_width:                 0.0,
            min_saturation:            0.0,
            min_brightness:            0.0,
            softness:                  0.0,
            spill_suppress:            0.0,
            spill_suppress_saturation: 1.0,
        }
    }
}

impl PartialEq for Chroma {
    fn eq(&self, other: &Self) -> bool {
        self.enable == other.enable
            && self.show_mask == other.show_mask
            && eq(self.target_hue, other.target_hue)
            && eq(self.hue_width, other.hue_width)
            && eq(self.min_saturation, other.min_saturation)
            && eq(self.min_brightness, other.min_brightness)
            && eq(self.softness, other.softness)
            && eq(self.spill_suppress, other.spill_suppress)
            && eq(self.spill_suppress_saturation, other.spill_suppress_saturation)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Levels {
    pub min_input:  f64,
    pub max_input:  f64,
    pub gamma:      f64,
    pub min_output: f64,
    pub max_output: f64,
}

impl Default for Levels {
    fn default() -> Self {
        Self { min_input: 0.0, max_input: 1.0, gamma: 1.0, min_output: 0.0, max_output: 1.0 }
    }
}

impl PartialEq for Levels {
    fn eq(&self, other: &Self) -> bool {
        eq(self.min_input, other.min_input)
            && eq(self.max_input, other.max_input)
            && eq(self.gamma, other.gamma)
            && eq(self.min_output, other.min_output)
            && eq(self.max_output, other.max_output)
    }
}

/// Axis-aligned sub-rectangle in unit space.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Rect {
    pub ul: [f64; 2],
    pub lr: [f64; 2],
}

impl Default for Rect {
    fn default() -> Self {
        Self { ul: [0.0, 0.0], lr: [1.0, 1.0] }
    }
}

impl PartialEq for Rect {
    fn eq(&self, other: &Self) -> bool {
        eq(self.ul[0], other.ul[0])
            && eq(self.ul[1], other.ul[1])
            && eq(self.lr[0], other.lr[0])
            && eq(self.lr[1], other.lr[1])
    }
}

/// Free quadrilateral in unit space. Order: ul, ur, lr, ll.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Corners {
    pub ul: [f64; 2],
    pub ur: [f64; 2],
    pub lr: [f64; 2],
    pub ll: [f64; 2],
}

impl Default for Corners {
    fn default() -> Self {
        Self { ul: [0.0, 0.0], ur: [1.0, 0.0], lr: [1.0, 1.0], ll: [0.0, 1.0] }
    }
}

impl PartialEq for Corners {
    fn eq(&self, other: &Self) -> bool {
        let pt = |a: [f64; 2], b: [f64; 2]| eq(a[0], b[0]) && eq(a[1], b[1]);
        pt(self.ul, other.ul) && pt(self.ur, other.ur) && pt(self.lr, other.lr) && pt(self.ll, other.ll)
    }
}

impl Corners {
    /// Bilinear map of a unit-space point into this quad.
    fn map(&self, p: [f64; 2]) -> [f64; 2] {
        let (x, y) = (p[0], p[1]);
        let lerp2 = |a: [f64; 2], b: [f64; 2], t: f64| [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t];
        let top = lerp2(self.ul, self.ur, x);
        let bot = lerp2(self.ll, self.lr, x);
        lerp2(top, bot, y)
    }
}

// ── Image transform ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ImageTransform {
    pub opacity:    f64,
    pub contrast:   f64,
    pub brightness: f64,
    pub saturation: f64,

    pub anchor:           [f64; 2],
    pub fill_translation: [f64; 2],
    pub fill_scale:       [f64; 2],
    pub clip_translation: [f64; 2],
    pub clip_scale:       [f64; 2],
    pub angle:            f64,
    pub crop:             Rect,
    pub perspective:      Corners,
    pub levels:           Levels,
    pub chroma:           Chroma,

    pub is_key:      bool,
    pub invert:      bool,
    pub is_mix:      bool,
    pub blend_mode:  BlendMode,
    pub layer_depth: i32,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            opacity:          1.0,
            contrast:         1.0,
            brightness:       1.0,
            saturation:       1.0,
            anchor:           [0.0, 0.0],
            fill_translation: [0.0, 0.0],
            fill_scale:       [1.0, 1.0],
            clip_translation: [0.0, 0.0],
            clip_scale:       [1.0, 1.0],
            angle:            0.0,
            crop:             Rect::default(),
            perspective:      Corners::default(),
            levels:           Levels::default(),
            chroma:           Chroma::default(),
            is_key:           false,
            invert:           false,
            is_mix:           false,
            blend_mode:       BlendMode::Normal,
            layer_depth:      0,
        }
    }
}

impl ImageTransform {
    /// Fold `child` into this transform's coordinate space.
    pub fn compose(&self, child: &ImageTransform) -> ImageTransform {
        let mut out = *self;

        out.opacity *= child.opacity;
        out.brightness *= child.brightness;
        out.contrast *= child.contrast;
        out.saturation *= child.saturation;

        out.anchor[0] += child.anchor[0] * self.fill_scale[0];
        out.anchor[1] += child.anchor[1] * self.fill_scale[1];
        out.fill_translation[0] += child.fill_translation[0] * self.fill_scale[0];
        out.fill_translation[1] += child.fill_translation[1] * self.fill_scale[1];
        out.fill_scale[0] *= child.fill_scale[0];
        out.fill_scale[1] *= child.fill_scale[1];
        out.clip_translation[0] += child.clip_translation[0] * self.clip_scale[0];
        out.clip_translation[1] += child.clip_translation[1] * self.clip_scale[1];
        out.clip_scale[0] *= child.clip_scale[0];
        out.clip_scale[1] *= child.clip_scale[1];
        out.angle += child.angle;

        // Nest the child's crop within the parent's.
        let span = [self.crop.lr[0] - self.crop.ul[0], self.crop.lr[1] - self.crop.ul[1]];
        out.crop.ul = [
            self.crop.ul[0] + child.crop.ul[0] * span[0],
            self.crop.ul[1] + child.crop.ul[1] * span[1],
        ];
        out.crop.lr = [
            self.crop.ul[0] + child.crop.lr[0] * span[0],
            self.crop.ul[1] + child.crop.lr[1] * span[1],
        ];

        out.perspective = Corners {
            ul: self.perspective.map(child.perspective.ul),
            ur: self.perspective.map(child.perspective.ur),
            lr: self.perspective.map(child.perspective.lr),
            ll: self.perspective.map(child.perspective.ll),
        };

        out.levels.min_input = self.levels.min_input.max(child.levels.min_input);
        out.levels.max_input = self.levels.max_input.min(child.levels.max_input);
        out.levels.min_output = self.levels.min_output.max(child.levels.min_output);
        out.levels.max_output = self.levels.max_output.min(child.levels.max_output);
        out.levels.gamma *= child.levels.gamma;

        if child.chroma.enable {
            out.chroma = child.chroma;
        }

        out.is_key |= child.is_key;
        out.invert |= child.invert;
        out.is_mix |= child.is_mix;
        out.blend_mode = self.blend_mode.max(child.blend_mode);
        out.layer_depth += child.layer_depth;

        out
    }

    pub fn tween(time: f64, source: &Self, dest: &Self, duration: f64, ease: Ease) -> Self {
        let tw = |s: f64, d: f64| ease.tween(time, s, d, duration);
        let tw2 = |s: [f64; 2], d: [f64; 2]| [tw(s[0], d[0]), tw(s[1], d[1])];

        Self {
            opacity:          tw(source.opacity, dest.opacity),
            contrast:         tw(source.contrast, dest.contrast),
            brightness:       tw(source.brightness, dest.brightness),
            saturation:       tw(source.saturation, dest.saturation),
            anchor:           tw2(source.anchor, dest.anchor),
            fill_translation: tw2(source.fill_translation, dest.fill_translation),
            fill_scale:       tw2(source.fill_scale, dest.fill_scale),
            clip_translation: tw2(source.clip_translation, dest.clip_translation),
            clip_scale:       tw2(source.clip_scale, dest.clip_scale),
            angle:            tw(source.angle, dest.angle),
            crop: Rect {
                ul: tw2(source.crop.ul, dest.crop.ul),
                lr: tw2(source.crop.lr, dest.crop.lr),
            },
            perspective: Corners {
                ul: tw2(source.perspective.ul, dest.perspective.ul),
                ur: tw2(source.perspective.ur, dest.perspective.ur),
                lr: tw2(source.perspective.lr, dest.perspective.lr),
                ll: tw2(source.perspective.ll, dest.perspective.ll),
            },
            levels: Levels {
                min_input:  tw(source.levels.min_input, dest.levels.min_input),
                max_input:  tw(source.levels.max_input, dest.levels.max_input),
                gamma:      tw(source.levels.gamma, dest.levels.gamma),
                min_output: tw(source.levels.min_output, dest.levels.min_output),
                max_output: tw(source.levels.max_output, dest.levels.max_output),
            },
            chroma: Chroma {
                enable:                    dest.chroma.enable,
                show_mask:                 dest.chroma.show_mask,
                target_hue:                tw(source.chroma.target_hue, dest.chroma.target_hue),
                hue_width:                 tw(source.chroma.hue_width, dest.chroma.hue_width),
                min_saturation:            tw(source.chroma.min_saturation, dest.chroma.min_saturation),
                min_brightness:            tw(source.chroma.min_brightness, dest.chroma.min_brightness),
                softness:                  tw(source.chroma.softness, dest.chroma.softness),
                spill_suppress:            tw(source.chroma.spill_suppress, dest.chroma.spill_suppress),
                spill_suppress_saturation: tw(
                    source.chroma.spill_suppress_saturation,
                    dest.chroma.spill_suppress_saturation,
                ),
            },
            is_key:      source.is_key || dest.is_key,
            invert:      source.invert || dest.invert,
            is_mix:      source.is_mix || dest.is_mix,
            blend_mode:  source.blend_mode.max(dest.blend_mode),
            layer_depth: dest.layer_depth,
        }
    }
}

impl PartialEq for ImageTransform {
    fn eq(&self, other: &Self) -> bool {
        let pt = |a: [f64; 2], b: [f64; 2]| eq(a[0], b[0]) && eq(a[1], b[1]);
        eq(self.opacity, other.opacity)
            && eq(self.contrast, other.contrast)
            && eq(self.brightness, other.brightness)
            && eq(self.saturation, other.saturation)
            && pt(self.anchor, other.anchor)
            && pt(self.fill_translation, other.fill_translation)
            && pt(self.fill_scale, other.fill_scale)
            && pt(self.clip_translation, other.clip_translation)
            && pt(self.clip_scale, other.clip_scale)
            && eq(self.angle, other.angle)
            && self.crop == other.crop
            && self.perspective == other.perspective
            && self.levels == other.levels
            && self.chroma == other.chroma
            && self.is_key == other.is_key
            && self.invert == other.invert
            && self.is_mix == other.is_mix
            && self.blend_mode == other.blend_mode
            && self.layer_depth == other.layer_depth
    }
}

impl std::ops::Mul for ImageTransform {
    type Output = ImageTransform;
    fn mul(self, rhs: Self) -> Self {
        self.compose(&rhs)
    }
}

// ── Audio transform ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AudioTransform {
    /// Linear gain.
    pub volume: f64,
    /// Skip the per-frame ramp and apply `volume` from the first sample.
    pub immediate_volume: bool,
}

impl Default for AudioTransform {
    fn default() -> Self {
        Self { volume: 1.0, immediate_volume: false }
    }
}

impl AudioTransform {
    pub fn compose(&self, child: &AudioTransform) -> AudioTransform {
        AudioTransform {
            volume:           self.volume * child.volume,
            immediate_volume: self.immediate_volume || child.immediate_volume,
        }
    }

    pub fn tween(time: f64, source: &Self, dest: &Self, duration: f64, ease: Ease) -> Self {
        Self {
            volume:           ease.tween(time, source.volume, dest.volume, duration),
            immediate_volume: dest.immediate_volume,
        }
    }
}

impl PartialEq for AudioTransform {
    fn eq(&self, other: &Self) -> bool {
        eq(self.volume, other.volume) && self.immediate_volume == other.immediate_volume
    }
}

impl std::ops::Mul for AudioTransform {
    type Output = AudioTransform;
    fn mul(self, rhs: Self) -> Self {
        self.compose(&rhs)
    }
}

// ── Side-data transform ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideDataTransform {
    pub use_closed_captions: bool,
}

impl Default for SideDataTransform {
    fn default() -> Self {
        Self { use_closed_captions: true }
    }
}

impl SideDataTransform {
    pub fn compose(&self, child: &SideDataTransform) -> SideDataTransform {
        SideDataTransform { use_closed_captions: self.use_closed_captions && child.use_closed_captions }
    }

    pub fn tween(_time: f64, _source: &Self, dest: &Self, _duration: f64, _ease: Ease) -> Self {
        *dest
    }
}

// ── Frame transform ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTransform {
    pub image:     ImageTransform,
    pub audio:     AudioTransform,
    pub side_data: SideDataTransform,
}

impl FrameTransform {
    pub fn compose(&self, child: &FrameTransform) -> FrameTransform {
        FrameTransform {
            image:     self.image.compose(&child.image),
            audio:     self.audio.compose(&child.audio),
            side_data: self.side_data.compose(&child.side_data),
        }
    }

    pub fn tween(time: f64, source: &Self, dest: &Self, duration: f64, ease: Ease) -> Self {
        Self {
            image:     ImageTransform::tween(time, &source.image, &dest.image, duration, ease),
            audio:     AudioTransform::tween(time, &source.audio, &dest.audio, duration, ease),
            side_data: SideDataTransform::tween(time, &source.side_data, &dest.side_data, duration, ease),
        }
    }
}

impl std::ops::Mul for FrameTransform {
    type Output = FrameTransform;
    fn mul(self, rhs: Self) -> Self {
        self.compose(&rhs)
    }
}

// ── Tweened transform ─────────────────────────────────────────────────────────

/// A transform animating from `source` to `dest` over `duration` frames.
#[derive(Clone, Debug, Default)]
pub struct TweenedTransform {
    source:   FrameTransform,
    dest:     FrameTransform,
    duration: u32,
    time:     u32,
    ease:     Ease,
}

impl TweenedTransform {
    pub fn new(source: FrameTransform, dest: FrameTransform, duration: u32, ease: Ease) -> Self {
        Self { source, dest, duration, time: 0, ease }
    }

    pub fn dest(&self) -> &FrameTransform {
        &self.dest
    }

    /// Current transform: `dest` once the animation has run out, the eased
    /// interpolation otherwise.
    pub fn fetch(&self) -> FrameTransform {
        if self.time == self.duration {
            self.dest
        } else {
            FrameTransform::tween(
                self.time as f64,
                &self.source,
                &self.dest,
                self.duration as f64,
                self.ease,
            )
        }
    }

    /// Advance by `num` frames, saturating at the end.
    pub fn tick(&mut self, num: u32) {
        self.time = (self.time + num).min(self.duration);
    }
}
