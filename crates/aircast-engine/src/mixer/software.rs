// crates/aircast-engine/src/mixer/software.rs
//
// Software reference compositor.
//
// Implements the subset of the transform model the engine's own machinery
// produces: fill translate/scale with anchor, clip rectangles, source
// crop, opacity, brightness, additive `is_mix` blending, and luminance
// keying with inversion. Color-science fields (levels, chroma, saturation,
// contrast) are the province of accelerated backends.
//
// Keying follows the draw order contract: a frame marked `is_key` is not
// drawn — its luminance becomes the alpha mask for the next non-key frame.
//
// Rows composite in parallel; items stay strictly in visit order.

use aircast_core::{
    ConstFrame, FrameTransform, ImageTransform, MutableFrame, PixelFormat, PixelFormatDesc,
    StreamTag, VideoFormatDesc,
};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::mixer::image::{FrameFactory, ImageMixer};
use crate::sync::{ready, Reply};

struct Item {
    transform: ImageTransform,
    frame:     ConstFrame,
}

#[derive(Default)]
struct VisitState {
    stack: Vec<FrameTransform>,
    items: Vec<Item>,
}

pub struct SoftwareImageMixer {
    state: Mutex<VisitState>,
}

impl SoftwareImageMixer {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self { state: Mutex::new(VisitState::default()) }
    }
}

impl FrameFactory for SoftwareImageMixer {
    fn create_frame(&self, tag: StreamTag, desc: &PixelFormatDesc) -> MutableFrame {
        // Planes stay in main memory; nothing to commit.
        MutableFrame::with_blank_planes(tag, desc.clone())
    }
}

impl ImageMixer for SoftwareImageMixer {
    fn push(&self, transform: &FrameTransform) {
        let mut state = self.state.lock();
        let top = state.stack.last().copied().unwrap_or_default();
        state.stack.push(top.compose(transform));
    }

    fn visit(&self, frame: &ConstFrame) {
        let mut state = self.state.lock();
        let Some(top) = state.stack.last().copied() else { return };
        if !frame.is_valid() {
            return;
        }
        state.items.push(Item { transform: top.image, frame: frame.clone() });
    }

    fn pop(&self) {
        self.state.lock().stack.pop();
    }

    fn render(&self, format: &VideoFormatDesc) -> Reply<Vec<u8>> {
        let items = std::mem::take(&mut self.state.lock().items);
        ready(composite(items, format.width, format.height))
    }
}

// ── Compositing ───────────────────────────────────────────────────────────────

/// f32 RGBA working canvas, one row per rayon task.
fn composite(items: Vec<Item>, width: usize, height: usize) -> Vec<u8> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let mut canvas = vec![0.0f32; width * height * 4];
    let mut pending_key: Option<Vec<f32>> = None;

    for item in &items {
        let Some(source) = Source::from_frame(&item.frame) else { continue };

        if item.transform.is_key {
            let mut mask = vec![0.0f32; width * height];
            rasterize_key(&mut mask, &source, &item.transform, width, height);
            pending_key = Some(mask);
            continue;
        }

        let key = pending_key.take();
        draw(&mut canvas, &source, &item.transform, key.as_deref(), width, height);
    }

    canvas
        .chunks_exact(4)
        .flat_map(|px| {
            let a = px[3].clamp(0.0, 1.0);
            [
                (px[0].clamp(0.0, 1.0) * 255.0).round() as u8,
                (px[1].clamp(0.0, 1.0) * 255.0).round() as u8,
                (px[2].clamp(0.0, 1.0) * 255.0).round() as u8,
                (a * 255.0).round() as u8,
            ]
        })
        .collect()
}

struct Source<'a> {
    data:   &'a [u8],
    width:  usize,
    height: usize,
}

impl<'a> Source<'a> {
    fn from_frame(frame: &'a ConstFrame) -> Option<Self> {
        let desc = frame.pixel_format_desc()?;
        if desc.format != PixelFormat::Bgra {
            log::warn!("[mixer] software path only composites BGRA, got {:?}", desc.format);
            return None;
        }
        let plane = desc.planes.first()?;
        Some(Self { data: frame.image_data(0)?, width: plane.width, height: plane.height })
    }

    /// Nearest-neighbour sample at unit coordinates, BGRA scaled to [0, 1].
    fn sample(&self, u: f64, v: f64) -> [f32; 4] {
        let x = ((u * self.width as f64) as usize).min(self.width - 1);
        let y = ((v * self.height as f64) as usize).min(self.height - 1);
        let px = &self.data[(y * self.width + x) * 4..][..4];
        [
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
            px[3] as f32 / 255.0,
        ]
    }
}

struct Placement {
    x0: f64,
    y0: f64,
    w:  f64,
    h:  f64,
    clip_x0: f64,
    clip_y0: f64,
    clip_x1: f64,
    clip_y1: f64,
}

impl Placement {
    fn new(t: &ImageTransform, width: usize, height: usize) -> Self {
        let (cw, ch) = (width as f64, height as f64);
        Self {
            x0: (t.fill_translation[0] - t.anchor[0] * t.fill_scale[0]) * cw,
            y0: (t.fill_translation[1] - t.anchor[1] * t.fill_scale[1]) * ch,
            w:  t.fill_scale[0] * cw,
            h:  t.fill_scale[1] * ch,
            clip_x0: t.clip_translation[0] * cw,
            clip_y0: t.clip_translation[1] * ch,
            clip_x1: (t.clip_translation[0] + t.clip_scale[0]) * cw,
            clip_y1: (t.clip_translation[1] + t.clip_scale[1]) * ch,
        }
    }

    /// Unit source coordinates for canvas pixel center (x, y); `None`
    /// when the pixel is outside the fill, the clip, or the crop.
    fn source_uv(&self, t: &ImageTransform, x: usize, y: usize) -> Option<(f64, f64)> {
        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
        if px < self.clip_x0 || px >= self.clip_x1 || py < self.clip_y0 || py >= self.clip_y1 {
            return None;
        }
        if self.w <= 0.0 || self.h <= 0.0 {
            return None;
        }
        let u = (px - self.x0) / self.w;
        let v = (py - self.y0) / self.h;
        if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
            return None;
        }
        if u < t.crop.ul[0] || u > t.crop.lr[0] || v < t.crop.ul[1] || v > t.crop.lr[1] {
            return None;
        }
        Some((u, v))
    }
}

fn draw(
    canvas: &mut [f32],
    source: &Source,
    t: &ImageTransform,
    key: Option<&[f32]>,
    width: usize,
    height: usize,
) {
    let placement = Placement::new(t, width, height);
    let opacity = t.opacity.clamp(0.0, 1.0) as f32;
    if opacity <= 0.0 {
        return;
    }
    let brightness = t.brightness as f32;

    canvas
        .par_chunks_exact_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            if y >= height {
                return;
            }
            for x in 0..width {
                let Some((u, v)) = placement.source_uv(t, x, y) else { continue };
                let src = source.sample(u, v);

                let mut alpha = src[3] * opacity;
                if let Some(key) = key {
                    alpha *= key[y * width + x];
                }
                if alpha <= 0.0 {
                    continue;
                }

                let px = &mut row[x * 4..][..4];
                let rgb = [src[0] * brightness, src[1] * brightness, src[2] * brightness];
                if t.is_mix {
                    // Transition premix: plain weighted accumulation.
                    px[0] += rgb[0] * alpha;
                    px[1] += rgb[1] * alpha;
                    px[2] += rgb[2] * alpha;
                    px[3] += alpha;
                } else {
                    px[0] = rgb[0] * alpha + px[0] * (1.0 - alpha);
                    px[1] = rgb[1] * alpha + px[1] * (1.0 - alpha);
                    px[2] = rgb[2] * alpha + px[2] * (1.0 - alpha);
                    px[3] = alpha + px[3] * (1.0 - alpha);
                }
            }
        });
}

/// Rasterize a key frame into a full-canvas alpha mask: luminance times
/// the frame's own alpha and opacity, inverted when requested. Pixels the
/// key does not cover mask to zero (or one when inverted).
fn rasterize_key(mask: &mut [f32], source: &Source, t: &ImageTransform, width: usize, height: usize) {
    let placement = Placement::new(t, width, height);
    let opacity = t.opacity.clamp(0.0, 1.0) as f32;

    mask.par_chunks_exact_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let value = match placement.source_uv(t, x, y) {
                    Some((u, v)) => {
                        let px = source.sample(u, v);
                        // BGRA: Rec.601 luma from R, G, B.
                        let luma = 0.299 * px[2] + 0.587 * px[1] + 0.114 * px[0];
                        luma * px[3] * opacity
                    }
                    None => 0.0,
                };
                *out = if t.invert { 1.0 - value } else { value };
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircast_core::DrawFrame;

    use crate::mixer::image::ImageMixerVisitor;

    fn format_4x4() -> VideoFormatDesc {
        VideoFormatDesc::custom(4, 4, 25000, 1000, "4x4", vec![1920])
    }

    fn solid(bgra: [u8; 4]) -> DrawFrame {
        let pixels = bgra.repeat(4);
        DrawFrame::from(ConstFrame::new(vec![pixels], vec![], PixelFormatDesc::bgra(2, 2)))
    }

    fn render(mixer: &SoftwareImageMixer, frames: &[DrawFrame]) -> Vec<u8> {
        let mut visitor = ImageMixerVisitor::new(mixer);
        for frame in frames {
            frame.accept(&mut visitor);
        }
        mixer.render(&format_4x4()).wait().unwrap()
    }

    fn pixel(buffer: &[u8], x: usize, y: usize) -> [u8; 4] {
        let i = (y * 4 + x) * 4;
        [buffer[i], buffer[i + 1], buffer[i + 2], buffer[i + 3]]
    }

    #[test]
    fn single_opaque_layer_fills_the_raster() {
        let mixer = SoftwareImageMixer::new();
        let out = render(&mixer, &[solid([0, 0, 255, 255])]);
        assert_eq!(out.len(), 4 * 4 * 4);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(pixel(&out, x, y), [0, 0, 255, 255]);
            }
        }
    }

    #[test]
    fn later_layers_composite_over_earlier() {
        let mixer = SoftwareImageMixer::new();
        let out = render(&mixer, &[solid([0, 0, 255, 255]), solid([0, 255, 0, 255])]);
        assert_eq!(pixel(&out, 1, 1), [0, 255, 0, 255]);
    }

    #[test]
    fn is_mix_blends_additively_by_opacity() {
        let mixer = SoftwareImageMixer::new();
        let mut red = solid([0, 0, 255, 255]);
        red.transform.image.opacity = 0.4;
        red.transform.image.is_mix = true;
        let mut green = solid([0, 255, 0, 255]);
        green.transform.image.opacity = 0.6;
        green.transform.image.is_mix = true;

        let out = render(&mixer, &[red, green]);
        let px = pixel(&out, 2, 2);
        assert_eq!(px[3], 255);
        assert!((px[2] as i32 - 102).abs() <= 1, "red {}", px[2]);
        assert!((px[1] as i32 - 153).abs() <= 1, "green {}", px[1]);
        assert_eq!(px[0], 0);
    }

    #[test]
    fn half_opacity_over_black_halves_the_color() {
        let mixer = SoftwareImageMixer::new();
        let black = solid([0, 0, 0, 255]);
        let mut white = solid([255, 255, 255, 255]);
        white.transform.image.opacity = 0.5;

        let out = render(&mixer, &[black, white]);
        let px = pixel(&out, 0, 0);
        assert!((px[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn wipe_clip_reveals_left_portion_only() {
        let mixer = SoftwareImageMixer::new();
        let red = solid([0, 0, 255, 255]);
        let mut green = solid([0, 255, 0, 255]);
        green.transform.image.clip_scale[0] = 0.5;

        let out = render(&mixer, &[red, green]);
        // Left half wiped to green, right half still red.
        assert_eq!(pixel(&out, 0, 0), [0, 255, 0, 255]);
        assert_eq!(pixel(&out, 1, 0), [0, 255, 0, 255]);
        assert_eq!(pixel(&out, 2, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&out, 3, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn push_translation_moves_the_fill() {
        let mixer = SoftwareImageMixer::new();
        let mut green = solid([0, 255, 0, 255]);
        green.transform.image.fill_translation[0] = -0.5;

        let out = render(&mixer, &[green]);
        // Shifted half a frame left: right half is empty.
        assert_eq!(pixel(&out, 0, 0), [0, 255, 0, 255]);
        assert_eq!(pixel(&out, 3, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn white_key_passes_fill_black_key_blocks_it() {
        let mixer = SoftwareImageMixer::new();

        let mut white_key = solid([255, 255, 255, 255]);
        white_key.transform.image.is_key = true;
        let keyed = DrawFrame::from_list(vec![white_key, solid([0, 0, 255, 255])]);
        let out = render(&mixer, &[keyed]);
        assert_eq!(pixel(&out, 1, 1), [0, 0, 255, 255]);

        let mut black_key = solid([0, 0, 0, 255]);
        black_key.transform.image.is_key = true;
        let keyed = DrawFrame::from_list(vec![black_key, solid([0, 0, 255, 255])]);
        let out = render(&mixer, &[keyed]);
        assert_eq!(pixel(&out, 1, 1)[3], 0);
    }

    #[test]
    fn inverted_key_flips_the_mask() {
        let mixer = SoftwareImageMixer::new();
        let mut key = solid([0, 0, 0, 255]);
        key.transform.image.is_key = true;
        key.transform.image.invert = true;
        let keyed = DrawFrame::from_list(vec![key, solid([0, 0, 255, 255])]);
        let out = render(&mixer, &[keyed]);
        assert_eq!(pixel(&out, 1, 1), [0, 0, 255, 255]);
    }

    #[test]
    fn sting_stack_keys_src_out_and_dst_in() {
        // [inverted mask][src][mask][dst] with a white mask: src fully
        // keyed out, dst fully in.
        let mixer = SoftwareImageMixer::new();
        let mask = solid([255, 255, 255, 255]);
        let src = solid([0, 0, 255, 255]);
        let dst = solid([0, 255, 0, 255]);
        let stack = {
            let mut inv = mask.clone();
            inv.transform.image.is_key = true;
            inv.transform.image.invert = true;
            let mut key = mask.clone();
            key.transform.image.is_key = true;
            DrawFrame::from_list(vec![inv, src, key, dst])
        };
        let out = render(&mixer, &[stack]);
        assert_eq!(pixel(&out, 1, 1), [0, 255, 0, 255]);
    }

    #[test]
    fn render_clears_state_between_ticks() {
        let mixer = SoftwareImageMixer::new();
        let out = render(&mixer, &[solid([0, 0, 255, 255])]);
        assert_eq!(pixel(&out, 0, 0), [0, 0, 255, 255]);
        let out = render(&mixer, &[]);
        assert_eq!(pixel(&out, 0, 0), [0, 0, 0, 0]);
    }
}
