// crates/aircast-engine/src/producer/color.rs
//
// Solid-color generator.
//
// Accepts `#AARRGGBB`, `#RRGGBB`, or a named color. The frame is a single
// pixel; the unit-quad geometry stretches it to the full raster, so a
// color layer costs one texel regardless of format.

use aircast_core::{ConstFrame, DrawFrame, VideoField};

use crate::mixer::image::FrameFactory;
use crate::producer::registry::{ProducerDependencies, ProducerFactory};
use crate::producer::{BoxedProducer, FrameProducer};

/// Parse a color spec into BGRA bytes.
pub fn parse_color(spec: &str) -> Option<[u8; 4]> {
    if let Some(hex) = spec.strip_prefix('#') {
        let argb = match hex.len() {
            6 => 0xFF00_0000 | u32::from_str_radix(hex, 16).ok()?,
            8 => u32::from_str_radix(hex, 16).ok()?,
            _ => return None,
        };
        let [a, r, g, b] = argb.to_be_bytes();
        return Some([b, g, r, a]);
    }

    match spec.to_ascii_uppercase().as_str() {
        "BLACK"       => Some([0, 0, 0, 255]),
        "WHITE"       => Some([255, 255, 255, 255]),
        "RED"         => Some([0, 0, 255, 255]),
        "GREEN"       => Some([0, 255, 0, 255]),
        "BLUE"        => Some([255, 0, 0, 255]),
        "YELLOW"      => Some([0, 255, 255, 255]),
        "CYAN"        => Some([255, 255, 0, 255]),
        "MAGENTA"     => Some([255, 0, 255, 255]),
        "ORANGE"      => Some([0, 165, 255, 255]),
        "BROWN"       => Some([42, 42, 165, 255]),
        "GRAY" | "GREY" => Some([128, 128, 128, 255]),
        "TRANSPARENT" => Some([0, 0, 0, 0]),
        _ => None,
    }
}

pub struct ColorProducer {
    frame: DrawFrame,
    spec:  String,
}

impl ColorProducer {
    pub fn new(frame_factory: &dyn FrameFactory, spec: &str) -> Option<Self> {
        let bgra = parse_color(spec)?;
        let mut frame = frame_factory
            .create_frame(aircast_core::StreamTag::new(), &aircast_core::PixelFormatDesc::bgra(1, 1));
        frame.image_data_mut(0).copy_from_slice(&bgra);
        Some(Self { frame: DrawFrame::from(ConstFrame::from(frame)), spec: spec.to_owned() })
    }
}

impl FrameProducer for ColorProducer {
    fn receive(&mut self, _field: VideoField, _nb_samples: usize) -> anyhow::Result<DrawFrame> {
        Ok(self.frame.clone())
    }

    fn last_frame(&mut self, _field: VideoField) -> DrawFrame {
        self.frame.clone()
    }

    fn name(&self) -> String {
        "color".into()
    }

    fn print(&self) -> String {
        format!("color[{}]", self.spec)
    }

    fn state(&self) -> aircast_core::monitor::State {
        let mut state = aircast_core::monitor::State::new();
        state.insert("color", self.spec.as_str());
        state
    }
}

/// Registry factory: matches a single parameter that parses as a color.
pub fn create_color_producer() -> ProducerFactory {
    Box::new(|deps: &ProducerDependencies, params: &[String]| {
        let [spec] = params else { return Ok(None) };
        Ok(ColorProducer::new(deps.frame_factory.as_ref(), spec)
            .map(|p| Box::new(p) as BoxedProducer))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::software::SoftwareImageMixer;

    #[test]
    fn parses_hex_with_and_without_alpha() {
        assert_eq!(parse_color("#FF0000"), Some([0, 0, 255, 255]));
        assert_eq!(parse_color("#80FF0000"), Some([0, 0, 255, 128]));
        assert_eq!(parse_color("#XYZ"), None);
    }

    #[test]
    fn parses_named_colors_case_insensitively() {
        assert_eq!(parse_color("red"), Some([0, 0, 255, 255]));
        assert_eq!(parse_color("Blue"), Some([255, 0, 0, 255]));
        assert_eq!(parse_color("mauve"), None);
    }

    #[test]
    fn producer_emits_the_same_frame_every_tick() {
        let factory = SoftwareImageMixer::new();
        let mut p = ColorProducer::new(&factory, "RED").unwrap();
        let a = p.receive(VideoField::Progressive, 0).unwrap();
        let b = p.receive(VideoField::Progressive, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.leaf().and_then(|f| f.image_data(0)), Some(&[0u8, 0, 255, 255][..]));
        assert_eq!(p.nb_frames(), u32::MAX);
    }
}
