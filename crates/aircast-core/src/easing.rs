// crates/aircast-core/src/easing.rs
//
// Easing curves for transforms and transitions.
//
// All curves take `t` ∈ [0.0, 1.0] and return a remapped value in
// [0.0, 1.0] (elastic/bounce may overshoot transiently). Callers normalize
// `frame / duration` before applying. Names match https://easings.net.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ease {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    SmoothStep,
    InOutCubic,
    OutBounce,
    OutElastic,
}

impl Ease {
    /// Remap a normalized phase. Input is clamped to [0, 1].
    pub fn apply(self, t: f64) -> f64 {
        let t = clamp01(t);
        match self {
            Ease::Linear     => t,
            Ease::InQuad     => t * t,
            Ease::OutQuad    => 1.0 - (1.0 - t) * (1.0 - t),
            Ease::InOutQuad  => {
                if t < 0.5 { 2.0 * t * t } else { 1.0 - (-2.0 * t + 2.0).powi(2) / 2.0 }
            }
            Ease::SmoothStep => t * t * (3.0 - 2.0 * t),
            Ease::InOutCubic => {
                if t < 0.5 { 4.0 * t * t * t } else { 1.0 - (-2.0 * t + 2.0).powi(3) / 2.0 }
            }
            Ease::OutBounce  => out_bounce(t),
            Ease::OutElastic => out_elastic(t),
        }
    }

    /// Interpolate `source → dest` at phase `time / duration`.
    ///
    /// A zero `duration` snaps to `dest` — transitions with no frames left
    /// must not divide by zero.
    pub fn tween(self, time: f64, source: f64, dest: f64, duration: f64) -> f64 {
        if duration <= 0.0 {
            return dest;
        }
        source + (dest - source) * self.apply(time / duration)
    }

    /// Case-insensitive name lookup, used by control-surface parsers.
    pub fn from_name(name: &str) -> Option<Ease> {
        match name.to_ascii_lowercase().as_str() {
            "linear"              => Some(Ease::Linear),
            "easein" | "inquad"   => Some(Ease::InQuad),
            "easeout" | "outquad" => Some(Ease::OutQuad),
            "easeinout" | "inoutquad" => Some(Ease::InOutQuad),
            "smoothstep"          => Some(Ease::SmoothStep),
            "easeinoutcubic" | "inoutcubic" => Some(Ease::InOutCubic),
            "easeoutbounce" | "outbounce"   => Some(Ease::OutBounce),
            "easeoutelastic" | "outelastic" => Some(Ease::OutElastic),
            _ => None,
        }
    }
}

#[inline]
fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn out_bounce(t: f64) -> f64 {
    const N: f64 = 7.5625;
    const D: f64 = 2.75;
    if t < 1.0 / D {
        N * t * t
    } else if t < 2.0 / D {
        let t = t - 1.5 / D;
        N * t * t + 0.75
    } else if t < 2.5 / D {
        let t = t - 2.25 / D;
        N * t * t + 0.9375
    } else {
        let t = t - 2.625 / D;
        N * t * t + 0.984375
    }
}

fn out_elastic(t: f64) -> f64 {
    if t == 0.0 || t == 1.0 {
        return t;
    }
    let c4 = std::f64::consts::TAU / 3.0;
    2.0_f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
}
