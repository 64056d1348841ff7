// crates/aircast-core/src/geometry.rs
//
// Frame geometry: the quad a frame's texture is mapped onto.
//
// Always exactly four vertices. The default quad covers the unit square
// with a 1:1 texture mapping; the vflip variant swaps the texture rows for
// sources that decode bottom-up.

use serde::{Deserialize, Serialize};

/// One vertex: position plus texture coordinates.
///
/// `texture_r` / `texture_q` carry the projective components used for
/// perspective-correct sampling; for the plain quad they stay (0, 1).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub vertex_x:  f64,
    pub vertex_y:  f64,
    pub texture_x: f64,
    pub texture_y: f64,
    pub texture_r: f64,
    pub texture_q: f64,
}

impl Coord {
    pub fn new(vertex_x: f64, vertex_y: f64, texture_x: f64, texture_y: f64) -> Self {
        Self { vertex_x, vertex_y, texture_x, texture_y, texture_r: 0.0, texture_q: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Quad,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameGeometry {
    kind: GeometryType,
    data: [Coord; 4],
}

impl FrameGeometry {
    pub fn quad(data: [Coord; 4]) -> Self {
        Self { kind: GeometryType::Quad, data }
    }

    pub fn kind(&self) -> GeometryType {
        self.kind
    }

    pub fn data(&self) -> &[Coord; 4] {
        &self.data
    }

    /// Unit quad, 1:1 texture mapping. Order: ul, ur, lr, ll.
    pub fn default_quad() -> Self {
        Self::quad([
            Coord::new(0.0, 0.0, 0.0, 0.0),
            Coord::new(1.0, 0.0, 1.0, 0.0),
            Coord::new(1.0, 1.0, 1.0, 1.0),
            Coord::new(0.0, 1.0, 0.0, 1.0),
        ])
    }

    /// Unit quad with vertically flipped texture rows.
    pub fn default_vflip() -> Self {
        Self::quad([
            Coord::new(0.0, 0.0, 0.0, 1.0),
            Coord::new(1.0, 0.0, 1.0, 1.0),
            Coord::new(1.0, 1.0, 1.0, 0.0),
            Coord::new(0.0, 1.0, 0.0, 0.0),
        ])
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::default_quad()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quad_has_identity_mapping() {
        let g = FrameGeometry::default_quad();
        for c in g.data() {
            assert_eq!(c.vertex_x, c.texture_x);
            assert_eq!(c.vertex_y, c.texture_y);
        }
    }

    #[test]
    fn vflip_swaps_texture_rows_only() {
        let plain = FrameGeometry::default_quad();
        let flip  = FrameGeometry::default_vflip();
        for (a, b) in plain.data().iter().zip(flip.data().iter()) {
            assert_eq!(a.vertex_x, b.vertex_x);
            assert_eq!(a.vertex_y, b.vertex_y);
            assert_eq!(a.texture_y, 1.0 - b.texture_y);
        }
    }
}
