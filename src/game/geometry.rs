//! Axis-aligned rectangle overlap and collision resolution

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle. Position is the top-left corner, y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Zero or negative extent on either axis
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Result of resolving a collision between two rectangles.
///
/// `normal` points from `b` towards `a` on exactly one axis; the other
/// component is zero. `overlap` holds the penetration depth on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub normal: (f32, f32),
    pub overlap: (f32, f32),
}

impl Resolution {
    pub fn is_vertical(&self) -> bool {
        self.normal.1 != 0.0
    }

    /// `a` sits above `b`
    pub fn from_above(&self) -> bool {
        self.normal.1 < 0.0
    }

    /// `a` sits below `b`
    pub fn from_below(&self) -> bool {
        self.normal.1 > 0.0
    }

    /// `a` sits left of `b`
    pub fn from_left(&self) -> bool {
        self.normal.0 < 0.0
    }

    /// `a` sits right of `b`
    pub fn from_right(&self) -> bool {
        self.normal.0 > 0.0
    }
}

/// True iff the two rectangles intersect with positive area.
/// Touching edges do not count.
pub fn overlaps(a: &Rect, b: &Rect) -> bool {
    if a.is_degenerate() || b.is_degenerate() {
        return false;
    }

    a.x < b.right() && a.right() > b.x && a.y < b.bottom() && a.bottom() > b.y
}

/// Minimum-translation heuristic: the axis with the smaller overlap is the
/// separating axis. Not swept, so fast movers can tunnel through thin rects.
pub fn resolve_collision(a: &Rect, b: &Rect) -> Option<Resolution> {
    if !overlaps(a, b) {
        return None;
    }

    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    let dx = ax - bx;
    let dy = ay - by;

    let half_x = (a.width + b.width) / 2.0;
    let half_y = (a.height + b.height) / 2.0;

    let overlap_x = half_x - dx.abs();
    let overlap_y = half_y - dy.abs();

    let normal = if overlap_x >= overlap_y {
        (0.0, sign_or_negative(dy))
    } else {
        (sign_or_negative(dx), 0.0)
    };

    Some(Resolution {
        normal,
        overlap: (overlap_x, overlap_y),
    })
}

fn sign_or_negative(delta: f32) -> f32 {
    if delta > 0.0 {
        1.0
    } else {
        -1.0
    }
}
