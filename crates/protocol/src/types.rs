//! Identifiers and plane math shared by client and server

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Per-connection input sequence number (starts at 1, never wraps in practice)
pub type Sequence = u32;

/// Server simulation tick counter
pub type Tick = u64;

/// Identifier of a replicated entity
pub type EntityId = u64;

/// Identifier of a transport session
///
/// Only used for routing on the server; never written to the wire.
pub type ConnectionId = uuid::Uuid;

/// 2D vector used for positions and velocities
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    #[inline]
    pub fn distance(self, other: Vec2) -> f32 {
        (self - other).length()
    }

    /// Linear blend between `self` (t = 0) and `other` (t = 1)
    ///
    /// Written as `a * (1 - t) + b * t` so both endpoints are reproduced
    /// exactly.
    #[inline]
    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        let s = 1.0 - t;
        Vec2::new(self.x * s + other.x * t, self.y * s + other.y * t)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, scalar: f32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }
}
