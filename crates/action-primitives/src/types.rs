//! Core data types for DOM primitives

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a node resolved inside a page.
///
/// The id is only meaningful for the page that produced it. `selector` records which
/// candidate matched, for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    pub id: u64,
    pub selector: String,
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.id, self.selector)
    }
}

/// Viewport rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// Synthetic pointer sequence used when frameworks ignore a bare `click()`.
pub const POINTER_SEQUENCE: [&str; 4] = ["pointerover", "pointerdown", "pointerup", "click"];

/// Key used to commit chat input.
pub const COMMIT_KEY: &str = "Enter";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_contains() {
        let rect = Rect::new(10.0, 20.0, 100.0, 40.0);
        assert_eq!(rect.center(), (60.0, 40.0));
        assert!(rect.contains(60.0, 40.0));
        assert!(!rect.contains(5.0, 40.0));
        assert!(Rect::new(1.0, 1.0, 0.0, 10.0).is_empty());
    }
}
