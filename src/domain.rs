//! Domain types shared by the scheduler, watcher and movement executor.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// What an activity injects when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Mouse,
    Keyboard,
}

impl Kind {
    /// Get the kind as it appears in the configuration file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mouse => "mouse",
            Self::Keyboard => "keyboard",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed shape traced by a mouse activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Square,
    Triangle,
    UpAndDown,
    LeftAndRight,
}

impl Pattern {
    /// Get the pattern as it appears in the configuration file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "square",
            Self::Triangle => "triangle",
            Self::UpAndDown => "up_and_down",
            Self::LeftAndRight => "left_and_right",
        }
    }

    /// Vertices of the shape relative to the starting point, in travel order.
    ///
    /// The last vertex is always the origin so the cursor ends where it started.
    pub fn waypoints(self, distance: i32) -> Vec<Offset> {
        match self {
            Self::Square => vec![
                Offset::new(distance, 0),
                Offset::new(distance, distance),
                Offset::new(0, distance),
                Offset::ORIGIN,
            ],
            Self::Triangle => vec![
                Offset::new(distance, 0),
                Offset::new(distance / 2, distance),
                Offset::ORIGIN,
            ],
            Self::UpAndDown => vec![Offset::new(0, distance), Offset::ORIGIN],
            Self::LeftAndRight => vec![Offset::new(distance, 0), Offset::ORIGIN],
        }
    }

    /// Number of edges traced by this pattern.
    pub fn edges(self) -> u32 {
        match self {
            Self::Square => 4,
            Self::Triangle => 3,
            Self::UpAndDown | Self::LeftAndRight => 2,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of a configured activity (newtype for type safety).
///
/// Timers are keyed by this, never by [`Kind`], so two activities of the same
/// kind never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityId(String);

impl ActivityId {
    /// Create a new activity id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActivityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Absolute screen coordinate of the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate this point by an offset.
    #[must_use]
    pub fn offset(self, by: Offset) -> Self {
        Self::new(self.x + by.dx, self.y + by.dy)
    }

    /// Whether `other` lies within `tolerance` pixels on both axes.
    pub fn is_near(self, other: Point, tolerance: i32) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Displacement relative to a starting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl Offset {
    pub const ORIGIN: Offset = Offset { dx: 0, dy: 0 };

    pub fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pattern_closes_at_origin() {
        for pattern in [
            Pattern::Square,
            Pattern::Triangle,
            Pattern::UpAndDown,
            Pattern::LeftAndRight,
        ] {
            let waypoints = pattern.waypoints(10);
            assert_eq!(waypoints.last(), Some(&Offset::ORIGIN), "{pattern}");
            assert_eq!(waypoints.len(), pattern.edges() as usize, "{pattern}");
        }
    }

    #[test]
    fn test_triangle_apex_is_centered() {
        let waypoints = Pattern::Triangle.waypoints(10);
        assert_eq!(waypoints[1], Offset::new(5, 10));
    }

    #[test]
    fn test_point_is_near() {
        let p = Point::new(100, 100);
        assert!(p.is_near(Point::new(105, 95), 5));
        assert!(!p.is_near(Point::new(106, 100), 5));
        assert!(!p.is_near(Point::new(100, 94), 5));
    }

    #[test]
    fn test_pattern_parses_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            pattern: Pattern,
        }

        let w: Wrapper = toml::from_str(r#"pattern = "left_and_right""#).unwrap();
        assert_eq!(w.pattern, Pattern::LeftAndRight);
        assert!(toml::from_str::<Wrapper>(r#"pattern = "circle""#).is_err());
    }
}
