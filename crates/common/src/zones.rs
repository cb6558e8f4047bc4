use serde::{Deserialize, Serialize};

/// Minimum vertex count for a zone to be persisted.
pub const MIN_ZONE_POINTS: usize = 3;

/// A pixel coordinate in the video frame's native resolution.
/// Serialised as a two element array `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
  pub x: i32,
  pub y: i32,
}

impl Point {
  pub fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }
}

impl From<[i32; 2]> for Point {
  fn from([x, y]: [i32; 2]) -> Self {
    Self { x, y }
  }
}

impl From<Point> for [i32; 2] {
  fn from(p: Point) -> Self {
    [p.x, p.y]
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
  pub points: Vec<Point>,
  pub name: String,
}

impl Zone {
  pub fn new(points: Vec<Point>, name: impl Into<String>) -> Self {
    Self {
      points,
      name: name.into(),
    }
  }

  pub fn is_closed(&self) -> bool {
    self.points.len() >= MIN_ZONE_POINTS
  }
}

/// Name given to the zone at `index` (0-based) when none was chosen.
pub fn default_zone_name(index: usize) -> String {
  format!("Zone {}: Restricted Area", index + 1)
}

/// Wire form of the zone set: two positionally paired arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZonesPayload {
  #[serde(default)]
  pub zones: Vec<Vec<Point>>,
  #[serde(default)]
  pub zone_names: Vec<String>,
}

impl ZonesPayload {
  pub fn from_zones(zones: &[Zone]) -> Self {
    Self {
      zones: zones.iter().map(|z| z.points.clone()).collect(),
      zone_names: zones.iter().map(|z| z.name.clone()).collect(),
    }
  }

  /// Pairs polygons with names. Missing or blank names get the default
  /// label for their position; surplus names are dropped.
  pub fn into_zones(self) -> Vec<Zone> {
    let mut names = self.zone_names.into_iter();
    self
      .zones
      .into_iter()
      .enumerate()
      .map(|(idx, points)| {
        let name = names
          .next()
          .filter(|n| !n.trim().is_empty())
          .unwrap_or_else(|| default_zone_name(idx));
        Zone { points, name }
      })
      .collect()
  }
}
