//! Boundary units and the set that holds them.
//!
//! A unit keeps its polygon, bounding box and centroid. The set enforces
//! unique names and a single reference system; names that repeat in the
//! source data are renamed before they get here.

use std::collections::HashSet;

use geo::{BoundingRect, Centroid, Coord, Intersects, MultiPolygon, Point, Polygon, Rect};
use thiserror::Error;

use crate::grid::Crs;

/// Error type for boundary set construction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BoundaryError {
    /// Two units share a name
    #[error("duplicate boundary unit name: {0}")]
    DuplicateUnit(String),

    /// A unit has no area to take a centroid of
    #[error("boundary unit {0} has an empty geometry")]
    EmptyGeometry(String),

    /// The set holds no units
    #[error("boundary set is empty")]
    Empty,
}

/// A named administrative polygon.
#[derive(Debug, Clone)]
pub struct BoundaryUnit {
    name: String,
    geometry: MultiPolygon<f64>,
    representative_point: Point<f64>,
    bbox: Rect<f64>,
}

impl BoundaryUnit {
    /// Create a unit; the representative point is the geometry's centroid.
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Result<Self, BoundaryError> {
        let name = name.into();
        let (Some(centroid), Some(bbox)) = (geometry.centroid(), geometry.bounding_rect()) else {
            return Err(BoundaryError::EmptyGeometry(name));
        };
        Ok(Self {
            name,
            geometry,
            representative_point: centroid,
            bbox,
        })
    }

    /// Create a unit from a single polygon.
    pub fn from_polygon(name: impl Into<String>, polygon: Polygon<f64>) -> Result<Self, BoundaryError> {
        Self::new(name, MultiPolygon(vec![polygon]))
    }

    /// Override the representative point.
    pub fn with_representative_point(mut self, point: Point<f64>) -> Self {
        self.representative_point = point;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Sampling location, in the owning set's reference system.
    pub fn representative_point(&self) -> Point<f64> {
        self.representative_point
    }

    /// Check if a point lies inside or on the edge of this unit.
    pub fn covers(&self, x: f64, y: f64) -> bool {
        rect_contains(&self.bbox, x, y) && self.geometry.intersects(&Point::new(x, y))
    }
}

/// An immutable collection of uniquely named boundary units sharing one
/// reference system.
#[derive(Debug, Clone)]
pub struct BoundarySet {
    units: Vec<BoundaryUnit>,
    crs: Crs,
    extent: Rect<f64>,
}

impl BoundarySet {
    pub fn new(units: Vec<BoundaryUnit>, crs: Crs) -> Result<Self, BoundaryError> {
        let mut seen = HashSet::with_capacity(units.len());
        for unit in &units {
            if !seen.insert(unit.name.as_str()) {
                return Err(BoundaryError::DuplicateUnit(unit.name.clone()));
            }
        }

        let extent = units
            .iter()
            .map(|u| u.bbox)
            .reduce(|a, b| {
                Rect::new(
                    Coord {
                        x: a.min().x.min(b.min().x),
                        y: a.min().y.min(b.min().y),
                    },
                    Coord {
                        x: a.max().x.max(b.max().x),
                        y: a.max().y.max(b.max().y),
                    },
                )
            })
            .ok_or(BoundaryError::Empty)?;

        Ok(Self { units, crs, extent })
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn units(&self) -> &[BoundaryUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit names, in load order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|u| u.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&BoundaryUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Bounding rectangle of all units.
    pub fn extent(&self) -> Rect<f64> {
        self.extent
    }

    /// Check if a point falls inside the union of all unit polygons.
    pub fn covers(&self, x: f64, y: f64) -> bool {
        rect_contains(&self.extent, x, y) && self.units.iter().any(|u| u.covers(x, y))
    }
}

fn rect_contains(rect: &Rect<f64>, x: f64, y: f64) -> bool {
    x >= rect.min().x && x <= rect.max().x && y >= rect.min().y && y <= rect.max().y
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Rect};

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x0 + size, y: y0 + size }).to_polygon()
    }

    #[test]
    fn test_unit_centroid() {
        let unit = BoundaryUnit::from_polygon("Ward A", square(0.0, 0.0, 2.0)).unwrap();
        let p = unit.representative_point();
        assert!((p.x() - 1.0).abs() < 1e-12);
        assert!((p.y() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_covers_is_boundary_inclusive() {
        let unit = BoundaryUnit::from_polygon(
            "Tri",
            polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 0.0, y: 4.0)],
        )
        .unwrap();
        assert!(unit.covers(1.0, 1.0));
        assert!(unit.covers(2.0, 2.0), "edge point");
        assert!(!unit.covers(3.0, 3.0), "inside bbox but outside triangle");
    }

    #[test]
    fn test_set_union_coverage() {
        let set = BoundarySet::new(
            vec![
                BoundaryUnit::from_polygon("A", square(0.0, 0.0, 1.0)).unwrap(),
                BoundaryUnit::from_polygon("B", square(2.0, 0.0, 1.0)).unwrap(),
            ],
            Crs::Geographic,
        )
        .unwrap();

        assert!(set.covers(0.5, 0.5));
        assert!(set.covers(2.5, 0.5));
        assert!(!set.covers(1.5, 0.5), "gap between units");
        assert_eq!(set.extent().max().x, 3.0);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = BoundarySet::new(
            vec![
                BoundaryUnit::from_polygon("A", square(0.0, 0.0, 1.0)).unwrap(),
                BoundaryUnit::from_polygon("A", square(2.0, 0.0, 1.0)).unwrap(),
            ],
            Crs::Geographic,
        )
        .unwrap_err();
        assert_eq!(err, BoundaryError::DuplicateUnit("A".to_string()));
    }

    #[test]
    fn test_empty_set_rejected() {
        assert_eq!(
            BoundarySet::new(vec![], Crs::Geographic).unwrap_err(),
            BoundaryError::Empty
        );
        assert!(BoundaryUnit::new("Nothing", MultiPolygon(vec![])).is_err());
    }
}
