//! Administrative boundary units.
//!
//! A [`BoundarySet`] is the fixed, read-only collection of named polygons a run
//! summarises raster data over. Each [`BoundaryUnit`] caches its representative
//! point (the polygon centroid), which is where the unit gets sampled.
//!
//! Boundary sets are normally loaded from a shapefile, see
//! [`read_boundary_shapefile`](crate::io::read_boundary_shapefile).

mod boundary_set;

pub use boundary_set::{BoundaryError, BoundarySet, BoundaryUnit};
