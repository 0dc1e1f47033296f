//! I/O collaborators: raster loaders, boundary shapefiles and
//! tabular export.
//!
//! - **GeoTIFF rasters**: single-band grids georeferenced by ModelPixelScale
//!   and ModelTiepoint tags
//! - **NetCDF rasters**: CF-convention variables with a time axis (requires
//!   the `netcdf` feature)
//! - **Boundary shapefiles**: named polygons with a `.prj` reference system
//! - **CSV export**: per-unit, per-period, long-form and pivot layouts
//!
//! # Archive layout
//!
//! ```text
//! base/
//!   2020/
//!     01/  sm_c4grass-2020-01-dk1.nc  sm_c4grass-2020-01-dk2.nc ...
//!     02/  ...
//!   2021/
//!     ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use raster_ward::grid::Crs;
//! use raster_ward::io::{read_boundary_shapefile, GeoTiffLoader, RasterLoader};
//!
//! let wards = read_boundary_shapefile(Path::new("wards.shp"), "NAME_3", None, None)?;
//! let slices = GeoTiffLoader::new(Crs::WGS84).load(Path::new("base/2020/01/sm.tif"))?;
//! ```

mod cf_time;
mod export;
mod geotiff;
#[cfg(feature = "netcdf")]
mod netcdf_io;
mod raster_loader;
mod shapefile_reader;

pub use cf_time::CfTimeUnits;
pub use export::{
    sanitize_filename, ExportError, Exporter, LongFormExporter, OutputLayout, PerPeriodExporter,
    PerUnitExporter, PivotExporter,
};
pub use geotiff::GeoTiffLoader;
#[cfg(feature = "netcdf")]
pub use netcdf_io::NetcdfLoader;
pub use raster_loader::{RasterError, RasterLoader};
pub use shapefile_reader::{read_boundary_shapefile, ShapefileError};
