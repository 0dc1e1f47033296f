//! Raster source collaborator: turns one file into timestamped grids.

use std::path::Path;

use thiserror::Error;

use crate::grid::{CrsError, GridError, TimeSlice};

/// Error type for raster loading.
#[derive(Debug, Error)]
pub enum RasterError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error
    #[error("TIFF error: {0}")]
    Tiff(String),

    /// NetCDF library error
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// Missing or invalid georeferencing
    #[error("missing geotransform: {0}")]
    MissingGeotransform(String),

    /// Named variable or coordinate not in the file
    #[error("missing variable: {0}")]
    MissingVariable(String),

    /// Unsupported sample layout or data type
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Reference system could not be determined
    #[error("reference system: {0}")]
    Crs(#[from] CrsError),

    /// Decoded data does not form a valid grid
    #[error("invalid grid: {0}")]
    Grid(#[from] GridError),
}

impl From<tiff::TiffError> for RasterError {
    fn from(e: tiff::TiffError) -> Self {
        RasterError::Tiff(e.to_string())
    }
}

/// Loads the grids of one raster file.
pub trait RasterLoader: Send + Sync {
    /// All time slices in the file, in file order.
    fn load(&self, path: &Path) -> Result<Vec<TimeSlice>, RasterError>;

    /// Whether the file is one this loader reads.
    fn accepts(&self, path: &Path) -> bool;
}

/// Case-insensitive extension match.
pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("a/b/sm-dk1.NC"), &["nc"]));
        assert!(has_extension(Path::new("x.tiff"), &["tif", "tiff"]));
        assert!(!has_extension(Path::new("x.nc.bak"), &["nc"]));
        assert!(!has_extension(Path::new("README"), &["nc"]));
    }
}
