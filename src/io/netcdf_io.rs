//! NetCDF raster loader (requires the `netcdf` feature).
//!
//! Reads one named scalar variable on a longitude/latitude grid:
//!
//! - coordinates from `lon`/`longitude`/`x` and `lat`/`latitude`/`y`
//! - time from a CF `time` axis (`days since 2020-01-01` etc.); a variable
//!   without a time dimension yields a single untimed slice
//! - `_FillValue` / `missing_value` become undefined cells
//! - packed data is unpacked with `scale_factor` / `add_offset`
//! - the reference system from a `crs`/`spatial_ref` grid-mapping variable
//!   carrying WKT, else the configured default
//!
//! # Example
//!
//! ```rust,ignore
//! use raster_ward::grid::Crs;
//! use raster_ward::io::{NetcdfLoader, RasterLoader};
//!
//! let loader = NetcdfLoader::new("sm_c4grass", Crs::WGS84);
//! for slice in loader.load(Path::new("base/2020/01/sm-dk1.nc"))? {
//!     println!("{:?} {:?}", slice.timestamp, slice.grid.value_range());
//! }
//! ```

use std::path::Path;

use tracing::debug;

use super::cf_time::CfTimeUnits;
use super::raster_loader::{has_extension, RasterError, RasterLoader};
use crate::grid::{Crs, Grid, TimeSlice};

const LON_NAMES: [&str; 3] = ["lon", "longitude", "x"];
const LAT_NAMES: [&str; 3] = ["lat", "latitude", "y"];
const TIME_NAMES: [&str; 2] = ["time", "Time"];
const GRID_MAPPING_NAMES: [&str; 2] = ["crs", "spatial_ref"];

/// Loader for `.nc` rasters.
#[derive(Debug, Clone)]
pub struct NetcdfLoader {
    variable: String,
    default_crs: Crs,
}

impl NetcdfLoader {
    pub fn new(variable: impl Into<String>, default_crs: Crs) -> Self {
        Self {
            variable: variable.into(),
            default_crs,
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Read every time step of the configured variable.
    pub fn read(&self, path: &Path) -> Result<Vec<TimeSlice>, RasterError> {
        let file = netcdf::open(path)?;

        let (lon_name, lon) = read_coord(&file, &LON_NAMES)?;
        let (lat_name, lat) = read_coord(&file, &LAT_NAMES)?;
        let (nx, ny) = (lon.len(), lat.len());

        let var = file
            .variable(&self.variable)
            .ok_or_else(|| RasterError::MissingVariable(self.variable.clone()))?;

        let dim_names: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let dim_lens: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let lon_dim = coord_dim(&file, lon_name);
        let lat_dim = coord_dim(&file, lat_name);

        // Spatial dims are the last two, in either order
        let n = dim_names.len();
        if n < 2 {
            return Err(RasterError::UnsupportedDataType(format!(
                "{} has {} dimension(s), expected at least 2",
                self.variable, n
            )));
        }
        let transposed = dim_names[n - 2] == lon_dim && dim_names[n - 1] == lat_dim;
        let (rows, cols) = (dim_lens[n - 2], dim_lens[n - 1]);
        let expected = if transposed { (nx, ny) } else { (ny, nx) };
        if (rows, cols) != expected {
            return Err(RasterError::UnsupportedDataType(format!(
                "{} is {}x{}, coordinates are {}x{}",
                self.variable, rows, cols, expected.0, expected.1
            )));
        }
        let n_steps: usize = dim_lens[..n - 2].iter().product();

        let scale = attr_f64(&var, "scale_factor").unwrap_or(1.0);
        let offset = attr_f64(&var, "add_offset").unwrap_or(0.0);
        let fills: Vec<f64> = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|name| attr_f64(&var, name))
            .collect();

        let raw: Vec<f64> = var.get_values::<f64, _>(..)?;
        let unpacked: Vec<f64> = raw
            .into_iter()
            .map(|v| {
                if !v.is_finite() || fills.iter().any(|f| *f == v) {
                    f64::NAN
                } else {
                    v * scale + offset
                }
            })
            .collect();

        let timestamps = read_times(&file, n_steps);
        let crs = read_grid_mapping(&file).unwrap_or(self.default_crs);
        debug!(
            path = %path.display(),
            variable = %self.variable,
            steps = n_steps,
            nx,
            ny,
            %crs,
            "read netcdf variable"
        );

        let cell_count = nx * ny;
        let mut slices = Vec::with_capacity(n_steps);
        for step in 0..n_steps {
            let chunk = &unpacked[step * cell_count..(step + 1) * cell_count];
            let values = if transposed {
                transpose(chunk, ny, nx)
            } else {
                chunk.to_vec()
            };
            let grid = Grid::new(lon.clone(), lat.clone(), values, crs)?;
            slices.push(TimeSlice::new(timestamps.get(step).copied().flatten(), grid));
        }
        Ok(slices)
    }
}

impl RasterLoader for NetcdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<TimeSlice>, RasterError> {
        self.read(path)
    }

    fn accepts(&self, path: &Path) -> bool {
        has_extension(path, &["nc", "nc4", "netcdf"])
    }
}

fn read_coord<'a>(
    file: &netcdf::File,
    names: &[&'a str],
) -> Result<(&'a str, Vec<f64>), RasterError> {
    for name in names {
        if let Some(var) = file.variable(name) {
            let data: Vec<f64> = var.get_values(..)?;
            return Ok((*name, data));
        }
    }
    Err(RasterError::MissingVariable(names.join(" or ")))
}

/// Dimension a 1D coordinate variable runs along (its own name by CF convention).
fn coord_dim(file: &netcdf::File, name: &str) -> String {
    file.variable(name)
        .and_then(|v| v.dimensions().first().map(|d| d.name()))
        .unwrap_or_else(|| name.to_string())
}

/// Timestamps of the time axis, None per step when absent or not CF.
fn read_times(file: &netcdf::File, n_steps: usize) -> Vec<Option<chrono::NaiveDateTime>> {
    for name in TIME_NAMES {
        let Some(var) = file.variable(name) else {
            continue;
        };
        let units = attr_string(&var, "units").and_then(|u| CfTimeUnits::parse(&u));
        let values: Vec<f64> = var.get_values(..).unwrap_or_default();
        if let Some(units) = units {
            return values.into_iter().map(|v| units.at(v)).collect();
        }
    }
    vec![None; n_steps]
}

fn read_grid_mapping(file: &netcdf::File) -> Option<Crs> {
    GRID_MAPPING_NAMES.iter().find_map(|name| {
        let var = file.variable(name)?;
        ["crs_wkt", "spatial_ref"]
            .iter()
            .filter_map(|attr| attr_string(&var, attr))
            .find_map(|wkt| Crs::from_wkt(&wkt).ok())
            .or_else(|| attr_f64(&var, "epsg_code").map(|c| Crs::from_epsg(c as u32)))
    })
}

fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Double(d) => Some(d),
            netcdf::AttributeValue::Float(f) => Some(f as f64),
            netcdf::AttributeValue::Short(s) => Some(s as f64),
            netcdf::AttributeValue::Int(i) => Some(i as f64),
            netcdf::AttributeValue::Uchar(u) => Some(u as f64),
            netcdf::AttributeValue::Schar(s) => Some(s as f64),
            _ => None,
        })
}

fn attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Str(s) => Some(s),
            _ => None,
        })
}

/// Reorder a column-major (x-slowest) block into row-major (y-slowest).
fn transpose(chunk: &[f64], ny: usize, nx: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; nx * ny];
    for col in 0..nx {
        for row in 0..ny {
            out[row * nx + col] = chunk[col * ny + row];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose() {
        // x-major 3 lon x 2 lat
        let chunk = [1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
        assert_eq!(transpose(&chunk, 2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_read_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sm-dk1.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("time", 2).unwrap();
            file.add_dimension("lat", 2).unwrap();
            file.add_dimension("lon", 3).unwrap();

            let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
            time.put_attribute("units", "days since 2020-01-01").unwrap();
            time.put_values(&[0.0, 1.0], ..).unwrap();

            let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
            lat.put_values(&[-1.0, -1.5], ..).unwrap();
            let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
            lon.put_values(&[36.0, 36.5, 37.0], ..).unwrap();

            let mut sm = file
                .add_variable::<f32>("sm_c4grass", &["time", "lat", "lon"])
                .unwrap();
            sm.put_attribute("_FillValue", -999.0f32).unwrap();
            sm.put_values(
                &[0.1f32, 0.2, 0.3, 0.4, -999.0, 0.6, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
                ..,
            )
            .unwrap();
        }

        let loader = NetcdfLoader::new("sm_c4grass", Crs::WGS84);
        assert!(loader.accepts(&path));
        let slices = loader.load(&path).unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].grid.shape(), (3, 2));
        assert_eq!(slices[0].grid.cell(1, 1), None);
        assert!((slices[0].grid.cell(0, 2).unwrap() - 0.3).abs() < 1e-6);
        let day = slices[1].timestamp.unwrap().format("%Y-%m-%d").to_string();
        assert_eq!(day, "2020-01-02");
    }

    #[test]
    fn test_missing_variable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("lat", 1).unwrap();
            file.add_dimension("lon", 1).unwrap();
            file.add_variable::<f64>("lat", &["lat"]).unwrap();
            file.add_variable::<f64>("lon", &["lon"]).unwrap();
        }
        let err = NetcdfLoader::new("sm_c4grass", Crs::WGS84)
            .load(&path)
            .unwrap_err();
        assert!(matches!(err, RasterError::MissingVariable(_)));
    }
}
