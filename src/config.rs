//! Run configuration.
//!
//! A run is described by a TOML file:
//!
//! ```toml
//! base_dir = "/data/soil_moisture"
//! boundary_path = "/data/wards/kenya_wards.shp"
//! start_year = 2015
//! end_year = 2020
//! mode = "quarter"
//! variable = "sm_c4grass"
//!
//! [output]
//! dir = "out"
//! layout = "pivot"
//! ```
//!
//! Everything except the paths and year range has a default. Command line
//! flags override file values through the `with_*` builders.
//!
//! The default `extension` is `nc`, which needs a build with
//! `--features netcdf`. Default builds read GeoTIFF only and should set
//! `extension = "tif"`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregation::BinningMode;
use crate::grid::{Crs, CrsError};
use crate::io::OutputLayout;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or schema error
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Year range runs backwards
    #[error("start_year {start} is after end_year {end}")]
    InvertedYears { start: i32, end: i32 },

    /// A required string is empty
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// No loader for the extension in this build
    #[error("unsupported raster extension `{extension}`{hint}")]
    UnsupportedExtension { extension: String, hint: &'static str },

    /// A reference system string could not be parsed
    #[error("{field}: {source}")]
    Crs {
        field: &'static str,
        #[source]
        source: CrsError,
    },
}

fn default_mode() -> BinningMode {
    BinningMode::Dekad
}

fn default_variable() -> String {
    "sm_c4grass".to_string()
}

fn default_name_field() -> String {
    "NAME_3".to_string()
}

fn default_extension() -> String {
    "nc".to_string()
}

fn default_raster_crs() -> String {
    "EPSG:4326".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Where and how results are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub layout: OutputLayout,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            layout: OutputLayout::default(),
        }
    }
}

/// Raster container selected by the configured extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    GeoTiff,
    #[cfg(feature = "netcdf")]
    Netcdf,
}

/// Inputs of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root of the `<year>/<month>/<file>` raster archive
    pub base_dir: PathBuf,
    /// Boundary shapefile
    pub boundary_path: PathBuf,
    pub start_year: i32,
    /// Inclusive
    pub end_year: i32,
    #[serde(default = "default_mode")]
    pub mode: BinningMode,
    /// Raster variable to read
    #[serde(default = "default_variable")]
    pub variable: String,
    /// Boundary attribute holding the unit name
    #[serde(default = "default_name_field")]
    pub name_field: String,
    /// Attribute that tells repeated names apart (e.g. `NAME_2`)
    #[serde(default)]
    pub qualifier_field: Option<String>,
    /// Raster file extension (`nc`, `tif`). `nc` needs the `netcdf` feature.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Reference system of rasters that do not declare one
    #[serde(default = "default_raster_crs")]
    pub raster_crs: String,
    /// Overrides the boundary file's `.prj`
    #[serde(default)]
    pub boundary_crs: Option<String>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        boundary_path: impl Into<PathBuf>,
        start_year: i32,
        end_year: i32,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            boundary_path: boundary_path.into(),
            start_year,
            end_year,
            mode: default_mode(),
            variable: default_variable(),
            name_field: default_name_field(),
            qualifier_field: None,
            extension: default_extension(),
            raster_crs: default_raster_crs(),
            boundary_crs: None,
            output: OutputConfig::default(),
        }
    }

    /// Load and validate a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_years(mut self, start_year: i32, end_year: i32) -> Self {
        self.start_year = start_year;
        self.end_year = end_year;
        self
    }

    pub fn with_mode(mut self, mode: BinningMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = variable.into();
        self
    }

    pub fn with_name_field(mut self, name_field: impl Into<String>) -> Self {
        self.name_field = name_field.into();
        self
    }

    pub fn with_qualifier_field(mut self, field: impl Into<String>) -> Self {
        self.qualifier_field = Some(field.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_raster_crs(mut self, crs: impl Into<String>) -> Self {
        self.raster_crs = crs.into();
        self
    }

    pub fn with_boundary_crs(mut self, crs: impl Into<String>) -> Self {
        self.boundary_crs = Some(crs.into());
        self
    }

    pub fn with_output(mut self, dir: impl Into<PathBuf>, layout: OutputLayout) -> Self {
        self.output = OutputConfig {
            dir: dir.into(),
            layout,
        };
        self
    }

    /// Check field values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_year > self.end_year {
            return Err(ConfigError::InvertedYears {
                start: self.start_year,
                end: self.end_year,
            });
        }
        if self.variable.trim().is_empty() {
            return Err(ConfigError::Empty("variable"));
        }
        if self.name_field.trim().is_empty() {
            return Err(ConfigError::Empty("name_field"));
        }
        if self.extension.trim_start_matches('.').trim().is_empty() {
            return Err(ConfigError::Empty("extension"));
        }
        self.raster_crs()?;
        self.boundary_crs()?;
        Ok(())
    }

    /// Years of the run, ascending.
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start_year..=self.end_year
    }

    pub fn raster_crs(&self) -> Result<Crs, ConfigError> {
        Crs::parse(&self.raster_crs).map_err(|source| ConfigError::Crs {
            field: "raster_crs",
            source,
        })
    }

    pub fn boundary_crs(&self) -> Result<Option<Crs>, ConfigError> {
        self.boundary_crs
            .as_deref()
            .map(|text| {
                Crs::parse(text).map_err(|source| ConfigError::Crs {
                    field: "boundary_crs",
                    source,
                })
            })
            .transpose()
    }

    /// Extension without a leading dot.
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Loader for the configured extension, if this build has one.
    pub fn raster_format(&self) -> Result<RasterFormat, ConfigError> {
        match self.extension().to_ascii_lowercase().as_str() {
            "tif" | "tiff" => Ok(RasterFormat::GeoTiff),
            #[cfg(feature = "netcdf")]
            "nc" | "nc4" => Ok(RasterFormat::Netcdf),
            #[cfg(not(feature = "netcdf"))]
            "nc" | "nc4" => Err(ConfigError::UnsupportedExtension {
                extension: self.extension().to_string(),
                hint: ": rebuild with `--features netcdf`",
            }),
            other => Err(ConfigError::UnsupportedExtension {
                extension: other.to_string(),
                hint: "",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        base_dir = "/data/sm"
        boundary_path = "/data/wards.shp"
        start_year = 2019
        end_year = 2020
    "#;

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.mode, BinningMode::Dekad);
        assert_eq!(config.variable, "sm_c4grass");
        assert_eq!(config.name_field, "NAME_3");
        assert_eq!(config.extension(), "nc");
        assert_eq!(config.raster_crs().unwrap(), Crs::Geographic);
        assert_eq!(config.boundary_crs().unwrap(), None);
        assert_eq!(config.output.layout, OutputLayout::PerUnit);
        assert_eq!(config.years().count(), 2);
    }

    #[test]
    fn test_full_file() {
        let text = format!(
            "{MINIMAL}\nmode = \"quarter\"\nextension = \".tif\"\nboundary_crs = \"EPSG:32737\"\n\n[output]\ndir = \"out\"\nlayout = \"long_form\"\n"
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.mode, BinningMode::Quarter);
        assert_eq!(config.extension(), "tif");
        assert_eq!(
            config.boundary_crs().unwrap(),
            Some(Crs::Utm { zone: 37, north: false })
        );
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert_eq!(config.output.layout, OutputLayout::LongForm);
    }

    #[test]
    fn test_validation_errors() {
        let inverted = RunConfig::new("/a", "/b.shp", 2021, 2020);
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvertedYears { .. })
        ));

        let no_var = RunConfig::new("/a", "/b.shp", 2020, 2020).with_variable(" ");
        assert!(matches!(no_var.validate(), Err(ConfigError::Empty("variable"))));

        let bad_crs = RunConfig::new("/a", "/b.shp", 2020, 2020).with_raster_crs("ESRI:102022");
        assert!(matches!(bad_crs.validate(), Err(ConfigError::Crs { .. })));

        let unknown_mode = MINIMAL.to_string() + "mode = \"weekly\"\n";
        assert!(matches!(
            RunConfig::from_toml_str(&unknown_mode),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_raster_format_by_extension() {
        let tif = RunConfig::new("/a", "/b.shp", 2020, 2020).with_extension(".TIF");
        assert_eq!(tif.raster_format().unwrap(), RasterFormat::GeoTiff);

        let err = RunConfig::new("/a", "/b.shp", 2020, 2020)
            .with_extension("grib")
            .raster_format()
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported raster extension `grib`");
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_default_extension_needs_netcdf_feature() {
        let config = RunConfig::from_toml_str(MINIMAL).unwrap();
        let err = config.raster_format().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedExtension { .. }));
        assert!(err.to_string().contains("--features netcdf"), "{err}");
    }

    #[cfg(feature = "netcdf")]
    #[test]
    fn test_default_extension_reads_netcdf() {
        let config = RunConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.raster_format().unwrap(), RasterFormat::Netcdf);
    }

    #[test]
    fn test_from_missing_file() {
        let err = RunConfig::from_toml_file(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_builders_round_trip_through_toml() {
        let config = RunConfig::new("/a", "/b.shp", 2018, 2020)
            .with_mode(BinningMode::Month)
            .with_qualifier_field("NAME_2")
            .with_output("results", OutputLayout::Pivot);
        let text = toml::to_string(&config).unwrap();
        assert_eq!(RunConfig::from_toml_str(&text).unwrap(), config);
    }
}
