//! GeoTIFF raster loader.
//!
//! Reads single-band GeoTIFFs with the pure Rust `tiff` crate, so no system
//! GDAL is required. Georeferencing comes from ModelPixelScale (tag 33550)
//! and ModelTiepoint (tag 33922); the reference system from the
//! GeoKeyDirectory (tag 34735) when it names an EPSG code; the nodata
//! sentinel from GDAL_NODATA (tag 42113).
//!
//! The TIFF DateTime tag records when the file was written, not when the
//! data was observed, so slices carry no timestamp and are binned from their
//! place in the archive.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use raster_ward::grid::Crs;
//! use raster_ward::io::{GeoTiffLoader, RasterLoader};
//!
//! let loader = GeoTiffLoader::new(Crs::WGS84);
//! let slices = loader.load(Path::new("data/2020/01/sm-dk1.tif"))?;
//! println!("{:?}", slices[0].grid.value_range());
//! ```

use std::fs::File;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;

use super::raster_loader::{has_extension, RasterError, RasterLoader};
use crate::grid::{Crs, Grid, TimeSlice};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_RASTER_TYPE_KEY: u32 = 1025;
const GEOGRAPHIC_TYPE_KEY: u32 = 2048;
const PROJECTED_CS_TYPE_KEY: u32 = 3072;
const RASTER_PIXEL_IS_POINT: u32 = 2;
/// GeoKey value meaning "user defined"
const USER_DEFINED: u32 = 32767;

/// Loader for `.tif` / `.tiff` rasters.
#[derive(Debug, Clone)]
pub struct GeoTiffLoader {
    default_crs: Crs,
}

impl GeoTiffLoader {
    /// `default_crs` applies when the file carries no usable GeoKeys.
    pub fn new(default_crs: Crs) -> Self {
        Self { default_crs }
    }

    /// Read the file's single slice.
    pub fn read(&self, path: &Path) -> Result<TimeSlice, RasterError> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(file)?;

        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(RasterError::UnsupportedDataType(format!(
                    "{other:?} (expected a single band)"
                )))
            }
        }

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);

        let pixel_scale = decoder
            .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
            .ok();
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
            .ok();
        let geo_keys = decoder
            .get_tag_u32_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
            .ok()
            .map(|d| parse_geo_keys(&d))
            .unwrap_or_default();

        let (Some(scale), Some(tiepoint)) = (pixel_scale, tiepoint) else {
            return Err(RasterError::MissingGeotransform(
                "no ModelPixelScale/ModelTiepoint tags".to_string(),
            ));
        };
        // ModelTiepoint: [I, J, K, X, Y, Z]; ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
        if tiepoint.len() < 6 || scale.len() < 2 || scale[0] <= 0.0 || scale[1] <= 0.0 {
            return Err(RasterError::MissingGeotransform(format!(
                "invalid tiepoint {tiepoint:?} / scale {scale:?}"
            )));
        }

        let pixel_is_point = geo_key(&geo_keys, GT_RASTER_TYPE_KEY) == Some(RASTER_PIXEL_IS_POINT);
        let centre = if pixel_is_point { 0.0 } else { 0.5 };
        let (tie_i, tie_j) = (tiepoint[0], tiepoint[1]);
        let (origin_x, origin_y) = (tiepoint[3], tiepoint[4]);

        let x: Vec<f64> = (0..width)
            .map(|c| origin_x + (c as f64 - tie_i + centre) * scale[0])
            .collect();
        let y: Vec<f64> = (0..height)
            .map(|r| origin_y - (r as f64 - tie_j + centre) * scale[1])
            .collect();

        let crs = crs_from_geo_keys(&geo_keys).unwrap_or(self.default_crs);

        let nodata = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f64>().ok());

        let values = decode_values(decoder.read_image()?);
        let grid = Grid::new(x, y, values, crs)?.with_nodata(nodata);

        Ok(TimeSlice::new(None, grid))
    }
}

impl RasterLoader for GeoTiffLoader {
    fn load(&self, path: &Path) -> Result<Vec<TimeSlice>, RasterError> {
        Ok(vec![self.read(path)?])
    }

    fn accepts(&self, path: &Path) -> bool {
        has_extension(path, &["tif", "tiff"])
    }
}

fn decode_values(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F64(data) => data,
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
    }
}

/// Inline-valued keys of a GeoKeyDirectory as (key id, value) pairs.
fn parse_geo_keys(directory: &[u32]) -> Vec<(u32, u32)> {
    // Header: [version, revision, minor, count], then [id, location, count, value] per key
    let Some(&count) = directory.get(3) else {
        return Vec::new();
    };
    directory[4..]
        .chunks_exact(4)
        .take(count as usize)
        .filter(|k| k[1] == 0)
        .map(|k| (k[0], k[3]))
        .collect()
}

fn geo_key(keys: &[(u32, u32)], id: u32) -> Option<u32> {
    keys.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
}

fn crs_from_geo_keys(keys: &[(u32, u32)]) -> Option<Crs> {
    [PROJECTED_CS_TYPE_KEY, GEOGRAPHIC_TYPE_KEY]
        .iter()
        .filter_map(|id| geo_key(keys, *id))
        .find(|code| *code != 0 && *code != USER_DEFINED)
        .map(Crs::from_epsg)
}
