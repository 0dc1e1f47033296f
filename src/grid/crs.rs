//! Coordinate reference systems.
//!
//! Every grid and boundary set carries an explicit [`Crs`]. Transforms are
//! only defined between geographic WGS84 and the WGS84 UTM zones; anything
//! else must already match or is rejected.
//!
//! # Example
//!
//! ```
//! use raster_ward::grid::Crs;
//!
//! let wgs84 = Crs::parse("EPSG:4326").unwrap();
//! let utm37s = Crs::parse("epsg:32737").unwrap();
//!
//! let (x, y) = Crs::transform(&wgs84, &utm37s, 36.8, -1.3).unwrap();
//! assert!(x > 200_000.0 && x < 300_000.0);
//! assert!(y > 9_000_000.0);
//! ```

use std::fmt;

use thiserror::Error;

use super::utm::{Projection, UtmZone};

/// Error type for reference system operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrsError {
    /// The text does not name a reference system we recognise
    #[error("unrecognised reference system: {0}")]
    Unrecognised(String),

    /// No transform is defined between the two systems
    #[error("no transform defined from {from} to {to}")]
    NoTransform { from: String, to: String },
}

/// A coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// WGS84 longitude/latitude (EPSG:4326)
    Geographic,
    /// WGS84 UTM zone (EPSG:326zz north, EPSG:327zz south)
    Utm { zone: u8, north: bool },
    /// Any other EPSG code, carried without transform support
    Epsg(u32),
}

impl Crs {
    /// WGS84, the default for rasters that do not declare a system.
    pub const WGS84: Crs = Crs::Geographic;

    /// Build from an EPSG code.
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Geographic,
            32601..=32660 => Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            },
            32701..=32760 => Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            },
            other => Crs::Epsg(other),
        }
    }

    /// EPSG code of this system.
    pub fn epsg(&self) -> u32 {
        match *self {
            Crs::Geographic => 4326,
            Crs::Utm { zone, north: true } => 32600 + zone as u32,
            Crs::Utm { zone, north: false } => 32700 + zone as u32,
            Crs::Epsg(code) => code,
        }
    }

    /// Parse `EPSG:4326`, `epsg:32737` or a bare code.
    pub fn parse(text: &str) -> Result<Self, CrsError> {
        let trimmed = text.trim();
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(CrsError::Unrecognised(trimmed.to_string())),
            None => trimmed,
        };
        code.trim()
            .parse::<u32>()
            .map(Self::from_epsg)
            .map_err(|_| CrsError::Unrecognised(trimmed.to_string()))
    }

    /// Recognise an ESRI/OGC WKT definition, as found in shapefile `.prj` files.
    ///
    /// Handles geographic WGS84 and WGS84 UTM zones. An `AUTHORITY["EPSG", ...]`
    /// clause on the outermost definition wins when present.
    pub fn from_wkt(wkt: &str) -> Result<Self, CrsError> {
        let upper = wkt.to_ascii_uppercase();

        if let Some(code) = outer_authority_code(&upper) {
            return Ok(Self::from_epsg(code));
        }

        if upper.trim_start().starts_with("PROJCS") {
            if let Some(pos) = upper.find("UTM") {
                let tail = &upper[pos..];
                if let Some(zone_pos) = tail.find("ZONE") {
                    let rest = tail[zone_pos + 4..].trim_start_matches(|c: char| c == '_' || c == ' ');
                    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                    let hemisphere = rest[digits.len()..].chars().next();
                    if let (Ok(zone), Some(h)) = (digits.parse::<u8>(), hemisphere) {
                        if (1..=60).contains(&zone) && (h == 'N' || h == 'S') {
                            return Ok(Crs::Utm {
                                zone,
                                north: h == 'N',
                            });
                        }
                    }
                }
            }
            return Err(CrsError::Unrecognised(first_line(wkt)));
        }

        if upper.trim_start().starts_with("GEOGCS") && upper.contains("WGS") {
            return Ok(Crs::Geographic);
        }

        Err(CrsError::Unrecognised(first_line(wkt)))
    }

    /// Transform a single coordinate from one system to another.
    ///
    /// Geographic coordinates are (x = longitude, y = latitude).
    pub fn transform(from: &Crs, to: &Crs, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        if from == to {
            return Ok((x, y));
        }

        let no_transform = || CrsError::NoTransform {
            from: from.to_string(),
            to: to.to_string(),
        };

        // Go through geographic coordinates
        let (lon, lat) = match *from {
            Crs::Geographic => (x, y),
            Crs::Utm { zone, north } => UtmZone::new(zone, north).inverse(x, y),
            Crs::Epsg(_) => return Err(no_transform()),
        };

        match *to {
            Crs::Geographic => Ok((lon, lat)),
            Crs::Utm { zone, north } => Ok(UtmZone::new(zone, north).forward(lon, lat)),
            Crs::Epsg(_) => Err(no_transform()),
        }
    }

    /// Check that a transform is defined without transforming anything.
    pub fn check_transform(from: &Crs, to: &Crs) -> Result<(), CrsError> {
        let supported = |c: &Crs| !matches!(c, Crs::Epsg(_));
        if from == to || (supported(from) && supported(to)) {
            Ok(())
        } else {
            Err(CrsError::NoTransform {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Crs::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl std::str::FromStr for Crs {
    type Err = CrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Crs::parse(s)
    }
}

/// EPSG code from the last `AUTHORITY["EPSG","nnnn"]` clause, which in WKT1
/// belongs to the outermost definition.
fn outer_authority_code(upper: &str) -> Option<u32> {
    let pos = upper.rfind("AUTHORITY[")?;
    let clause = &upper[pos..];
    let end = clause.find(']')?;
    let parts: Vec<&str> = clause["AUTHORITY[".len()..end]
        .split(',')
        .map(|p| p.trim().trim_matches('"'))
        .collect();
    match parts.as_slice() {
        ["EPSG", code] => code.parse().ok(),
        _ => None,
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().chars().take(80).collect()
}
