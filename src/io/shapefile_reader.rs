//! Boundary shapefile reader.
//!
//! Loads named administrative polygons from an ESRI shapefile into a
//! [`BoundarySet`]. The unit name comes from a DBF attribute (`NAME_3` for
//! ward-level GADM layers) and the reference system from the sibling `.prj`.
//!
//! Ward names repeat across counties in GADM layers. Repeated names are made
//! unique on load: with a qualifier field (e.g. `NAME_2`) every repeat
//! becomes `Name (Qualifier)`, otherwise later repeats get ` (2)`, ` (3)`...
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use raster_ward::io::read_boundary_shapefile;
//!
//! let wards = read_boundary_shapefile(
//!     Path::new("data/kenya_wards.shp"),
//!     "NAME_3",
//!     Some("NAME_2"),
//!     None,
//! )?;
//! println!("{} wards in {}", wards.len(), wards.crs());
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use geo::{Coord, LineString, MultiPolygon, Polygon};
use shapefile::dbase::{FieldValue, Record};
use shapefile::{PolygonRing, Reader, Shape};
use thiserror::Error;
use tracing::{debug, warn};

use crate::boundary::{BoundaryError, BoundarySet, BoundaryUnit};
use crate::grid::{Crs, CrsError};

/// Error type for boundary shapefile loading.
#[derive(Debug, Error)]
pub enum ShapefileError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shapefile parsing error
    #[error("shapefile error: {0}")]
    Shapefile(String),

    /// Neither a `.prj` nor an explicit reference system
    #[error("no reference system for {0}: add a .prj file or set boundary_crs")]
    MissingCrs(PathBuf),

    /// The `.prj` or override could not be interpreted
    #[error("reference system: {0}")]
    Crs(#[from] CrsError),

    /// The polygons do not form a valid boundary set
    #[error("boundary set: {0}")]
    Boundary(#[from] BoundaryError),
}

impl From<shapefile::Error> for ShapefileError {
    fn from(e: shapefile::Error) -> Self {
        ShapefileError::Shapefile(e.to_string())
    }
}

/// Read a boundary set from a polygon shapefile.
///
/// `crs_override` takes precedence over the `.prj`. Records without a name
/// or with a non-polygon shape are skipped with a warning. Repeated names
/// get the `qualifier_field` value or a counter appended.
pub fn read_boundary_shapefile(
    path: &Path,
    name_field: &str,
    qualifier_field: Option<&str>,
    crs_override: Option<Crs>,
) -> Result<BoundarySet, ShapefileError> {
    let crs = match crs_override {
        Some(crs) => crs,
        None => read_prj(path)?,
    };

    let mut reader = Reader::from_path(path)?;
    let mut raw = Vec::new();

    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result?;

        let Some(name) = record_name(&record, name_field) else {
            warn!(record = index, field = name_field, "boundary record has no name, skipped");
            continue;
        };

        let geometry = match shape {
            Shape::Polygon(polygon) => rings_to_multipolygon(polygon.rings(), |p| Coord { x: p.x, y: p.y }),
            Shape::PolygonM(polygon) => rings_to_multipolygon(polygon.rings(), |p| Coord { x: p.x, y: p.y }),
            Shape::PolygonZ(polygon) => rings_to_multipolygon(polygon.rings(), |p| Coord { x: p.x, y: p.y }),
            other => {
                warn!(unit = %name, shape = ?other.shapetype(), "non-polygon boundary shape, skipped");
                continue;
            }
        };

        let qualifier = qualifier_field.and_then(|field| record_name(&record, field));
        raw.push(RawUnit {
            record: index,
            name,
            qualifier,
            geometry,
        });
    }

    unique_names(&mut raw);

    let mut units = Vec::with_capacity(raw.len());
    for RawUnit { name, geometry, .. } in raw {
        match BoundaryUnit::new(name.clone(), geometry) {
            Ok(unit) => units.push(unit),
            Err(e) => warn!(unit = %name, error = %e, "boundary unit skipped"),
        }
    }

    debug!(path = %path.display(), units = units.len(), %crs, "read boundary shapefile");
    Ok(BoundarySet::new(units, crs)?)
}

/// A named record before names are made unique.
struct RawUnit {
    record: usize,
    name: String,
    qualifier: Option<String>,
    geometry: MultiPolygon<f64>,
}

/// Rename units whose name is shared with another record.
///
/// Unique names are kept. A repeated name takes its qualifier in brackets
/// when there is one; otherwise the first record keeps the bare name. A
/// numeric suffix settles whatever still collides.
fn unique_names(units: &mut [RawUnit]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for unit in units.iter() {
        *counts.entry(unit.name.clone()).or_default() += 1;
    }
    let repeated = |name: &str| counts.get(name).is_some_and(|n| *n > 1);

    let mut taken: HashSet<String> = units
        .iter()
        .filter(|u| !repeated(&u.name))
        .map(|u| u.name.clone())
        .collect();

    for unit in units.iter_mut() {
        if !repeated(&unit.name) {
            continue;
        }
        let base = unit.name.clone();
        let mut candidate = match &unit.qualifier {
            Some(q) => format!("{base} ({q})"),
            None => base.clone(),
        };
        let mut n = 2;
        while taken.contains(&candidate) {
            candidate = format!("{base} ({n})");
            n += 1;
        }
        if candidate != base {
            warn!(record = unit.record, from = %base, to = %candidate, "repeated boundary name renamed");
        }
        taken.insert(candidate.clone());
        unit.name = candidate;
    }
}

/// Reference system from the sibling `.prj`.
fn read_prj(shp: &Path) -> Result<Crs, ShapefileError> {
    let prj = shp.with_extension("prj");
    if !prj.exists() {
        return Err(ShapefileError::MissingCrs(shp.to_path_buf()));
    }
    let wkt = std::fs::read_to_string(&prj)?;
    Ok(Crs::from_wkt(&wkt)?)
}

fn record_name(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        FieldValue::Numeric(Some(n)) => Some(n.to_string()),
        FieldValue::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

/// Group rings into polygons: each outer ring starts a polygon, inner rings
/// become holes of the preceding one.
fn rings_to_multipolygon<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> Coord<f64>) -> MultiPolygon<f64> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();

    for ring in rings {
        let line: LineString<f64> = ring.points().iter().map(&xy).collect();
        match ring {
            PolygonRing::Outer(_) => polygons.push((line, Vec::new())),
            PolygonRing::Inner(_) => match polygons.last_mut() {
                Some((_, holes)) => holes.push(line),
                // A hole before any outer ring is treated as an outer ring
                None => polygons.push((line, Vec::new())),
            },
        }
    }

    MultiPolygon(
        polygons
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapefile::dbase::{FieldName, TableWriterBuilder};
    use shapefile::{Point, Writer};

    const UTM37S_PRJ: &str = r#"PROJCS["WGS_1984_UTM_Zone_37S",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],UNIT["Meter",1.0]]"#;

    fn square(x0: f64, y0: f64, size: f64) -> shapefile::Polygon {
        shapefile::Polygon::new(PolygonRing::Outer(vec![
            Point::new(x0, y0),
            Point::new(x0, y0 + size),
            Point::new(x0 + size, y0 + size),
            Point::new(x0 + size, y0),
            Point::new(x0, y0),
        ]))
    }

    fn write_wards(path: &Path, wards: &[(&str, shapefile::Polygon)]) {
        let field = FieldName::try_from("NAME_3").unwrap();
        let table = TableWriterBuilder::new().add_character_field(field, 50);
        let mut writer = Writer::from_path(path, table).unwrap();
        for (name, polygon) in wards {
            let mut record = Record::default();
            record.insert(
                "NAME_3".to_string(),
                FieldValue::Character(Some(name.to_string())),
            );
            writer.write_shape_and_record(polygon, &record).unwrap();
        }
    }

    #[test]
    fn test_read_wards_with_prj() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("wards.shp");
        write_wards(
            &shp,
            &[("Ward A", square(0.0, 0.0, 10.0)), ("Ward B", square(20.0, 0.0, 10.0))],
        );
        std::fs::write(dir.path().join("wards.prj"), UTM37S_PRJ).unwrap();

        let set = read_boundary_shapefile(&shp, "NAME_3", None, None).unwrap();
        assert_eq!(set.crs(), Crs::Utm { zone: 37, north: false });
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["Ward A", "Ward B"]);

        let a = set.get("Ward A").unwrap();
        let c = a.representative_point();
        assert!((c.x() - 5.0).abs() < 1e-9 && (c.y() - 5.0).abs() < 1e-9);
        assert!(set.covers(25.0, 5.0));
        assert!(!set.covers(15.0, 5.0));
    }

    #[test]
    fn test_override_and_missing_crs() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("wards.shp");
        write_wards(&shp, &[("Ward A", square(36.0, -2.0, 1.0))]);

        let err = read_boundary_shapefile(&shp, "NAME_3", None, None).unwrap_err();
        assert!(matches!(err, ShapefileError::MissingCrs(_)));

        let set = read_boundary_shapefile(&shp, "NAME_3", None, Some(Crs::WGS84)).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.crs(), Crs::Geographic);
    }

    #[test]
    fn test_repeated_names_get_a_counter() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("dup.shp");
        write_wards(
            &shp,
            &[
                ("Ward A", square(0.0, 0.0, 1.0)),
                ("Ward A", square(5.0, 0.0, 1.0)),
                ("Ward B", square(10.0, 0.0, 1.0)),
            ],
        );

        let set = read_boundary_shapefile(&shp, "NAME_3", None, Some(Crs::WGS84)).unwrap();
        assert_eq!(
            set.names().collect::<Vec<_>>(),
            vec!["Ward A", "Ward A (2)", "Ward B"]
        );
        // Record order decides which polygon keeps the bare name
        assert!(set.get("Ward A").unwrap().covers(0.5, 0.5));
        assert!(set.get("Ward A (2)").unwrap().covers(5.5, 0.5));
    }

    #[test]
    fn test_repeated_names_take_the_qualifier() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("gadm.shp");
        let table = TableWriterBuilder::new()
            .add_character_field(FieldName::try_from("NAME_2").unwrap(), 50)
            .add_character_field(FieldName::try_from("NAME_3").unwrap(), 50);
        let mut writer = Writer::from_path(&shp, table).unwrap();
        for (county, ward, x0) in [
            ("Nairobi", "Central", 0.0),
            ("Kisumu", "Central", 5.0),
            ("Kisumu", "Kondele", 10.0),
        ] {
            let mut record = Record::default();
            record.insert("NAME_2".to_string(), FieldValue::Character(Some(county.to_string())));
            record.insert("NAME_3".to_string(), FieldValue::Character(Some(ward.to_string())));
            writer.write_shape_and_record(&square(x0, 0.0, 1.0), &record).unwrap();
        }
        drop(writer);

        let set = read_boundary_shapefile(&shp, "NAME_3", Some("NAME_2"), Some(Crs::WGS84)).unwrap();
        assert_eq!(
            set.names().collect::<Vec<_>>(),
            vec!["Central (Nairobi)", "Central (Kisumu)", "Kondele"]
        );
    }

    #[test]
    fn test_unique_names_falls_back_to_counter() {
        let unit = |record: usize, name: &str, qualifier: Option<&str>| RawUnit {
            record,
            name: name.to_string(),
            qualifier: qualifier.map(str::to_string),
            geometry: MultiPolygon(Vec::new()),
        };
        // Same name and same qualifier twice, plus a unit already called "X (2)"
        let mut units = vec![
            unit(0, "X", Some("Q")),
            unit(1, "X", Some("Q")),
            unit(2, "X (2)", None),
        ];
        unique_names(&mut units);
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["X (Q)", "X (3)", "X (2)"]);
    }

    #[test]
    fn test_rings_to_multipolygon_holes() {
        let outer = PolygonRing::Outer(vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 4.0),
            Point::new(4.0, 4.0),
            Point::new(4.0, 0.0),
            Point::new(0.0, 0.0),
        ]);
        let hole = PolygonRing::Inner(vec![
            Point::new(1.0, 1.0),
            Point::new(3.0, 1.0),
            Point::new(3.0, 3.0),
            Point::new(1.0, 3.0),
            Point::new(1.0, 1.0),
        ]);
        let mp = rings_to_multipolygon(&[outer, hole], |p: &Point| Coord { x: p.x, y: p.y });
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
    }
}
