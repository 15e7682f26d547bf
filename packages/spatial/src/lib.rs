#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory boundary store for suburb tagging.
//!
//! Loads named suburb polygons from a `GeoJSON` feature collection, builds
//! an R-tree over their envelopes, and answers exact point-in-polygon
//! queries. The store is immutable once built, so a single instance can be
//! shared by every chunk of a tagging run.

use std::path::Path;

use geo::{Area, BoundingRect, Contains, Coord, MapCoords, MultiPolygon};
use geojson::{FeatureCollection, GeoJson};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;
use trip_flows_trip_models::normalize_suburb_name;

/// Property that holds the polygon name when none is configured.
pub const DEFAULT_NAME_PROPERTY: &str = "name";

/// Web Mercator sphere radius in meters.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Errors that can occur while loading a boundary source.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// The boundary file could not be read.
    #[error("Failed to read boundaries from {path}: {source}")]
    Io {
        /// Path of the boundary file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The boundary file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The `GeoJSON` document is not a feature collection.
    #[error("Boundary source must be a GeoJSON FeatureCollection")]
    NotFeatureCollection,

    /// The feature collection declares a CRS we cannot reproject from.
    #[error("Unsupported boundary CRS: {crs}")]
    UnsupportedCrs {
        /// The CRS name as declared in the file.
        crs: String,
    },

    /// No feature yielded a usable named polygon.
    #[error("No named polygons found (name property \"{name_property}\")")]
    NoPolygons {
        /// The property that was searched for names.
        name_property: String,
    },
}

/// Coordinate reference system of a boundary source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceCrs {
    /// Longitude/latitude degrees (WGS84 and the Australian datums that
    /// coincide with it at street-level precision).
    Geographic,
    /// Spherical Web Mercator meters (EPSG:3857).
    WebMercator,
}

/// A suburb polygon stored in the R-tree with its metadata.
struct BoundaryEntry {
    name: String,
    /// Load order, used to break ties between equal-area overlaps.
    ordinal: usize,
    area: f64,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Named suburb polygons with point-in-polygon lookups.
pub struct BoundaryStore {
    tree: RTree<BoundaryEntry>,
}

impl BoundaryStore {
    /// Loads a `GeoJSON` feature collection from disk.
    ///
    /// `name_property` is the feature property that carries the suburb
    /// name. Features without a name or without polygonal geometry are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the file cannot be read or parsed,
    /// declares an unsupported CRS, or contains no usable polygons.
    pub fn load(path: &Path, name_property: &str) -> Result<Self, BoundaryError> {
        log::info!("Loading suburb boundaries from {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| BoundaryError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_geojson_str(&text, name_property)
    }

    /// Builds a store from `GeoJSON` text.
    ///
    /// # Errors
    ///
    /// See [`BoundaryStore::load`].
    pub fn from_geojson_str(text: &str, name_property: &str) -> Result<Self, BoundaryError> {
        let geojson: GeoJson = text.parse()?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(BoundaryError::NotFeatureCollection);
        };

        let crs = detect_crs(&collection)?;
        if crs == SourceCrs::WebMercator {
            log::info!("Reprojecting boundaries from EPSG:3857 to WGS84");
        }

        let mut polygons = Vec::with_capacity(collection.features.len());
        let mut skipped = 0_u64;

        for feature in collection.features {
            let name = feature
                .property(name_property)
                .and_then(|value| value.as_str())
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string);

            let Some(name) = name else {
                skipped += 1;
                continue;
            };

            let Some(polygon) = feature.geometry.and_then(to_multipolygon) else {
                log::warn!("Skipping boundary {name}: geometry is missing or not polygonal");
                skipped += 1;
                continue;
            };

            let polygon = match crs {
                SourceCrs::Geographic => polygon,
                SourceCrs::WebMercator => polygon.map_coords(web_mercator_to_wgs84),
            };

            polygons.push((name, polygon));
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} boundary features without a usable name or polygon");
        }

        if polygons.is_empty() {
            return Err(BoundaryError::NoPolygons {
                name_property: name_property.to_string(),
            });
        }

        Ok(Self::from_polygons(polygons))
    }

    /// Builds a store from already-projected WGS84 polygons.
    #[must_use]
    pub fn from_polygons(polygons: Vec<(String, MultiPolygon<f64>)>) -> Self {
        let entries: Vec<BoundaryEntry> = polygons
            .into_iter()
            .enumerate()
            .map(|(ordinal, (name, polygon))| BoundaryEntry {
                envelope: compute_envelope(&polygon),
                area: polygon.unsigned_area(),
                name,
                ordinal,
                polygon,
            })
            .collect();

        let store = Self {
            tree: RTree::bulk_load(entries),
        };

        let names = store.names();
        let mut normalized: Vec<String> = names.iter().map(|n| normalize_suburb_name(n)).collect();
        normalized.sort_unstable();
        normalized.dedup();
        if normalized.len() < names.len() {
            log::warn!(
                "{} boundary names collide after normalization",
                names.len() - normalized.len()
            );
        }

        log::info!("Loaded {} suburb polygons into boundary store", store.len());

        store
    }

    /// Returns the name of the polygon containing `(lat, lon)`, or `None`
    /// if no polygon contains it.
    ///
    /// Non-finite or out-of-range coordinates are never matched. Where
    /// polygons overlap, the smallest one wins.
    #[must_use]
    pub fn containing_polygon(&self, lat: f64, lon: f64) -> Option<&str> {
        if self.is_empty() || !is_valid_coordinate(lat, lon) {
            return None;
        }

        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        let mut best: Option<&BoundaryEntry> = None;

        for entry in self.tree.locate_in_envelope_intersecting(&query_env) {
            if !entry.polygon.contains(&point) {
                continue;
            }
            best = match best {
                Some(current)
                    if (current.area, current.ordinal) <= (entry.area, entry.ordinal) =>
                {
                    Some(current)
                }
                _ => Some(entry),
            };
        }

        best.map(|e| e.name.as_str())
    }

    /// Distinct polygon names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tree.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Number of polygons in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the store holds no polygons. An empty store matches nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Whether `(lat, lon)` is a finite WGS84 coordinate.
#[must_use]
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Reads the legacy `crs` member of a feature collection.
fn detect_crs(collection: &FeatureCollection) -> Result<SourceCrs, BoundaryError> {
    let Some(name) = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(|name| name.as_str())
    else {
        return Ok(SourceCrs::Geographic);
    };

    let upper = name.to_uppercase();
    if upper.ends_with("CRS84") {
        return Ok(SourceCrs::Geographic);
    }

    let code = upper
        .rsplit(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty());

    match code {
        Some("4326" | "4283" | "7844") => Ok(SourceCrs::Geographic),
        Some("3857" | "900913") => Ok(SourceCrs::WebMercator),
        _ => Err(BoundaryError::UnsupportedCrs {
            crs: name.to_string(),
        }),
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

fn web_mercator_to_wgs84(coord: Coord<f64>) -> Coord<f64> {
    let lon = (coord.x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = 2.0f64
        .mul_add(
            (coord.y / WEB_MERCATOR_RADIUS).exp().atan(),
            -std::f64::consts::FRAC_PI_2,
        )
        .to_degrees();
    Coord { x: lon, y: lat }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_feature(name: &str, min_lon: f64, min_lat: f64, size: f64) -> String {
        let max_lon = min_lon + size;
        let max_lat = min_lat + size;
        format!(
            r#"{{"type":"Feature","properties":{{"name":"{name}"}},"geometry":{{"type":"Polygon","coordinates":[[[{min_lon},{min_lat}],[{max_lon},{min_lat}],[{max_lon},{max_lat}],[{min_lon},{max_lat}],[{min_lon},{min_lat}]]]}}}}"#
        )
    }

    fn collection(features: &[String], crs: Option<&str>) -> String {
        let crs = crs.map_or_else(String::new, |name| {
            format!(r#""crs":{{"type":"name","properties":{{"name":"{name}"}}}},"#)
        });
        format!(
            r#"{{"type":"FeatureCollection",{crs}"features":[{}]}}"#,
            features.join(",")
        )
    }

    fn two_suburbs() -> BoundaryStore {
        let text = collection(
            &[
                square_feature("SPRING HILL", 153.00, -27.50, 0.05),
                square_feature("NEW FARM", 153.10, -27.50, 0.05),
            ],
            None,
        );
        BoundaryStore::from_geojson_str(&text, DEFAULT_NAME_PROPERTY).unwrap()
    }

    #[test]
    fn finds_polygon_strictly_containing_point() {
        let store = two_suburbs();
        assert_eq!(store.containing_polygon(-27.47, 153.02), Some("SPRING HILL"));
        assert_eq!(store.containing_polygon(-27.47, 153.12), Some("NEW FARM"));
    }

    #[test]
    fn point_outside_all_polygons_is_unmatched() {
        let store = two_suburbs();
        assert_eq!(store.containing_polygon(-27.47, 153.07), None);
        assert_eq!(store.containing_polygon(-33.86, 151.20), None);
    }

    #[test]
    fn invalid_coordinates_are_unmatched() {
        let store = two_suburbs();
        assert_eq!(store.containing_polygon(f64::NAN, 153.02), None);
        assert_eq!(store.containing_polygon(-27.47, f64::INFINITY), None);
        assert_eq!(store.containing_polygon(-127.47, 153.02), None);
        assert_eq!(store.containing_polygon(-27.47, 253.02), None);
    }

    #[test]
    fn smallest_overlapping_polygon_wins() {
        let text = collection(
            &[
                square_feature("BRISBANE CITY", 152.90, -27.60, 0.40),
                square_feature("SPRING HILL", 153.00, -27.50, 0.05),
            ],
            None,
        );
        let store = BoundaryStore::from_geojson_str(&text, "name").unwrap();
        assert_eq!(store.containing_polygon(-27.47, 153.02), Some("SPRING HILL"));
        assert_eq!(store.containing_polygon(-27.30, 153.25), Some("BRISBANE CITY"));
    }

    #[test]
    fn reprojects_web_mercator_sources() {
        // 153.0 E, 27.5 S and a 0.1 degree square, expressed in EPSG:3857.
        let x0 = 153.0_f64.to_radians() * WEB_MERCATOR_RADIUS;
        let x1 = 153.1_f64.to_radians() * WEB_MERCATOR_RADIUS;
        let y = |lat: f64| {
            WEB_MERCATOR_RADIUS
                * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                    .tan()
                    .ln()
        };
        let (y0, y1) = (y(-27.5), y(-27.4));
        let feature = format!(
            r#"{{"type":"Feature","properties":{{"name":"MERCATOR"}},"geometry":{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}}}"#
        );
        let text = collection(&[feature], Some("urn:ogc:def:crs:EPSG::3857"));

        let store = BoundaryStore::from_geojson_str(&text, "name").unwrap();
        assert_eq!(store.containing_polygon(-27.45, 153.05), Some("MERCATOR"));
        assert_eq!(store.containing_polygon(-27.55, 153.05), None);
    }

    #[test]
    fn accepts_geographic_crs_declarations() {
        for crs in ["urn:ogc:def:crs:OGC:1.3:CRS84", "EPSG:4283", "EPSG:7844"] {
            let text = collection(&[square_feature("A", 153.0, -27.5, 0.1)], Some(crs));
            let store = BoundaryStore::from_geojson_str(&text, "name").unwrap();
            assert_eq!(store.containing_polygon(-27.45, 153.05), Some("A"));
        }
    }

    #[test]
    fn rejects_unsupported_crs() {
        let text = collection(
            &[square_feature("A", 153.0, -27.5, 0.1)],
            Some("urn:ogc:def:crs:EPSG::28356"),
        );
        let result = BoundaryStore::from_geojson_str(&text, "name");
        assert!(matches!(result, Err(BoundaryError::UnsupportedCrs { .. })));
    }

    #[test]
    fn skips_features_without_names() {
        let text = collection(
            &[
                square_feature("A", 153.0, -27.5, 0.1),
                square_feature("", 153.2, -27.5, 0.1),
            ],
            None,
        );
        let store = BoundaryStore::from_geojson_str(&text, "name").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.names(), vec!["A"]);
    }

    #[test]
    fn empty_store_matches_nothing() {
        let store = BoundaryStore::from_polygons(Vec::new());
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.containing_polygon(-27.47, 153.02), None);
        assert!(!two_suburbs().is_empty());
    }

    #[test]
    fn fails_when_name_property_is_absent() {
        let text = collection(&[square_feature("A", 153.0, -27.5, 0.1)], None);
        let result = BoundaryStore::from_geojson_str(&text, "adminareaname");
        assert!(matches!(result, Err(BoundaryError::NoPolygons { .. })));
    }

    #[test]
    fn rejects_bare_geometry() {
        let text = r#"{"type":"Point","coordinates":[153.0,-27.5]}"#;
        let result = BoundaryStore::from_geojson_str(text, "name");
        assert!(matches!(result, Err(BoundaryError::NotFeatureCollection)));
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let path = std::env::temp_dir().join("trip_flows_missing_boundaries.geojson");
        let _ = std::fs::remove_file(&path);
        let result = BoundaryStore::load(&path, "name");
        assert!(matches!(result, Err(BoundaryError::Io { .. })));
    }
}
