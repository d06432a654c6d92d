//! Postal-area boundary index
//!
//! Loads the reference boundary dataset once, keeps only the postal-code
//! identifier and the boundary of each record, and merges boundaries on demand.

use crate::codec::{self, ZoneShape};
use crate::{Crs, Result, ZoneError};
use geo::{Coord, LineString, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonValue, Value};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Property names accepted as the postal-code identifier, compared case-insensitively
pub const IDENTIFIER_COLUMNS: [&str; 3] = ["CFSAUID", "FSA", "ZIP"];

/// Shape of a Canadian forward sortation area (letter, digit, letter)
static POSTAL_CODE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]\d[A-Z]").expect("postal-code pattern is valid"));

/// A single postal area: exterior rings of its boundary
#[derive(Debug, Clone)]
struct PostalArea {
    parts: Vec<Polygon<f64>>,
}

/// Outcome of resolving a set of postal codes
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Merged geometry, `None` when nothing resolved or the merge degenerated
    pub shape: Option<ZoneShape>,
    /// Identifiers found in the index
    pub resolved: Vec<String>,
    /// Identifiers not present in the index
    pub missing: Vec<String>,
}

impl Resolution {
    /// Whether the merge produced geometry
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.shape.is_some()
    }
}

/// Read-only index from postal-code identifier to boundary polygon
#[derive(Debug, Clone, Default)]
pub struct ZoneLookup {
    areas: HashMap<String, PostalArea>,
}

/// Normalize an identifier the way the index stores it
#[inline]
pub(crate) fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_uppercase()
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ZoneLookup {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a boundary
    ///
    /// Only polygonal geometry is kept, holes are discarded. Returns `false`
    /// when the geometry has no polygonal content. A later insert for the same
    /// identifier replaces the earlier one.
    pub fn insert(&mut self, identifier: &str, geometry: geo::Geometry<f64>) -> bool {
        let key = normalize_identifier(identifier);
        if key.is_empty() {
            return false;
        }
        let Some(shape) = codec::normalize(geometry) else {
            return false;
        };
        let parts = codec::strip_holes(shape).into_multi_polygon().0;
        if self.areas.insert(key.clone(), PostalArea { parts }).is_some() {
            tracing::debug!("Duplicate boundary for {key}, keeping the last one");
        }
        true
    }

    /// Load a boundary dataset from a GeoJSON file
    pub fn from_path<P: AsRef<Path>>(path: P, crs_override: Option<Crs>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_geojson_str(&text, crs_override)
    }

    /// Load a boundary dataset from GeoJSON text
    ///
    /// The source reference comes from `crs_override`, then from the legacy
    /// `crs` member of the collection, and defaults to EPSG:4326.
    pub fn from_geojson_str(text: &str, crs_override: Option<Crs>) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("lookup::from_geojson_str");

        let collection = match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => collection,
            GeoJson::Feature(feature) => FeatureCollection {
                bbox: None,
                features: vec![feature],
                foreign_members: None,
            },
            GeoJson::Geometry(_) => {
                return Err(ZoneError::Format(
                    "boundary dataset must be a FeatureCollection".to_string(),
                ));
            }
        };

        let crs = match crs_override {
            Some(crs) => crs,
            None => match declared_crs(&collection) {
                Some(name) => Crs::parse(&name)?,
                None => Crs::Wgs84,
            },
        };

        let column = find_identifier_column(&collection.features)?;
        tracing::info!(
            "Loading {} boundary records (identifier column {column}, source {crs})",
            collection.features.len()
        );

        // Reproject in parallel, insert sequentially so the last duplicate wins
        let records: Vec<(String, Vec<Polygon<f64>>)> = collection
            .features
            .par_iter()
            .filter_map(|feature| {
                let identifier = identifier_of(feature, &column)?;
                let parts = boundary_parts(feature, crs);
                if parts.is_empty() {
                    tracing::warn!("Boundary record {identifier} has no polygon geometry");
                    return None;
                }
                Some((identifier, parts))
            })
            .collect();

        let mut lookup = Self::new();
        for (identifier, parts) in records {
            let geometry = geo::Geometry::MultiPolygon(geo::MultiPolygon::new(parts));
            lookup.insert(&identifier, geometry);
        }

        tracing::info!("Boundary index ready with {} postal areas", lookup.len());
        Ok(lookup)
    }

    /// Merge the boundaries of the given identifiers
    ///
    /// Blank and repeated identifiers are ignored. Unknown identifiers are
    /// reported in [`Resolution::missing`] and left out of the merge.
    pub fn resolve<I, S>(&self, identifiers: I) -> Resolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut polygons: Vec<&Polygon<f64>> = Vec::new();
        let mut resolution = Resolution::default();

        for identifier in identifiers {
            let key = normalize_identifier(identifier.as_ref());
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            match self.areas.get(&key) {
                Some(area) => {
                    polygons.extend(area.parts.iter());
                    resolution.resolved.push(key);
                }
                None => resolution.missing.push(key),
            }
        }

        if !resolution.missing.is_empty() {
            tracing::warn!(
                "Postal codes not found in boundary dataset: {}",
                resolution.missing.join(", ")
            );
        }

        if !polygons.is_empty() {
            resolution.shape = codec::merge(polygons);
            if resolution.shape.is_none() {
                tracing::warn!(
                    "Merging {} produced no polygonal geometry",
                    resolution.resolved.join(", ")
                );
            }
        }

        resolution
    }

    /// Boundary of a single identifier
    pub fn boundary_of(&self, identifier: &str) -> Option<ZoneShape> {
        self.areas
            .get(&normalize_identifier(identifier))
            .and_then(|area| ZoneShape::from_parts(area.parts.clone()))
    }

    /// Whether the identifier is known
    #[inline]
    pub fn contains(&self, identifier: &str) -> bool {
        self.areas.contains_key(&normalize_identifier(identifier))
    }

    /// Sorted list of all known identifiers
    pub fn known_identifiers(&self) -> Vec<&str> {
        let mut identifiers: Vec<&str> = self.areas.keys().map(String::as_str).collect();
        identifiers.sort_unstable();
        identifiers
    }

    /// Number of postal areas
    #[inline]
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Check if the index is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

/// Find the property holding the postal-code identifier
///
/// Exact (case-insensitive) match against [`IDENTIFIER_COLUMNS`] first, then
/// the first string property whose value looks like a postal code in any record.
pub fn find_identifier_column(features: &[Feature]) -> Result<String> {
    let mut names: Vec<&String> = Vec::new();
    for feature in features {
        if let Some(properties) = &feature.properties {
            for name in properties.keys() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }

    if let Some(name) = names
        .iter()
        .find(|name| IDENTIFIER_COLUMNS.contains(&name.to_uppercase().as_str()))
    {
        return Ok((*name).clone());
    }

    names
        .into_iter()
        .find(|name| {
            features.iter().any(|feature| {
                feature
                    .property(name.as_str())
                    .and_then(JsonValue::as_str)
                    .is_some_and(|value| POSTAL_CODE_SHAPE.is_match(value))
            })
        })
        .cloned()
        .ok_or(ZoneError::MissingIdentifierColumn)
}

/// CRS name declared through the legacy GeoJSON `crs` member
fn declared_crs(collection: &FeatureCollection) -> Option<String> {
    collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

fn identifier_of(feature: &Feature, column: &str) -> Option<String> {
    let identifier = match feature.property(column)? {
        JsonValue::String(s) => normalize_identifier(s),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    (!identifier.is_empty()).then_some(identifier)
}

/// Exterior rings of a feature's polygonal geometry, reprojected to EPSG:4326
fn boundary_parts(feature: &Feature, crs: Crs) -> Vec<Polygon<f64>> {
    let Some(geometry) = &feature.geometry else {
        return Vec::new();
    };
    let polygons: Vec<&Vec<Vec<Vec<f64>>>> = match &geometry.value {
        Value::Polygon(rings) => vec![rings],
        Value::MultiPolygon(polygons) => polygons.iter().collect(),
        _ => Vec::new(),
    };

    polygons
        .into_iter()
        .filter_map(|rings| {
            let exterior: Vec<Coord<f64>> = rings
                .first()?
                .iter()
                .filter_map(|position| match position.as_slice() {
                    [x, y, ..] => Some(crs.to_wgs84(Coord { x: *x, y: *y })),
                    _ => None,
                })
                .collect();
            (exterior.len() >= 3).then(|| Polygon::new(LineString::from(exterior), Vec::new()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use serde_json::json;

    fn square(x: f64, y: f64) -> geo::Geometry<f64> {
        geo::Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
        ])
    }

    fn test_lookup() -> ZoneLookup {
        let mut lookup = ZoneLookup::new();
        assert!(lookup.insert("H9S", square(0.0, 0.0)));
        assert!(lookup.insert("h9t ", square(1.0, 0.0)));
        assert!(lookup.insert("H9W", square(5.0, 5.0)));
        lookup
    }

    #[test]
    fn test_resolve_adjacent_areas_merge() {
        let lookup = test_lookup();
        let resolution = lookup.resolve(["H9S", "H9T"]);
        let shape = resolution.shape.unwrap();
        assert_eq!(shape.part_count(), 1);
        assert!((shape.area() - 2.0).abs() < 1e-9);
        let bounds = shape.bounding_rect().unwrap();
        assert!((bounds.max().x - 2.0).abs() < 1e-9);
        assert!((bounds.max().y - 1.0).abs() < 1e-9);
        assert!(resolution.missing.is_empty());
    }

    #[test]
    fn test_resolve_reports_missing() {
        let lookup = test_lookup();
        let resolution = lookup.resolve(["H9S", "ZZZ", " h9s", ""]);
        assert_eq!(resolution.resolved, vec!["H9S"]);
        assert_eq!(resolution.missing, vec!["ZZZ"]);
        assert!(resolution.is_resolved());

        let unresolved = lookup.resolve(["X0X"]);
        assert!(unresolved.shape.is_none());
        assert_eq!(unresolved.missing, vec!["X0X"]);
    }

    #[test]
    fn test_resolve_disjoint_union_matches_parts() {
        let lookup = test_lookup();
        let a = lookup.resolve(["H9S", "H9T"]).shape.unwrap();
        let b = lookup.resolve(["H9W"]).shape.unwrap();
        let all = lookup.resolve(["H9S", "H9T", "H9W"]).shape.unwrap();

        let mut parts = a.into_multi_polygon().0;
        parts.extend(b.into_multi_polygon().0);
        let combined = codec::merge(parts.iter()).unwrap();

        assert_eq!(all.part_count(), 2);
        assert_eq!(all.part_count(), combined.part_count());
        assert!((all.area() - combined.area()).abs() < 1e-9);
    }

    #[test]
    fn test_last_insert_wins() {
        let mut lookup = test_lookup();
        lookup.insert("H9S", square(10.0, 10.0));
        let bounds = lookup.boundary_of("h9s").unwrap().bounding_rect().unwrap();
        assert!((bounds.min().x - 10.0).abs() < 1e-12);
        assert_eq!(lookup.len(), 3);
    }

    #[test]
    fn test_insert_rejects_non_polygonal() {
        let mut lookup = ZoneLookup::new();
        assert!(!lookup.insert("H9S", geo::Geometry::Point(geo::Point::new(0.0, 0.0))));
        assert!(!lookup.insert("  ", square(0.0, 0.0)));
        assert!(lookup.is_empty());
    }

    #[test]
    fn test_known_identifiers_sorted() {
        let lookup = test_lookup();
        assert_eq!(lookup.known_identifiers(), vec!["H9S", "H9T", "H9W"]);
        assert!(lookup.contains("h9w"));
        assert!(!lookup.contains("H1A"));
    }

    #[test]
    fn test_from_geojson_with_allow_listed_column() {
        let text = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"cfsauid": "h9s", "PRNAME": "Quebec"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"cfsauid": "H9T", "PRNAME": "Quebec"},
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [
                            [[[1.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0], [1.0, 0.0]]],
                            [[[8.0, 8.0], [9.0, 8.0], [9.0, 9.0], [8.0, 8.0]]]
                        ]
                    }
                }
            ]
        })
        .to_string();

        let lookup = ZoneLookup::from_geojson_str(&text, None).unwrap();
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.boundary_of("H9T").unwrap().part_count(), 2);
    }

    #[test]
    fn test_from_geojson_reprojects_declared_crs() {
        let text = json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
            "features": [{
                "type": "Feature",
                "properties": {"POSTAL": "H9S"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [111319.49, 0.0], [111319.49, 111325.14], [0.0, 0.0]]]
                }
            }]
        })
        .to_string();

        let lookup = ZoneLookup::from_geojson_str(&text, None).unwrap();
        let bounds = lookup.boundary_of("H9S").unwrap().bounding_rect().unwrap();
        assert!((bounds.max().x - 1.0).abs() < 1e-3);
        assert!((bounds.max().y - 1.0).abs() < 1e-3);

        // An explicit override takes precedence over the declared reference
        let raw = ZoneLookup::from_geojson_str(&text, Some(Crs::Wgs84)).unwrap();
        let bounds = raw.boundary_of("H9S").unwrap().bounding_rect().unwrap();
        assert!(bounds.max().x > 100000.0);
    }

    #[test]
    fn test_identifier_column_regex_fallback() {
        let features: Vec<Feature> = vec![
            serde_json::from_value(json!({
                "type": "Feature",
                "properties": {"name": "Pierrefonds", "code": "H9H"},
                "geometry": null
            }))
            .unwrap(),
        ];
        assert_eq!(find_identifier_column(&features).unwrap(), "code");
    }

    #[test]
    fn test_identifier_column_missing_is_fatal() {
        let features: Vec<Feature> = vec![
            serde_json::from_value(json!({
                "type": "Feature",
                "properties": {"name": "Pierrefonds", "population": 12},
                "geometry": null
            }))
            .unwrap(),
        ];
        assert!(matches!(
            find_identifier_column(&features),
            Err(ZoneError::MissingIdentifierColumn)
        ));
    }
}
