//! Point-in-zone queries over a document

use crate::codec::{self, ZoneShape};
use crate::document::RoutingConfig;
use geo::{Point, Rect};

/// A zone that owns a queried point
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneHit {
    pub route_index: usize,
    pub preference_index: usize,
    pub route_name: String,
    pub zone_name: String,
    pub zip: String,
    /// Points of each part in `(lat, lon)` order, for rendering
    pub parts_latlon: Vec<Vec<(f64, f64)>>,
}

#[derive(Debug, Clone)]
struct IndexedZone {
    hit: ZoneHit,
    shape: ZoneShape,
    bounds: Rect<f64>,
}

/// Decoded zones of a document, in document order
#[derive(Debug, Clone, Default)]
pub struct ZoneIndex {
    zones: Vec<IndexedZone>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ZoneIndex {
    /// Decode every zone of the document once
    ///
    /// Zones without a valid coordinate payload are not indexed.
    pub fn build(document: &RoutingConfig) -> Self {
        let mut zones = Vec::new();
        for (route_index, route) in document.routes.iter().enumerate() {
            for (preference_index, preference) in route.preferences.iter().enumerate() {
                let Some(zone) = &preference.zone else {
                    continue;
                };
                let Some(decoded) = codec::decode(&zone.polygon_coordinates) else {
                    tracing::debug!("Zone {} of {} has no geometry", zone.name, route.name);
                    continue;
                };
                let Some(bounds) = decoded.shape.bounding_rect() else {
                    continue;
                };
                zones.push(IndexedZone {
                    hit: ZoneHit {
                        route_index,
                        preference_index,
                        route_name: route.name.clone(),
                        zone_name: zone.name.clone(),
                        zip: preference.zip.clone(),
                        parts_latlon: decoded.parts_latlon,
                    },
                    shape: decoded.shape,
                    bounds,
                });
            }
        }
        Self { zones }
    }

    /// First zone, in document order, whose geometry touches the point
    pub fn locate(&self, point: Point<f64>) -> Option<&ZoneHit> {
        let coord = point.0;
        self.zones
            .iter()
            .filter(|zone| {
                let (min, max) = (zone.bounds.min(), zone.bounds.max());
                (min.x..=max.x).contains(&coord.x) && (min.y..=max.y).contains(&coord.y)
            })
            .find(|zone| zone.shape.intersects_point(&point))
            .map(|zone| &zone.hit)
    }

    /// Same as [`ZoneIndex::locate`] with map-style arguments
    #[inline]
    pub fn locate_latlon(&self, lat: f64, lon: f64) -> Option<&ZoneHit> {
        self.locate(Point::new(lon, lat))
    }

    /// All indexed zones, in document order
    pub fn hits(&self) -> impl Iterator<Item = &ZoneHit> {
        self.zones.iter().map(|zone| &zone.hit)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> RoutingConfig {
        serde_json::from_value(json!({
            "routingParameterUiVehicleDTOs": [
                {
                    "name": "MONT1500",
                    "routingParameterUiVehiclePreferenceDTOs": [
                        {
                            "zip": "H9S",
                            "routingParameterUiPolygonDTO": {
                                "name": "West",
                                "polygonCoordinates": "0,0,0\r\n1,0,0\r\n1,1,0\r\n0,1,0\r\n0,0,0"
                            }
                        },
                        {"zip": "H9T", "routingParameterUiPolygonDTO": {"name": "Empty", "polygonCoordinates": ""}}
                    ]
                },
                {
                    "name": "MONT1505",
                    "routingParameterUiVehiclePreferenceDTOs": [{
                        "zip": "H9W,H9X",
                        "routingParameterUiPolygonDTO": {
                            "name": "Overlap",
                            "polygonCoordinates": "0.5,0,0\r\n3,0,0\r\n3,1,0\r\n0.5,1,0\r\n\r\n10,10\n11,10\n11,11\n"
                        }
                    }]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_build_skips_zones_without_geometry() {
        let index = ZoneIndex::build(&document());
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.hits().map(|hit| hit.zone_name.as_str()).collect::<Vec<_>>(),
            vec!["West", "Overlap"]
        );
    }

    #[test]
    fn test_first_hit_wins() {
        let index = ZoneIndex::build(&document());
        let hit = index.locate(Point::new(0.75, 0.5)).unwrap();
        assert_eq!(hit.route_name, "MONT1500");
        assert_eq!(hit.zone_name, "West");

        let hit = index.locate_latlon(0.5, 2.0).unwrap();
        assert_eq!((hit.route_index, hit.preference_index), (1, 0));
        assert_eq!(hit.zip, "H9W,H9X");
        assert_eq!(hit.parts_latlon.len(), 2);
    }

    #[test]
    fn test_boundary_counts_as_inside() {
        let index = ZoneIndex::build(&document());
        assert!(index.locate(Point::new(0.0, 0.5)).is_some());
        assert!(index.locate(Point::new(10.9, 10.5)).is_some());
    }

    #[test]
    fn test_miss() {
        let index = ZoneIndex::build(&document());
        assert!(index.locate(Point::new(5.0, 5.0)).is_none());
        assert!(ZoneIndex::default().is_empty());
    }
}
