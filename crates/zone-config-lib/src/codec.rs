//! Zone geometry codec
//!
//! Converts between `geo` polygons and the line-oriented coordinate text stored
//! in `polygonCoordinates`, merges postal-area boundaries and canonicalizes the
//! result of a union into a single [`ZoneShape`].
//!
//! # Text format
//!
//! One `longitude,latitude,elevation` triple per line, parts separated by a
//! blank line:
//!
//! ```text
//! -73.70000000,45.50000000,0
//! -73.60000000,45.50000000,0
//! -73.60000000,45.60000000,0
//! -73.70000000,45.50000000,0
//!
//! -73.50000000,45.40000000,0
//! ...
//! ```

use geo::{
    Area, BoundingRect, Centroid, Contains, Coord, Geometry, Intersects, LineString, MultiPolygon,
    Point, Polygon, Rect,
};

/// Line terminator used when writing coordinate text
pub const LINE_ENDING: &str = "\r\n";

/// Decimal precision used when writing coordinates
///
/// Edits made in place on an existing document use 8 decimals, documents
/// generated from scratch use 12. Both are kept so regenerated files diff
/// cleanly against the ones produced by either workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// In-place edits (8 decimals)
    #[default]
    Edit,
    /// From-scratch generation (12 decimals, trailing line terminator)
    Generate,
}

impl Precision {
    /// Number of decimal places written for each coordinate
    #[inline]
    pub fn decimals(self) -> usize {
        match self {
            Precision::Edit => 8,
            Precision::Generate => 12,
        }
    }
}

/// Canonical polygonal geometry of a zone
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneShape {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl ZoneShape {
    /// Build a shape from polygon parts: one part is a polygon, more is a multi-polygon
    pub fn from_parts(mut parts: Vec<Polygon<f64>>) -> Option<Self> {
        match parts.len() {
            0 => None,
            1 => parts.pop().map(ZoneShape::Polygon),
            _ => Some(ZoneShape::MultiPolygon(MultiPolygon::new(parts))),
        }
    }

    /// Polygon parts of this shape
    pub fn parts(&self) -> &[Polygon<f64>] {
        match self {
            ZoneShape::Polygon(polygon) => std::slice::from_ref(polygon),
            ZoneShape::MultiPolygon(multi) => &multi.0,
        }
    }

    /// Number of polygon parts
    #[inline]
    pub fn part_count(&self) -> usize {
        self.parts().len()
    }

    /// Convert into a multi-polygon (single polygons become one-part collections)
    pub fn into_multi_polygon(self) -> MultiPolygon<f64> {
        match self {
            ZoneShape::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            ZoneShape::MultiPolygon(multi) => multi,
        }
    }

    /// Convert into a generic `geo` geometry
    pub fn into_geometry(self) -> Geometry<f64> {
        match self {
            ZoneShape::Polygon(polygon) => Geometry::Polygon(polygon),
            ZoneShape::MultiPolygon(multi) => Geometry::MultiPolygon(multi),
        }
    }

    /// Planar area in square degrees
    pub fn area(&self) -> f64 {
        match self {
            ZoneShape::Polygon(polygon) => polygon.unsigned_area(),
            ZoneShape::MultiPolygon(multi) => multi.unsigned_area(),
        }
    }

    /// Planar centroid
    pub fn centroid(&self) -> Option<Point<f64>> {
        match self {
            ZoneShape::Polygon(polygon) => polygon.centroid(),
            ZoneShape::MultiPolygon(multi) => multi.centroid(),
        }
    }

    /// Bounding box
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            ZoneShape::Polygon(polygon) => polygon.bounding_rect(),
            ZoneShape::MultiPolygon(multi) => multi.bounding_rect(),
        }
    }

    /// Whether the point lies strictly inside the shape
    pub fn contains_point(&self, point: &Point<f64>) -> bool {
        match self {
            ZoneShape::Polygon(polygon) => polygon.contains(point),
            ZoneShape::MultiPolygon(multi) => multi.contains(point),
        }
    }

    /// Whether the point lies inside or on the boundary of the shape
    pub fn intersects_point(&self, point: &Point<f64>) -> bool {
        match self {
            ZoneShape::Polygon(polygon) => polygon.intersects(point),
            ZoneShape::MultiPolygon(multi) => multi.intersects(point),
        }
    }
}

/// Result of decoding a coordinate payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedZone {
    /// Geometry for spatial queries and merging (`x = lon`, `y = lat`)
    pub shape: ZoneShape,
    /// Points of each part in `(lat, lon)` order, as map widgets expect them
    pub parts_latlon: Vec<Vec<(f64, f64)>>,
}

/// Decode a coordinate payload
///
/// Parsing is lenient: malformed lines are skipped and parts with fewer than
/// three valid points are dropped. Returns `None` when nothing valid remains,
/// which callers treat as "no geometry yet".
pub fn decode(text: &str) -> Option<DecodedZone> {
    let mut polygons = Vec::new();
    let mut parts_latlon = Vec::new();

    for part in split_parts(text) {
        let coords: Vec<Coord<f64>> = part.iter().filter_map(|line| parse_line(line)).collect();
        let skipped = part.len() - coords.len();
        if skipped > 0 {
            tracing::warn!("Skipped {skipped} malformed coordinate line(s)");
        }
        if coords.len() < 3 {
            if !coords.is_empty() {
                tracing::debug!("Dropping part with only {} valid points", coords.len());
            }
            continue;
        }

        parts_latlon.push(coords.iter().map(|c| (c.y, c.x)).collect());
        polygons.push(Polygon::new(LineString::from(coords), Vec::new()));
    }

    ZoneShape::from_parts(polygons).map(|shape| DecodedZone {
        shape,
        parts_latlon,
    })
}

/// Group non-blank lines into parts separated by blank lines
fn split_parts(text: &str) -> Vec<Vec<&str>> {
    let mut parts = Vec::new();
    let mut current = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Parse one `lon,lat[,elevation]` line
///
/// Fields are positional, so a blank longitude or latitude rejects the line.
fn parse_line(line: &str) -> Option<Coord<f64>> {
    let mut fields = line.split(',').map(str::trim);
    let lon = fields.next()?.parse::<f64>().ok()?;
    let lat = fields.next()?.parse::<f64>().ok()?;
    if !lon.is_finite() || !lat.is_finite() {
        return None;
    }
    Some(Coord { x: lon, y: lat })
}

/// Encode a shape as coordinate text with the default `\r\n` terminator
///
/// Only exterior rings are written; holes are discarded. Coordinates are
/// emitted exactly as the ring yields them, closing point included.
pub fn encode(shape: &ZoneShape, precision: Precision) -> String {
    encode_with(shape, precision, LINE_ENDING)
}

/// Encode a shape as coordinate text using the given line terminator
pub fn encode_with(shape: &ZoneShape, precision: Precision, line_ending: &str) -> String {
    let separator = line_ending.repeat(2);
    let mut text = shape
        .parts()
        .iter()
        .map(|polygon| encode_ring(polygon.exterior(), precision, line_ending))
        .collect::<Vec<_>>()
        .join(&separator);

    if precision == Precision::Generate {
        text.push_str(line_ending);
    }
    text
}

fn encode_ring(ring: &LineString<f64>, precision: Precision, line_ending: &str) -> String {
    let decimals = precision.decimals();
    ring.coords()
        .map(|c| format!("{:.*},{:.*},0", decimals, c.x, decimals, c.y))
        .collect::<Vec<_>>()
        .join(line_ending)
}

/// Canonicalize the output of a union into a zone shape
///
/// Polygons and multi-polygons pass through. Collections keep only their
/// polygonal members (multi-polygons are flattened). Returns `None` when no
/// polygonal content survives.
pub fn normalize(geometry: Geometry<f64>) -> Option<ZoneShape> {
    match geometry {
        Geometry::Polygon(polygon) => Some(ZoneShape::Polygon(polygon)),
        Geometry::MultiPolygon(multi) if multi.0.is_empty() => None,
        Geometry::MultiPolygon(multi) => Some(ZoneShape::MultiPolygon(multi)),
        Geometry::Rect(rect) => Some(ZoneShape::Polygon(rect.to_polygon())),
        Geometry::Triangle(triangle) => Some(ZoneShape::Polygon(triangle.to_polygon())),
        Geometry::GeometryCollection(collection) => {
            let mut polygons = Vec::new();
            for member in collection {
                match member {
                    Geometry::Polygon(polygon) => polygons.push(polygon),
                    Geometry::MultiPolygon(multi) => polygons.extend(multi.0),
                    Geometry::Rect(rect) => polygons.push(rect.to_polygon()),
                    Geometry::Triangle(triangle) => polygons.push(triangle.to_polygon()),
                    _ => {}
                }
            }
            ZoneShape::from_parts(polygons)
        }
        _ => None,
    }
}

/// Union a set of polygons into one canonical shape
///
/// Touching or overlapping inputs merge into a single part. Returns `None`
/// for an empty input or a degenerate result.
pub fn merge<'a>(polygons: impl IntoIterator<Item = &'a Polygon<f64>>) -> Option<ZoneShape> {
    #[cfg(feature = "profiling")]
    profiling::scope!("codec::merge");

    let merged: MultiPolygon<f64> = geo::unary_union(polygons);
    let parts: Vec<Polygon<f64>> = merged
        .0
        .into_iter()
        .filter(|p| p.exterior().0.len() >= 4)
        .collect();
    ZoneShape::from_parts(parts)
}

/// Keep only the part with the greatest area
///
/// Used when a newly created route must own exactly one simple polygon.
pub fn largest_part(shape: ZoneShape) -> Polygon<f64> {
    match shape {
        ZoneShape::Polygon(polygon) => polygon,
        ZoneShape::MultiPolygon(multi) => {
            let mut parts = multi.0.into_iter();
            // from_parts never builds an empty multi-polygon, but geometry built
            // by hand might be
            let first = parts
                .next()
                .unwrap_or_else(|| Polygon::new(LineString::new(Vec::new()), Vec::new()));
            parts.fold(first, |best, candidate| {
                if candidate.unsigned_area() > best.unsigned_area() {
                    candidate
                } else {
                    best
                }
            })
        }
    }
}

/// Drop interior rings from every part
pub fn strip_holes(shape: ZoneShape) -> ZoneShape {
    let parts = shape
        .into_multi_polygon()
        .0
        .into_iter()
        .map(|polygon| Polygon::new(polygon.exterior().clone(), Vec::new()))
        .collect();
    // Stripping never removes parts
    ZoneShape::from_parts(parts).unwrap_or_else(|| ZoneShape::MultiPolygon(MultiPolygon::new(vec![])))
}
