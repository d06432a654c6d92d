//! Zone Config Library - Core engine for delivery-routing zone configurations
//!
//! This library edits the JSON routing configuration used to assign postal-code
//! areas (FSAs) to delivery routes. Each route owns one or more zones whose
//! polygons are the union of the boundaries of their postal codes.
//!
//! # Architecture
//!
//! - **[`codec`]**: Text coordinate format, polygon union and shape normalization
//! - **[`ZoneLookup`]**: Read-only index from postal code to boundary polygon
//! - **[`RoutingConfig`]**: Typed model of the configuration document
//! - **[`RouteRegistry`]**: Edit operations with naming and numbering invariants
//! - **[`RangeRemapper`]**: Bulk renumbering with reference propagation
//! - **[`ZoneIndex`]**: Point-in-zone queries over a document
//!
//! # Coordinates
//!
//! All geometry is held as `geo` types with `x = longitude` and `y = latitude`
//! (EPSG:4326). Boundary datasets in other references are reprojected on load,
//! see [`crs`].

pub mod codec;
pub mod crs;
mod document;
mod lookup;
mod registry;
mod remap;
mod spatial;

// Public API exports
pub use codec::{DecodedZone, Precision, ZoneShape};
pub use crs::Crs;
pub use document::{
    DepotKeyStyle, DepotLocation, EntityId, Extra, GraphEdge, GraphNode, IdGenerator, NewDocument,
    Preference, Representative, RepresentativeMode, Route, RoutePattern, RoutingConfig, Zone,
    split_codes, split_references,
};
pub use lookup::{IDENTIFIER_COLUMNS, Resolution, ZoneLookup, find_identifier_column};
pub use registry::{
    AddOutcome, CreateOutcome, EditOutcome, EditRequest, EditorConfig, RemoveOutcome,
    RestructureReport, RouteOptions, RouteRegistry, RouteState, Selection, compute_relations,
    link_new_routes,
};
pub use remap::{
    ChangeLog, LogTag, RangeRemapper, RemapReport, unresolved_references,
    unresolved_route_references,
};
pub use spatial::{ZoneHit, ZoneIndex};

/// Error types for the zone configuration engine
///
/// Only fatal conditions are errors. Per-item problems (unresolved postal codes,
/// degenerate merges, dangling references) are reported in operation outcomes.
#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    #[error("No zone is currently selected")]
    NoSelection,

    #[error("No postal-code column found in boundary dataset")]
    MissingIdentifierColumn,

    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ZoneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that the main entry points are accessible
        let _: fn() -> ZoneLookup = ZoneLookup::new;
        let _: fn() -> EditorConfig = EditorConfig::default;
        let _: fn(&str) -> Result<RoutePattern> = RoutePattern::parse;
    }

    #[test]
    fn test_error_display() {
        let err = ZoneError::Validation("MONT2000 is out of range".to_string());
        assert_eq!(err.to_string(), "Validation error: MONT2000 is out of range");
        assert_eq!(
            ZoneError::NoSelection.to_string(),
            "No zone is currently selected"
        );
    }
}
