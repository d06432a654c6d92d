//! Configuration document model
//!
//! Typed view over the routing configuration JSON. Only the fields the engine
//! reads or rewrites are named; everything else rides along in `extra` maps and
//! is written back untouched.

use crate::{Result, ZoneError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;

/// Opaque passthrough properties of an entity
pub type Extra = Map<String, Value>;

/// Default node color written for routes that had no node yet
const DEFAULT_NODE_COLOR: &str = "#33cccc";

static ADMISSIBLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z]+)\|(\d+)\|(\d+)").expect("admissible pattern regex is valid")
});

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identifier of a document entity, written as a string or an integer
///
/// Any other JSON value (negative or fractional numbers, objects) is kept as-is
/// in `Other` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(u64),
    Text(String),
    Other(Value),
}

impl std::hash::Hash for EntityId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            EntityId::Number(n) => n.hash(state),
            EntityId::Text(s) => s.hash(state),
            EntityId::Other(_) => {}
        }
    }
}

impl EntityId {
    /// Numeric value, when the id is an integer or an all-digit string
    pub fn as_number(&self) -> Option<u64> {
        match self {
            EntityId::Number(n) => Some(*n),
            EntityId::Text(s) => s.trim().parse().ok(),
            EntityId::Other(_) => None,
        }
    }

    /// Graph nodes use integer ids whenever the route id is numeric
    fn to_node_id(&self) -> EntityId {
        self.as_number()
            .map(EntityId::Number)
            .unwrap_or_else(|| self.clone())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
            EntityId::Other(value) => write!(f, "{value}"),
        }
    }
}

/// Document-scoped generator of fresh entity ids
///
/// Seeded above the largest numeric id already present, so generated ids
/// never collide with loaded ones or with each other.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn starting_at(next: u64) -> Self {
        Self { next: next.max(1) }
    }

    /// Seed from every id found in the document
    pub fn for_document(document: &RoutingConfig) -> Self {
        let route_ids = document.routes.iter().flat_map(|route| {
            std::iter::once(route.id.as_ref()).chain(route.preferences.iter().flat_map(|p| {
                [p.id.as_ref(), p.zone.as_ref().and_then(|zone| zone.id.as_ref())]
            }))
        });
        let zone_ids = document.zones.iter().map(|zone| zone.id.as_ref());
        let node_ids = document.nodes.iter().map(|node| node.id.as_ref());

        let highest = route_ids
            .chain(zone_ids)
            .chain(node_ids)
            .flatten()
            .filter_map(EntityId::as_number)
            .max()
            .unwrap_or(0);
        Self::starting_at(highest + 1)
    }

    /// Next numeric id
    pub fn next_number(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Next id in the string form used by the document
    pub fn next_id(&mut self) -> EntityId {
        EntityId::Text(self.next_number().to_string())
    }
}

/// `representative` of a route: a route name or a hub flag, depending on the document flavour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Representative {
    Flag(bool),
    Name(String),
}

impl Representative {
    /// Route name, or `None` for the boolean flavour and empty names
    pub fn name(&self) -> Option<&str> {
        match self {
            Representative::Name(name) if !name.trim().is_empty() => Some(name.trim()),
            _ => None,
        }
    }
}

/// Which flavour of `representative` a document uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepresentativeMode {
    /// Every route names the hub route
    #[default]
    ByName,
    /// Every route carries a boolean, true only on the hub route
    ByFlag,
}

/// Zone: a named coordinate payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub polygon_coordinates: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Assignment of a postal-code set to one zone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Comma-joined postal codes
    #[serde(default, deserialize_with = "null_as_default")]
    pub zip: String,
    #[serde(rename = "routingParameterUiPolygonDTO", default)]
    pub zone: Option<Zone>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Preference {
    /// Normalized postal codes of this preference
    pub fn codes(&self) -> Vec<String> {
        split_codes(&self.zip)
    }

    /// Zone name, empty when the preference has no zone
    pub fn zone_name(&self) -> &str {
        self.zone.as_ref().map(|zone| zone.name.as_str()).unwrap_or("")
    }
}

/// A route (vehicle) and the zones it owns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub adjacent_routes: String,
    #[serde(default)]
    pub representative: Option<Representative>,
    #[serde(
        rename = "routingParameterUiVehiclePreferenceDTOs",
        default,
        deserialize_with = "null_as_default"
    )]
    pub preferences: Vec<Preference>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Route {
    /// All postal codes across the route's preferences, first occurrence order
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for code in self.preferences.iter().flat_map(Preference::codes) {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        codes
    }

    /// Names of the zones owned by this route
    pub fn zone_names(&self) -> Vec<&str> {
        self.preferences.iter().map(Preference::zone_name).collect()
    }
}

/// Graph node, one per route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Graph edge, one per resolvable adjacency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(default)]
    pub from: Option<EntityId>,
    #[serde(default)]
    pub to: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Key names a depot location was written with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepotKeyStyle {
    /// `latitude` / `longitude`
    #[default]
    Long,
    /// `lat` / `lng`
    Short,
}

/// Depot position, normalized from either key style
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDepot", into = "RawDepot")]
pub struct DepotLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub style: DepotKeyStyle,
}

impl DepotLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            style: DepotKeyStyle::default(),
        }
    }

    /// Depot as a geometry point (`x = lon`, `y = lat`)
    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCoordinate {
    Number(f64),
    Text(String),
}

impl RawCoordinate {
    fn value(&self) -> Option<f64> {
        match self {
            RawCoordinate::Number(n) => Some(*n),
            RawCoordinate::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawDepot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latitude: Option<RawCoordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    longitude: Option<RawCoordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lat: Option<RawCoordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lng: Option<RawCoordinate>,
}

impl TryFrom<RawDepot> for DepotLocation {
    type Error = String;

    fn try_from(raw: RawDepot) -> std::result::Result<Self, Self::Error> {
        let value = |c: &Option<RawCoordinate>| c.as_ref().and_then(RawCoordinate::value);
        let (latitude, longitude, style) = match (value(&raw.latitude), value(&raw.longitude)) {
            (Some(lat), Some(lon)) => (lat, lon, DepotKeyStyle::Long),
            _ => match (value(&raw.lat), value(&raw.lng)) {
                (Some(lat), Some(lon)) => (lat, lon, DepotKeyStyle::Short),
                _ => {
                    return Err(
                        "depotLocation needs numeric latitude/longitude or lat/lng".to_string()
                    );
                }
            },
        };
        Ok(DepotLocation {
            latitude,
            longitude,
            style,
        })
    }
}

impl From<DepotLocation> for RawDepot {
    fn from(depot: DepotLocation) -> Self {
        let lat = Some(RawCoordinate::Number(depot.latitude));
        let lon = Some(RawCoordinate::Number(depot.longitude));
        match depot.style {
            DepotKeyStyle::Long => RawDepot {
                latitude: lat,
                longitude: lon,
                ..Default::default()
            },
            DepotKeyStyle::Short => RawDepot {
                lat,
                lng: lon,
                ..Default::default()
            },
        }
    }
}

/// Admissible route names: `PREFIX|MIN|MAX`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    pub prefix: String,
    pub min: u32,
    pub max: u32,
}

impl RoutePattern {
    pub fn new(prefix: impl Into<String>, min: u32, max: u32) -> Self {
        Self {
            prefix: prefix.into(),
            min,
            max,
        }
    }

    /// Parse an `admissibleRoutePatterns` value such as `MONT|1500|1999`
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = || {
            ZoneError::Format(format!(
                "invalid admissibleRoutePatterns {text:?} (expected e.g. MONT|1500|1999)"
            ))
        };
        let captures = ADMISSIBLE_PATTERN.captures(text.trim()).ok_or_else(malformed)?;
        let min: u32 = captures[2].parse().map_err(|_| malformed())?;
        let max: u32 = captures[3].parse().map_err(|_| malformed())?;
        if min > max {
            return Err(malformed());
        }
        Ok(Self::new(&captures[1], min, max))
    }

    /// Route name for a number
    #[inline]
    pub fn format_name(&self, number: u32) -> String {
        format!("{}{number}", self.prefix)
    }

    /// Number of a name that is exactly the prefix followed by digits
    pub fn parse_number(&self, name: &str) -> Option<u32> {
        let digits = name.strip_prefix(self.prefix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Whether the name starts with the prefix followed by a digit
    pub fn matches_prefix(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.bytes().next())
            .is_some_and(|b| b.is_ascii_digit())
    }

    /// Whether the number lies in the inclusive range
    #[inline]
    pub fn contains(&self, number: u32) -> bool {
        (self.min..=self.max).contains(&number)
    }

    /// Check a route name against the prefix and range, returning its number
    pub fn validate_name(&self, name: &str) -> Result<u32> {
        let number = self.parse_number(name).ok_or_else(|| {
            ZoneError::Validation(format!(
                "{name} must be {} followed by a number",
                self.prefix
            ))
        })?;
        if !self.contains(number) {
            return Err(ZoneError::Validation(format!(
                "{name} is out of range {}-{}",
                self.min, self.max
            )));
        }
        Ok(number)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.prefix, self.min, self.max)
    }
}

/// Split a zip string into normalized postal codes
pub fn split_codes(text: &str) -> Vec<String> {
    text.split(',')
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .collect()
}

/// Split a reference list (`adjacentRoutes`, node labels) on `;` or `,`
pub fn split_references(text: &str) -> Vec<&str> {
    text.split([';', ','])
        .map(str::trim)
        .filter(|reference| !reference.is_empty())
        .collect()
}

fn default_gap() -> u32 {
    1
}

/// The routing configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depot_location: Option<DepotLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admissible_route_patterns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_number_gap: Option<u32>,
    #[serde(
        rename = "routingParameterUiVehicleDTOs",
        default,
        deserialize_with = "null_as_default"
    )]
    pub routes: Vec<Route>,
    #[serde(
        rename = "routingParameterUiPolygonDTOs",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub zones: Vec<Zone>,
    #[serde(
        rename = "routingParameterNodeDTOs",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub nodes: Vec<GraphNode>,
    #[serde(
        rename = "routingParameterEdgeDTOs",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub edges: Vec<GraphEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nb_vehicle: Option<usize>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl RoutingConfig {
    /// Parse a document from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ZoneError::Format(format!("malformed configuration document: {e}")))
    }

    /// Serialize with 4-space indentation, non-ASCII kept verbatim
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(buffer).map_err(|e| ZoneError::Format(e.to_string()))
    }

    /// Parsed admissible route pattern
    pub fn pattern(&self) -> Result<RoutePattern> {
        RoutePattern::parse(self.admissible_route_patterns.as_deref().unwrap_or(""))
    }

    /// Stride between generated route numbers (never zero)
    #[inline]
    pub fn gap(&self) -> u32 {
        self.route_number_gap.unwrap_or_else(default_gap).max(1)
    }

    /// Index of the route with this exact name
    pub fn route_index(&self, name: &str) -> Option<usize> {
        self.routes.iter().position(|route| route.name == name)
    }

    /// Representative flavour used by the routes, if any route carries one
    pub fn representative_mode(&self) -> Option<RepresentativeMode> {
        self.routes
            .iter()
            .find_map(|route| match route.representative.as_ref()? {
                Representative::Flag(_) => Some(RepresentativeMode::ByFlag),
                Representative::Name(_) => Some(RepresentativeMode::ByName),
            })
    }

    /// Rebuild the flat zone list, the graph view and the vehicle count from the routes
    ///
    /// Node extras (color, value, ...) are kept for routes whose node already
    /// existed. Adjacency references that name no route produce no edge.
    pub fn sync_derived(&mut self) {
        self.zones = self
            .routes
            .iter()
            .flat_map(|route| route.preferences.iter())
            .filter_map(|preference| preference.zone.clone())
            .collect();

        let mut node_extras: HashMap<EntityId, Extra> = std::mem::take(&mut self.nodes)
            .into_iter()
            .filter_map(|node| Some((node.id?, node.extra)))
            .collect();
        self.nodes = self
            .routes
            .iter()
            .map(|route| {
                let id = route.id.as_ref().map(EntityId::to_node_id);
                let extra = id
                    .as_ref()
                    .and_then(|id| node_extras.remove(id))
                    .unwrap_or_else(default_node_extra);
                GraphNode {
                    id,
                    label: route.name.clone(),
                    extra,
                }
            })
            .collect();

        let node_ids: HashMap<&str, EntityId> = self
            .routes
            .iter()
            .filter_map(|route| Some((route.name.as_str(), route.id.as_ref()?.to_node_id())))
            .collect();
        let mut edge_extras: HashMap<(EntityId, EntityId), Extra> = std::mem::take(&mut self.edges)
            .into_iter()
            .filter_map(|edge| Some(((edge.from?, edge.to?), edge.extra)))
            .collect();
        let mut edges = Vec::new();
        for route in &self.routes {
            let Some(from) = node_ids.get(route.name.as_str()) else {
                continue;
            };
            for reference in split_references(&route.adjacent_routes) {
                let Some(to) = node_ids.get(reference) else {
                    tracing::warn!("No edge for {} -> {reference}: unknown route", route.name);
                    continue;
                };
                let extra = edge_extras
                    .remove(&(from.clone(), to.clone()))
                    .unwrap_or_default();
                edges.push(GraphEdge {
                    from: Some(from.clone()),
                    to: Some(to.clone()),
                    extra,
                });
            }
        }
        self.edges = edges;
        self.nb_vehicle = Some(self.routes.len());
    }
}

fn default_node_extra() -> Extra {
    let mut extra = Extra::new();
    extra.insert("color".to_string(), json!(DEFAULT_NODE_COLOR));
    extra.insert("value".to_string(), json!(1));
    extra
}

fn default_true() -> bool {
    true
}

fn default_audit_user() -> String {
    "admin".to_string()
}

/// Settings that seed a brand-new document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub region_description: String,
    pub admissible_route_patterns: String,
    pub depot_location: DepotLocation,
    #[serde(default = "default_gap")]
    pub route_number_gap: u32,
    #[serde(default)]
    pub representative_mode: Option<RepresentativeMode>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub is_cascade: bool,
    #[serde(default = "default_true")]
    pub is_valid_graph: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_audit_user")]
    pub audit_user: String,
}

impl NewDocument {
    /// Build an empty document, audit entries stamped with `timestamp_ms`
    pub fn into_document(self, timestamp_ms: i64) -> Result<RoutingConfig> {
        let pattern = RoutePattern::parse(&self.admissible_route_patterns)?;
        if self.route_number_gap == 0 {
            return Err(ZoneError::Validation(
                "routeNumberGap must be at least 1".to_string(),
            ));
        }

        let user_info = json!({"userName": self.audit_user, "timestamp": timestamp_ms});
        let mut extra = Extra::new();
        extra.insert("isDefault".to_string(), json!(self.is_default));
        extra.insert("isValidGraph".to_string(), json!(self.is_valid_graph));
        extra.insert("postalCodePrefixes".to_string(), json!(""));
        extra.insert("active".to_string(), json!(i32::from(self.active)));
        extra.insert("isCascade".to_string(), json!(i32::from(self.is_cascade)));
        extra.insert("canEditCascade".to_string(), Value::Null);
        extra.insert(
            "routingParameterUiAuditStatusDTO".to_string(),
            json!({
                "routingParameterId": self.id,
                "auditCreatedUserInfo": user_info,
                "auditLastUpdateUserInfo": user_info,
            }),
        );

        Ok(RoutingConfig {
            id: Some(EntityId::Text(self.id)),
            name: Some(self.name),
            region: Some(self.region),
            region_description: Some(self.region_description),
            depot_location: Some(self.depot_location),
            admissible_route_patterns: Some(pattern.to_string()),
            route_number_gap: Some(self.route_number_gap),
            nb_vehicle: Some(0),
            extra,
            ..Default::default()
        })
    }
}
