//! Route registry: edit operations over a loaded document
//!
//! The registry owns the document for one editing session together with the
//! state the edits depend on (admissible pattern, used route numbers, id
//! generator, current selection, routes still being drafted). Every public
//! operation either applies completely or returns an error before touching the
//! document.

use crate::codec::{self, LINE_ENDING, Precision, ZoneShape};
use crate::document::{
    EntityId, Extra, IdGenerator, NewDocument, Preference, Representative, RepresentativeMode,
    Route, RoutePattern, RoutingConfig, Zone,
};
use crate::lookup::{ZoneLookup, normalize_identifier};
use crate::remap::unresolved_route_references;
use crate::spatial::ZoneIndex;
use crate::{Result, ZoneError};
use geo::Point;
use rayon::prelude::*;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashSet};

/// Tuning of the registry
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Precision for in-place edits (add/remove codes, restructure)
    pub edit_precision: Precision,
    /// Precision for routes generated from scratch
    pub generate_precision: Precision,
    /// Line terminator inside coordinate text
    pub line_ending: &'static str,
    /// Representative flavour used when the document does not show one
    pub representative_mode: RepresentativeMode,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            edit_precision: Precision::Edit,
            generate_precision: Precision::Generate,
            line_ending: LINE_ENDING,
            representative_mode: RepresentativeMode::ByName,
        }
    }
}

/// The preference an edit is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub route: usize,
    pub preference: usize,
}

/// Lifecycle state of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// Created in this session, not yet committed to the document
    Draft,
    /// Present in the document with at least one preference
    Active,
    /// Present in the document without any preference
    Emptied,
}

/// Flags copied onto routes generated from scratch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteOptions {
    pub hard_target: bool,
    pub electric: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            hard_target: true,
            electric: false,
        }
    }
}

/// Result of adding postal codes to a route
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddOutcome {
    /// Codes that resolved and went into the new preference
    pub added: Vec<String>,
    /// Codes already present somewhere in the route
    pub duplicates: Vec<String>,
    /// Codes absent from the boundary dataset
    pub missing: Vec<String>,
    /// Name of the created zone, `None` when nothing was created
    pub zone_name: Option<String>,
}

impl AddOutcome {
    /// Whether a preference was created
    #[inline]
    pub fn created(&self) -> bool {
        self.zone_name.is_some()
    }
}

/// Result of removing postal codes from the selected preference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoveOutcome {
    pub removed: Vec<String>,
    pub remaining: Vec<String>,
    /// The preference had no code left and was deleted
    pub preference_deleted: bool,
    /// Geometry was recomputed from the remaining codes
    pub regenerated: bool,
}

/// Changes requested by the edit form for the selected zone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditRequest {
    pub route_name: Option<String>,
    pub zone_name: Option<String>,
    pub adjacent_routes: Option<String>,
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

/// Summary of an applied [`EditRequest`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    /// `(old, new)` when the route was renamed
    pub renamed: Option<(String, String)>,
    pub zone_renamed: bool,
    pub adjacency_changed: bool,
    pub removed: Option<RemoveOutcome>,
    pub added: Option<AddOutcome>,
    /// Adjacency and representative names left pointing at no route
    pub unresolved: BTreeSet<String>,
}

/// Result of creating a route
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOutcome {
    /// Name of the drafted route, `None` when no code resolved
    pub name: Option<String>,
    pub resolved: Vec<String>,
    pub missing: Vec<String>,
}

/// Result of recomputing every zone from its codes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestructureReport {
    pub updated: usize,
    /// Zones whose codes produced no geometry
    pub errors: usize,
    /// Preferences without any code
    pub skipped: usize,
    /// `route/zone` labels of the zones counted in `errors`
    pub failed: Vec<String>,
}

#[derive(Debug, Clone)]
struct DraftRoute {
    route: Route,
    shape: ZoneShape,
}

/// In-memory editing session over one configuration document
#[derive(Debug, Clone)]
pub struct RouteRegistry {
    document: RoutingConfig,
    pattern: RoutePattern,
    config: EditorConfig,
    ids: IdGenerator,
    used_numbers: BTreeSet<u32>,
    drafts: Vec<DraftRoute>,
    selection: Option<Selection>,
}

/// Split on ',' or ';', normalize, drop blanks and repeats, keep first-seen order
fn normalize_codes<I, S>(codes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for code in codes {
        for code in code.as_ref().split([',', ';']).map(normalize_identifier) {
            if !code.is_empty() && !normalized.contains(&code) {
                normalized.push(code);
            }
        }
    }
    normalized
}

/// Decoded geometry of all zones of a route
fn route_shape(route: &Route) -> Option<ZoneShape> {
    let parts = route
        .preferences
        .iter()
        .filter_map(|preference| preference.zone.as_ref())
        .filter_map(|zone| codec::decode(&zone.polygon_coordinates))
        .flat_map(|decoded| decoded.shape.into_multi_polygon().0)
        .collect();
    ZoneShape::from_parts(parts)
}

fn id_value(id: Option<&EntityId>) -> Value {
    json!(id.map(EntityId::to_string).unwrap_or_default())
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteRegistry {
    /// Start a session over a loaded document
    pub fn from_document(document: RoutingConfig, config: EditorConfig) -> Result<Self> {
        let pattern = document.pattern()?;

        let mut used_numbers = BTreeSet::new();
        let mut seen = HashSet::new();
        for route in &document.routes {
            if !seen.insert(route.name.as_str()) {
                tracing::warn!("Route name {} appears more than once", route.name);
            }
            if let Some(number) = pattern.parse_number(&route.name) {
                used_numbers.insert(number);
            }
        }

        tracing::debug!(
            "Registry over {} routes, pattern {pattern}, {} numbers in use",
            document.routes.len(),
            used_numbers.len()
        );

        Ok(Self {
            ids: IdGenerator::for_document(&document),
            document,
            pattern,
            config,
            used_numbers,
            drafts: Vec::new(),
            selection: None,
        })
    }

    /// Start a session over a brand-new empty document
    pub fn new_document(settings: NewDocument, mut config: EditorConfig) -> Result<Self> {
        if let Some(mode) = settings.representative_mode {
            config.representative_mode = mode;
        }
        let document = settings.into_document(chrono::Utc::now().timestamp_millis())?;
        Self::from_document(document, config)
    }

    #[inline]
    pub fn document(&self) -> &RoutingConfig {
        &self.document
    }

    #[inline]
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    #[inline]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    #[inline]
    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Route numbers taken by active and drafted routes
    pub fn used_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.used_numbers.iter().copied()
    }

    /// Routes created in this session and not yet finalized
    pub fn draft_routes(&self) -> impl Iterator<Item = &Route> {
        self.drafts.iter().map(|draft| &draft.route)
    }

    /// Representative flavour of the session: the one the routes already use,
    /// otherwise the configured default
    pub fn representative_mode(&self) -> RepresentativeMode {
        self.document
            .routes
            .iter()
            .chain(self.draft_routes())
            .find_map(|route| match route.representative.as_ref()? {
                Representative::Flag(_) => Some(RepresentativeMode::ByFlag),
                Representative::Name(_) => Some(RepresentativeMode::ByName),
            })
            .unwrap_or(self.config.representative_mode)
    }

    /// Lifecycle state of a route by name
    pub fn route_state(&self, name: &str) -> Option<RouteState> {
        if self.draft_routes().any(|route| route.name == name) {
            return Some(RouteState::Draft);
        }
        let route = &self.document.routes[self.document.route_index(name)?];
        Some(if route.preferences.is_empty() {
            RouteState::Emptied
        } else {
            RouteState::Active
        })
    }

    fn route_index(&self, name: &str) -> Result<usize> {
        self.document
            .route_index(name)
            .ok_or_else(|| ZoneError::UnknownRoute(name.to_string()))
    }

    fn name_in_use(&self, name: &str) -> bool {
        self.document.route_index(name).is_some() || self.draft_routes().any(|r| r.name == name)
    }

    /// Select a zone by route and zone name
    pub fn select(&mut self, route: &str, zone: &str) -> Result<Selection> {
        let route_index = self.route_index(route)?;
        let preference = self.document.routes[route_index]
            .preferences
            .iter()
            .position(|preference| preference.zone_name() == zone)
            .ok_or_else(|| ZoneError::UnknownRoute(format!("{route} has no zone named {zone}")))?;
        let selection = Selection {
            route: route_index,
            preference,
        };
        self.selection = Some(selection);
        Ok(selection)
    }

    /// Select the zone containing a point (`x = lon`, `y = lat`)
    ///
    /// Clears the selection when no zone contains the point.
    pub fn select_point(&mut self, point: Point<f64>) -> Option<Selection> {
        self.selection = ZoneIndex::build(&self.document)
            .locate(point)
            .map(|hit| Selection {
                route: hit.route_index,
                preference: hit.preference_index,
            });
        self.selection
    }

    /// Current selection, checked against the document
    fn selected(&self) -> Result<Selection> {
        let selection = self.selection.ok_or(ZoneError::NoSelection)?;
        self.document
            .routes
            .get(selection.route)
            .and_then(|route| route.preferences.get(selection.preference))
            .map(|_| selection)
            .ok_or(ZoneError::NoSelection)
    }

    /// Check a new name for a route without changing anything
    pub fn check_rename(&self, route: &str, new_name: &str) -> Result<()> {
        self.route_index(route)?;
        if new_name == route {
            return Ok(());
        }
        self.pattern.validate_name(new_name)?;
        if self.name_in_use(new_name) {
            return Err(ZoneError::Validation(format!(
                "route name {new_name} is already used"
            )));
        }
        Ok(())
    }

    /// Rename a route
    ///
    /// References held by other routes are left as they are.
    pub fn rename(&mut self, route: &str, new_name: &str) -> Result<()> {
        self.check_rename(route, new_name)?;
        if new_name == route {
            return Ok(());
        }
        let index = self.route_index(route)?;

        if let Some(old) = self.pattern.parse_number(route) {
            self.used_numbers.remove(&old);
        }
        if let Some(new) = self.pattern.parse_number(new_name) {
            self.used_numbers.insert(new);
        }
        self.document.routes[index].name = new_name.to_string();
        tracing::info!("Renamed route {route} to {new_name}");
        Ok(())
    }

    fn check_zone_name(&self, selection: Selection, new_name: &str) -> Result<()> {
        if new_name.trim().is_empty() {
            return Err(ZoneError::Validation(
                "zone name must not be empty".to_string(),
            ));
        }
        let route = &self.document.routes[selection.route];
        let taken = route
            .preferences
            .iter()
            .enumerate()
            .any(|(i, preference)| i != selection.preference && preference.zone_name() == new_name);
        if taken {
            return Err(ZoneError::Validation(format!(
                "zone name {new_name} is already used in route {}",
                route.name
            )));
        }
        Ok(())
    }

    /// Rename the selected zone
    pub fn set_zone_name(&mut self, new_name: &str) -> Result<()> {
        let selection = self.selected()?;
        self.check_zone_name(selection, new_name)?;
        let preference = &mut self.document.routes[selection.route].preferences[selection.preference];
        preference
            .zone
            .get_or_insert_with(Zone::default)
            .name = new_name.to_string();
        Ok(())
    }

    /// Overwrite a route's adjacency string
    pub fn set_adjacent(&mut self, route: &str, adjacent_routes: &str) -> Result<()> {
        let index = self.route_index(route)?;
        self.document.routes[index].adjacent_routes = adjacent_routes.to_string();
        Ok(())
    }

    /// Sibling-unique zone name: `base`, else `base` + smallest suffix >= 2
    fn unique_zone_name(route: &Route, base: &str) -> String {
        let names = route.zone_names();
        if !names.contains(&base) {
            return base.to_string();
        }
        (2..)
            .map(|i| format!("{base}{i}"))
            .find(|candidate| !names.contains(&candidate.as_str()))
            .unwrap_or_else(|| base.to_string())
    }

    /// Add postal codes to a route as a new preference
    ///
    /// The zone is named after the selected zone when the selection is on this
    /// route, otherwise after the route's first zone, made unique among siblings.
    pub fn add_preference<I, S>(
        &mut self,
        route: &str,
        codes: I,
        lookup: &ZoneLookup,
    ) -> Result<AddOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = self.route_index(route)?;
        let current = &self.document.routes[index];
        let base = match self.selection {
            Some(selection) if selection.route == index => current
                .preferences
                .get(selection.preference)
                .map(|preference| preference.zone_name().to_string()),
            _ => None,
        }
        .or_else(|| current.preferences.first().map(|p| p.zone_name().to_string()))
        .unwrap_or_default();
        let existing: HashSet<String> = current.codes().into_iter().collect();

        Ok(self.add_codes(index, normalize_codes(codes), &base, &existing, lookup))
    }

    fn add_codes(
        &mut self,
        index: usize,
        codes: Vec<String>,
        base_name: &str,
        existing: &HashSet<String>,
        lookup: &ZoneLookup,
    ) -> AddOutcome {
        let (duplicates, mut to_create): (Vec<String>, Vec<String>) =
            codes.into_iter().partition(|code| existing.contains(code));
        let mut outcome = AddOutcome {
            duplicates,
            ..Default::default()
        };
        let route_name = self.document.routes[index].name.clone();

        if !outcome.duplicates.is_empty() {
            tracing::warn!(
                "Codes already in route {route_name}: {}",
                outcome.duplicates.join(", ")
            );
        }
        if to_create.is_empty() {
            return outcome;
        }

        let resolution = lookup.resolve(&to_create);
        outcome.missing = resolution.missing;
        let Some(shape) = resolution.shape else {
            tracing::warn!(
                "No boundary found for {} in route {route_name}, nothing added",
                to_create.join(", ")
            );
            return outcome;
        };
        outcome.added = resolution.resolved;

        let route = &self.document.routes[index];
        let base = match base_name.trim() {
            "" => route_name.as_str(),
            trimmed => trimmed,
        };
        let zone_name = Self::unique_zone_name(route, base);
        let network_id = route
            .extra
            .get("routingParameterId")
            .filter(|value| !value.is_null())
            .map(|value| match value {
                Value::String(s) => json!(s),
                other => json!(other.to_string()),
            })
            .unwrap_or_else(|| id_value(self.document.id.as_ref()));

        let mut zone_extra = Extra::new();
        zone_extra.insert("routingParameterId".to_string(), network_id);
        let zone = Zone {
            id: Some(self.ids.next_id()),
            name: zone_name.clone(),
            polygon_coordinates: codec::encode_with(
                &shape,
                self.config.edit_precision,
                self.config.line_ending,
            ),
            extra: zone_extra,
        };

        to_create.sort();
        let mut extra = Extra::new();
        extra.insert(
            "routingParameterVehicleId".to_string(),
            id_value(route.id.as_ref()),
        );
        extra.insert("tag".to_string(), json!(""));
        extra.insert("inPolygon".to_string(), json!(true));
        extra.insert("value".to_string(), json!(1.0));
        extra.insert("orderRank".to_string(), json!(1));
        let preference = Preference {
            id: Some(self.ids.next_id()),
            zip: to_create.join(","),
            zone: Some(zone),
            extra,
        };

        self.document.routes[index].preferences.push(preference);
        tracing::info!(
            "Created zone {zone_name} in route {route_name} for {} code(s)",
            outcome.added.len()
        );
        outcome.zone_name = Some(zone_name);
        outcome
    }

    /// Remove postal codes from the selected preference
    ///
    /// The remaining codes are merged again; when none remain the preference is
    /// deleted and the selection cleared. The route itself always stays.
    pub fn remove_preference<I, S>(&mut self, codes: I, lookup: &ZoneLookup) -> Result<RemoveOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selection = self.selected()?;
        let to_remove: HashSet<String> = normalize_codes(codes).into_iter().collect();
        let current = self.document.routes[selection.route].preferences[selection.preference].codes();

        let (mut removed, mut remaining): (Vec<String>, Vec<String>) = current
            .into_iter()
            .partition(|code| to_remove.contains(code));
        removed.sort();
        remaining.sort();
        remaining.dedup();

        let mut outcome = RemoveOutcome {
            removed,
            remaining,
            ..Default::default()
        };
        if outcome.removed.is_empty() {
            return Ok(outcome);
        }

        let route = &mut self.document.routes[selection.route];
        if outcome.remaining.is_empty() {
            let deleted = route.preferences.remove(selection.preference);
            self.selection = None;
            outcome.preference_deleted = true;
            tracing::info!(
                "Deleted zone {} from route {} (no code left)",
                deleted.zone_name(),
                route.name
            );
            return Ok(outcome);
        }

        let preference = &mut route.preferences[selection.preference];
        preference.zip = outcome.remaining.join(",");
        match lookup.resolve(&outcome.remaining).shape {
            Some(shape) => {
                preference.zone.get_or_insert_with(Zone::default).polygon_coordinates =
                    codec::encode_with(&shape, self.config.edit_precision, self.config.line_ending);
                outcome.regenerated = true;
            }
            None => tracing::warn!(
                "Remaining codes of {} produce no geometry, kept previous polygon",
                preference.zone_name()
            ),
        }
        Ok(outcome)
    }

    /// Apply the edit form to the selected zone
    ///
    /// Order: rename route, rename zone, set adjacency, remove codes, add codes.
    /// Names are validated up front, so a rejected name changes nothing.
    pub fn apply_edit(&mut self, request: &EditRequest, lookup: &ZoneLookup) -> Result<EditOutcome> {
        let selection = self.selected()?;
        let route_name = self.document.routes[selection.route].name.clone();
        let zone_name = self.document.routes[selection.route].preferences[selection.preference]
            .zone_name()
            .to_string();

        let new_route_name = request
            .route_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != route_name);
        if let Some(new_name) = new_route_name {
            self.check_rename(&route_name, new_name)?;
        }
        let new_zone_name = request
            .zone_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != zone_name);
        if let Some(new_name) = new_zone_name {
            self.check_zone_name(selection, new_name)?;
        }

        // Duplicates are judged against the codes the route had before this edit
        let existing: HashSet<String> = self.document.routes[selection.route]
            .codes()
            .into_iter()
            .collect();
        let mut outcome = EditOutcome::default();

        let mut current_name = route_name.clone();
        if let Some(new_name) = new_route_name {
            self.rename(&route_name, new_name)?;
            current_name = new_name.to_string();
            outcome.renamed = Some((route_name, current_name.clone()));
        }
        let mut base_name = zone_name;
        if let Some(new_name) = new_zone_name {
            self.set_zone_name(new_name)?;
            base_name = new_name.to_string();
            outcome.zone_renamed = true;
        }
        if let Some(adjacent) = &request.adjacent_routes {
            let route = &self.document.routes[selection.route];
            if route.adjacent_routes != *adjacent {
                self.set_adjacent(&current_name, adjacent)?;
                outcome.adjacency_changed = true;
            }
        }
        if !request.remove.is_empty() {
            outcome.removed = Some(self.remove_preference(&request.remove, lookup)?);
        }
        if !request.add.is_empty() {
            let codes = normalize_codes(&request.add);
            outcome.added = Some(self.add_codes(selection.route, codes, &base_name, &existing, lookup));
        }
        outcome.unresolved = unresolved_route_references(&self.document.routes);

        Ok(outcome)
    }

    /// Next free route number: from the range minimum in steps of the gap
    fn next_route_number(&self) -> Result<u32> {
        let gap = self.document.gap();
        let mut number = self.pattern.min;
        while self.used_numbers.contains(&number) {
            number = number.checked_add(gap).ok_or_else(|| self.range_exhausted())?;
        }
        if number > self.pattern.max {
            return Err(self.range_exhausted());
        }
        Ok(number)
    }

    fn range_exhausted(&self) -> ZoneError {
        ZoneError::Validation(format!(
            "no free route number left in {} with gap {}",
            self.pattern,
            self.document.gap()
        ))
    }

    /// Draft a route with the next free number
    ///
    /// The merged geometry is reduced to its largest part. Nothing is drafted
    /// when no code resolves.
    pub fn create_route<I, S>(
        &mut self,
        codes: I,
        options: RouteOptions,
        lookup: &ZoneLookup,
    ) -> Result<CreateOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes = normalize_codes(codes);
        let number = self.next_route_number()?;
        let resolution = lookup.resolve(&codes);
        let mut outcome = CreateOutcome {
            resolved: resolution.resolved,
            missing: resolution.missing,
            ..Default::default()
        };
        let Some(shape) = resolution.shape else {
            tracing::warn!("No route created: none of [{}] resolved", codes.join(", "));
            return Ok(outcome);
        };

        let name = self.pattern.format_name(number);
        let shape = ZoneShape::Polygon(codec::largest_part(shape));
        let network_id = id_value(self.document.id.as_ref());
        let route_id = self.ids.next_id();

        let mut zone_extra = Extra::new();
        zone_extra.insert("routingParameterId".to_string(), network_id.clone());
        let zone = Zone {
            id: Some(self.ids.next_id()),
            name: name.clone(),
            polygon_coordinates: codec::encode_with(
                &shape,
                self.config.generate_precision,
                self.config.line_ending,
            ),
            extra: zone_extra,
        };

        let mut preference_extra = Extra::new();
        preference_extra.insert(
            "routingParameterVehicleId".to_string(),
            json!(route_id.to_string()),
        );
        preference_extra.insert("tag".to_string(), json!(""));
        preference_extra.insert("inPolygon".to_string(), json!(true));
        preference_extra.insert("value".to_string(), json!(1.0));
        preference_extra.insert("orderRank".to_string(), json!(1));
        let preference = Preference {
            id: Some(self.ids.next_id()),
            zip: codes.join(","),
            zone: Some(zone),
            extra: preference_extra,
        };

        let mut extra = Extra::new();
        extra.insert("routingParameterId".to_string(), network_id);
        for key in [
            "precedence",
            "softPrecedence",
            "sourceLat",
            "sourceLng",
            "sinkLat",
            "sinkLng",
        ] {
            extra.insert(key.to_string(), Value::Null);
        }
        extra.insert("excludedRoutes".to_string(), json!(""));
        extra.insert("hardTarget".to_string(), json!(options.hard_target));
        extra.insert("electric".to_string(), json!(options.electric));

        let representative = match self.representative_mode() {
            RepresentativeMode::ByName => Representative::Name(String::new()),
            RepresentativeMode::ByFlag => Representative::Flag(false),
        };
        let route = Route {
            id: Some(route_id),
            name: name.clone(),
            adjacent_routes: String::new(),
            representative: Some(representative),
            preferences: vec![preference],
            extra,
        };

        self.used_numbers.insert(number);
        self.drafts.push(DraftRoute { route, shape });
        tracing::info!("Drafted route {name} ({} codes)", codes.len());
        outcome.name = Some(name);
        Ok(outcome)
    }

    /// Draft a route under an explicit name
    ///
    /// The zone is named `<route>_ZONE` and keeps every part of the merge.
    /// Routes drafted this way carry the boolean representative flavour.
    pub fn create_named_route<I, S>(
        &mut self,
        name: &str,
        codes: I,
        lookup: &ZoneLookup,
    ) -> Result<CreateOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.trim().to_uppercase();
        if name.is_empty() {
            return Err(ZoneError::Validation("route name is required".to_string()));
        }
        let number = self.pattern.validate_name(&name)?;
        if self.name_in_use(&name) {
            return Err(ZoneError::Validation(format!("route {name} already exists")));
        }
        let codes = normalize_codes(codes);
        if codes.is_empty() {
            return Err(ZoneError::Validation(format!(
                "route {name} needs at least one postal code"
            )));
        }

        let resolution = lookup.resolve(&codes);
        let mut outcome = CreateOutcome {
            resolved: resolution.resolved,
            missing: resolution.missing,
            ..Default::default()
        };
        let Some(shape) = resolution.shape else {
            tracing::warn!("No boundary found for {name}, route not created");
            return Ok(outcome);
        };

        let zone = Zone {
            id: Some(self.ids.next_id()),
            name: format!("{name}_ZONE"),
            polygon_coordinates: codec::encode_with(
                &shape,
                self.config.edit_precision,
                self.config.line_ending,
            ),
            extra: Extra::new(),
        };
        let mut preference_extra = Extra::new();
        preference_extra.insert("value".to_string(), json!(1.0));
        preference_extra.insert("orderRank".to_string(), json!(1));
        let route = Route {
            id: Some(self.ids.next_id()),
            name: name.clone(),
            adjacent_routes: String::new(),
            representative: Some(Representative::Flag(false)),
            preferences: vec![Preference {
                id: Some(self.ids.next_id()),
                zip: codes.join(","),
                zone: Some(zone),
                extra: preference_extra,
            }],
            extra: Extra::new(),
        };

        self.used_numbers.insert(number);
        self.drafts.push(DraftRoute { route, shape });
        tracing::info!("Drafted route {name} ({} codes)", codes.len());
        outcome.name = Some(name);
        Ok(outcome)
    }

    /// Commit drafted routes to the document
    ///
    /// A document without routes gets relations computed from scratch. Otherwise
    /// only the new routes are linked, with existing routes as predecessors.
    /// The derived lists are rebuilt afterwards. Requires a depot location;
    /// drafts are kept when it is missing.
    pub fn finalize(&mut self) -> Result<usize> {
        if self.drafts.is_empty() {
            return Ok(0);
        }
        let depot = self.document.depot_location.ok_or_else(|| {
            ZoneError::Validation("depotLocation is required to link new routes".to_string())
        })?;
        let mode = self.representative_mode();

        let existing = self.document.routes.len();
        let mut shapes: Vec<Option<ZoneShape>> =
            self.document.routes.iter().map(route_shape).collect();
        let drafts = std::mem::take(&mut self.drafts);
        let committed = drafts.len();
        for draft in drafts {
            self.document.routes.push(draft.route);
            shapes.push(Some(draft.shape));
        }

        if existing == 0 {
            compute_relations(&mut self.document.routes, &shapes, depot.point(), mode);
        } else {
            link_new_routes(&mut self.document.routes, &shapes, existing, depot.point(), mode);
        }
        self.document.sync_derived();
        tracing::info!("Committed {committed} new route(s)");
        Ok(committed)
    }

    /// Recompute every zone's polygon from its postal codes
    pub fn restructure(&mut self, lookup: &ZoneLookup) -> RestructureReport {
        #[cfg(feature = "profiling")]
        profiling::scope!("registry::restructure");

        let mut report = RestructureReport::default();
        let mut jobs = Vec::new();
        for (route_index, route) in self.document.routes.iter().enumerate() {
            for (preference_index, preference) in route.preferences.iter().enumerate() {
                let codes = preference.codes();
                if codes.is_empty() {
                    report.skipped += 1;
                } else {
                    jobs.push((route_index, preference_index, codes));
                }
            }
        }

        let precision = self.config.edit_precision;
        let line_ending = self.config.line_ending;
        let merged: Vec<(usize, usize, Option<String>)> = jobs
            .par_iter()
            .map(|(route_index, preference_index, codes)| {
                let text = lookup
                    .resolve(codes)
                    .shape
                    .map(|shape| codec::encode_with(&shape, precision, line_ending));
                (*route_index, *preference_index, text)
            })
            .collect();

        for (route_index, preference_index, text) in merged {
            let route = &mut self.document.routes[route_index];
            let route_name = route.name.clone();
            let preference = &mut route.preferences[preference_index];
            match text {
                Some(text) => {
                    let ids = &mut self.ids;
                    preference
                        .zone
                        .get_or_insert_with(|| Zone {
                            id: Some(ids.next_id()),
                            name: route_name,
                            ..Default::default()
                        })
                        .polygon_coordinates = text;
                    report.updated += 1;
                }
                None => {
                    report.errors += 1;
                    report
                        .failed
                        .push(format!("{route_name}/{}", preference.zone_name()));
                }
            }
        }

        tracing::info!(
            "Restructured {} zones ({} without geometry, {} without codes)",
            report.updated,
            report.errors,
            report.skipped
        );
        report
    }

    /// End the session: commit drafts and rebuild the derived lists
    pub fn finish(mut self) -> Result<RoutingConfig> {
        self.finalize()?;
        self.document.sync_derived();
        Ok(self.document)
    }
}

/// Assign the representative and the adjacency chain of every route
///
/// The representative is the first route whose shape contains the depot,
/// otherwise the one with the nearest centroid. Routes are then ordered by
/// centroid distance to the depot and each one points to its predecessor; the
/// nearest has no adjacency. Routes without geometry sort last. Returns the
/// index of the representative.
pub fn compute_relations(
    routes: &mut [Route],
    shapes: &[Option<ZoneShape>],
    depot: Point<f64>,
    mode: RepresentativeMode,
) -> Option<usize> {
    if routes.is_empty() {
        return None;
    }
    let distances = depot_distances(shapes, depot, routes.len());
    let representative = representative_index(shapes, &distances, depot)?;
    let names: Vec<String> = routes.iter().map(|route| route.name.clone()).collect();
    let order = distance_order(&distances);

    for (position, &index) in order.iter().enumerate() {
        let route = &mut routes[index];
        route.representative = Some(match mode {
            RepresentativeMode::ByName => Representative::Name(names[representative].clone()),
            RepresentativeMode::ByFlag => Representative::Flag(index == representative),
        });
        route.adjacent_routes = match position {
            0 => String::new(),
            _ => names[order[position - 1]].clone(),
        };
    }

    tracing::debug!("Representative route is {}", names[representative]);
    Some(representative)
}

/// Link routes appended after `first_new` into an existing network
///
/// Routes before `first_new` keep their adjacency. Each new route points to the
/// route just before it in depot-distance order, which may be an existing one,
/// and inherits the network's representative. The representative is computed
/// over all routes only when no existing route carries one; in flag style an
/// existing route chosen that way gets its flag set.
pub fn link_new_routes(
    routes: &mut [Route],
    shapes: &[Option<ZoneShape>],
    first_new: usize,
    depot: Point<f64>,
    mode: RepresentativeMode,
) {
    if first_new >= routes.len() {
        return;
    }
    let distances = depot_distances(shapes, depot, routes.len());
    let names: Vec<String> = routes.iter().map(|route| route.name.clone()).collect();
    let order = distance_order(&distances);

    let existing = &routes[..first_new];
    let representative = match mode {
        RepresentativeMode::ByName => existing
            .iter()
            .find_map(|route| route.representative.as_ref()?.name().map(str::to_string))
            .filter(|name| !name.is_empty()),
        RepresentativeMode::ByFlag => existing
            .iter()
            .find(|route| route.representative == Some(Representative::Flag(true)))
            .map(|route| route.name.clone()),
    };
    let representative = match representative {
        Some(name) => name,
        None => {
            let Some(index) = representative_index(shapes, &distances, depot) else {
                return;
            };
            if mode == RepresentativeMode::ByFlag && index < first_new {
                routes[index].representative = Some(Representative::Flag(true));
            }
            names[index].clone()
        }
    };

    for (position, &index) in order.iter().enumerate() {
        if index < first_new {
            continue;
        }
        let route = &mut routes[index];
        route.representative = Some(match mode {
            RepresentativeMode::ByName => Representative::Name(representative.clone()),
            RepresentativeMode::ByFlag => Representative::Flag(route.name == representative),
        });
        route.adjacent_routes = match position {
            0 => String::new(),
            _ => names[order[position - 1]].clone(),
        };
    }
    tracing::debug!(
        "Linked {} new route(s), representative {representative}",
        routes.len() - first_new
    );
}

/// Centroid distance of each route to the depot, infinite without geometry
fn depot_distances(shapes: &[Option<ZoneShape>], depot: Point<f64>, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| {
            shapes
                .get(i)
                .and_then(Option::as_ref)
                .and_then(ZoneShape::centroid)
                .map(|c| (c.x() - depot.x()).hypot(c.y() - depot.y()))
                .unwrap_or(f64::INFINITY)
        })
        .collect()
}

/// First route containing the depot, otherwise the nearest one
fn representative_index(
    shapes: &[Option<ZoneShape>],
    distances: &[f64],
    depot: Point<f64>,
) -> Option<usize> {
    (0..distances.len())
        .find(|&i| {
            shapes
                .get(i)
                .and_then(Option::as_ref)
                .is_some_and(|s| s.contains_point(&depot))
        })
        .or_else(|| (0..distances.len()).min_by(|&a, &b| distances[a].total_cmp(&distances[b])))
}

fn distance_order(distances: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    order
}
