//! Subcommand handlers.
//!
//! Each workflow is a function over already-loaded inputs so it can be tested
//! without touching the filesystem; [`run`] wires them to the CLI settings.

use crate::settings::{Command, Settings};
use crate::storage::{self, DocumentStore, FileStore, StorageError};
use geo::Point;
use serde::Deserialize;
use std::fmt::Write as _;
use thiserror::Error;
use zone_config_lib::{
    CreateOutcome, EditOutcome, EditRequest, EditorConfig, NewDocument, RangeRemapper,
    RemapReport, RouteOptions, RouteRegistry, RouteState, RoutingConfig, ZoneError, ZoneHit,
    ZoneIndex, ZoneLookup, unresolved_references,
};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("--{0} is required for this command")]
    MissingArgument(&'static str),

    #[error("No zone contains ({lat}, {lon})")]
    NoZoneAt { lat: f64, lon: f64 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Zone(#[from] ZoneError),
}

pub type CommandResult<T> = Result<T, CommandError>;

fn default_true() -> bool {
    true
}

/// Input of the `generate` subcommand
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPlan {
    pub settings: NewDocument,
    pub routes: Vec<PlannedRoute>,
}

/// One route to generate, numbered automatically unless `name` is given
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedRoute {
    #[serde(default)]
    pub name: Option<String>,
    pub codes: Vec<String>,
    #[serde(default = "default_true")]
    pub hard_target: bool,
    #[serde(default)]
    pub electric: bool,
}

/// Human-readable overview of a document
pub fn inspect(registry: &RouteRegistry) -> String {
    let document = registry.document();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Network {} ({})",
        document.name.as_deref().unwrap_or("<unnamed>"),
        document.id.as_ref().map(ToString::to_string).unwrap_or_default()
    );
    let _ = writeln!(out, "Pattern {} (gap {})", registry.pattern(), document.gap());
    match document.depot_location {
        Some(depot) => {
            let _ = writeln!(out, "Depot {}, {}", depot.latitude, depot.longitude);
        }
        None => {
            let _ = writeln!(out, "Depot <missing>");
        }
    }
    let _ = writeln!(
        out,
        "{} routes, representative by {:?}",
        document.routes.len(),
        registry.representative_mode()
    );
    for route in &document.routes {
        let state = match registry.route_state(&route.name) {
            Some(RouteState::Emptied) => " [empty]",
            _ => "",
        };
        let _ = writeln!(
            out,
            "  {}{state} -> [{}] zones: {}",
            route.name,
            route.adjacent_routes,
            route.zone_names().join(", ")
        );
    }
    let _ = writeln!(
        out,
        "Derived: {} zones, {} nodes, {} edges",
        document.zones.len(),
        document.nodes.len(),
        document.edges.len()
    );
    let dangling = unresolved_references(document);
    if !dangling.is_empty() {
        let names: Vec<&str> = dangling.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Unresolved references: {}", names.join(", "));
    }
    out
}

/// Zone owning a point, described on one line
pub fn describe_hit(hit: &ZoneHit) -> String {
    format!("{} / {} [{}]", hit.route_name, hit.zone_name, hit.zip)
}

/// Select the zone under a point and apply the edit form to it
pub fn edit(
    registry: &mut RouteRegistry,
    lat: f64,
    lon: f64,
    request: &EditRequest,
    lookup: &ZoneLookup,
) -> CommandResult<EditOutcome> {
    registry
        .select_point(Point::new(lon, lat))
        .ok_or(CommandError::NoZoneAt { lat, lon })?;
    let outcome = registry.apply_edit(request, lookup)?;

    if let Some((from, to)) = &outcome.renamed {
        tracing::info!("Renamed {from} to {to}");
    }
    if let Some(removed) = &outcome.removed {
        tracing::info!(
            "Removed [{}], remaining [{}]",
            removed.removed.join(", "),
            removed.remaining.join(", ")
        );
    }
    if let Some(added) = &outcome.added {
        if !added.duplicates.is_empty() {
            tracing::warn!("Already on the route: {}", added.duplicates.join(", "));
        }
        if !added.missing.is_empty() {
            tracing::warn!("No boundary for: {}", added.missing.join(", "));
        }
        if let Some(zone) = &added.zone_name {
            tracing::info!("Added [{}] as zone {zone}", added.added.join(", "));
        }
    }
    for name in &outcome.unresolved {
        tracing::warn!("{name} is still referenced but no longer names a route");
    }
    Ok(outcome)
}

/// Renumber routes in place
pub fn remap(
    document: &mut RoutingConfig,
    min: u32,
    max: u32,
    keep_references: bool,
) -> CommandResult<RemapReport> {
    let report = RangeRemapper::new(min, max)?
        .with_update_references(!keep_references)
        .apply(document)?;
    for name in &report.overflow {
        tracing::warn!("{name} is outside the new range");
    }
    if !report.is_consistent() {
        tracing::warn!(
            "References left unresolved: {}",
            report.unresolved.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(report)
}

/// Build a new document from a plan
pub fn generate(
    plan: GenerationPlan,
    lookup: &ZoneLookup,
) -> CommandResult<(RoutingConfig, Vec<CreateOutcome>)> {
    let mut registry = RouteRegistry::new_document(plan.settings, EditorConfig::default())?;
    let mut outcomes = Vec::with_capacity(plan.routes.len());
    for planned in &plan.routes {
        let outcome = match &planned.name {
            Some(name) => registry.create_named_route(name, &planned.codes, lookup)?,
            None => registry.create_route(
                &planned.codes,
                RouteOptions {
                    hard_target: planned.hard_target,
                    electric: planned.electric,
                },
                lookup,
            )?,
        };
        if !outcome.missing.is_empty() {
            tracing::warn!("No boundary for: {}", outcome.missing.join(", "));
        }
        outcomes.push(outcome);
    }
    Ok((registry.finish()?, outcomes))
}

fn load_lookup(settings: &Settings) -> CommandResult<ZoneLookup> {
    let path = settings
        .boundaries
        .as_ref()
        .ok_or(CommandError::MissingArgument("boundaries"))?;
    Ok(ZoneLookup::from_path(path, settings.boundary_crs)?)
}

fn document_store(settings: &Settings) -> CommandResult<FileStore> {
    settings
        .document
        .as_ref()
        .map(FileStore::new)
        .ok_or(CommandError::MissingArgument("document"))
}

fn output_store(settings: &Settings) -> CommandResult<FileStore> {
    settings
        .output_path()
        .map(FileStore::new)
        .ok_or(CommandError::MissingArgument("output"))
}

fn open_registry(settings: &Settings) -> CommandResult<RouteRegistry> {
    let document = document_store(settings)?.load()?;
    Ok(RouteRegistry::from_document(document, EditorConfig::default())?)
}

/// Execute the subcommand selected on the command line
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn run(settings: &Settings) -> CommandResult<()> {
    match &settings.command {
        Command::Inspect => {
            print!("{}", inspect(&open_registry(settings)?));
        }
        Command::Fsas => {
            for identifier in load_lookup(settings)?.known_identifiers() {
                println!("{identifier}");
            }
        }
        Command::Locate { lat, lon } => {
            let document = document_store(settings)?.load()?;
            let index = ZoneIndex::build(&document);
            let hit = index
                .locate_latlon(*lat, *lon)
                .ok_or(CommandError::NoZoneAt { lat: *lat, lon: *lon })?;
            println!("{}", describe_hit(hit));
        }
        Command::Edit {
            lat,
            lon,
            route_name,
            zone_name,
            add,
            remove,
            adjacent,
        } => {
            let lookup = if add.is_empty() && remove.is_empty() {
                ZoneLookup::new()
            } else {
                load_lookup(settings)?
            };
            let request = EditRequest {
                route_name: route_name.clone(),
                zone_name: zone_name.clone(),
                adjacent_routes: adjacent.clone(),
                add: add.clone(),
                remove: remove.clone(),
            };
            let mut registry = open_registry(settings)?;
            edit(&mut registry, *lat, *lon, &request, &lookup)?;
            output_store(settings)?.save(&registry.finish()?)?;
        }
        Command::Restructure => {
            let lookup = load_lookup(settings)?;
            let mut registry = open_registry(settings)?;
            let report = registry.restructure(&lookup);
            for zone in &report.failed {
                tracing::warn!("No geometry for {zone}");
            }
            println!(
                "{} zones updated, {} errors, {} skipped",
                report.updated, report.errors, report.skipped
            );
            output_store(settings)?.save(&registry.finish()?)?;
        }
        Command::Remap {
            min,
            max,
            keep_references,
            log_dir,
        } => {
            let mut document = document_store(settings)?.load()?;
            let report = remap(&mut document, *min, *max, *keep_references)?;
            let path = storage::write_change_log(log_dir, &report.log, &chrono::Local::now())?;
            println!(
                "{} routes renamed, change log at {}",
                report.renamed.len(),
                path.display()
            );
            output_store(settings)?.save(&document)?;
        }
        Command::Generate { plan } => {
            let plan: GenerationPlan = storage::load_json(plan)?;
            let lookup = load_lookup(settings)?;
            let (document, outcomes) = generate(plan, &lookup)?;
            let created = outcomes.iter().filter(|o| o.name.is_some()).count();
            println!("{created} of {} routes generated", outcomes.len());
            let store = settings
                .output
                .as_ref()
                .map(FileStore::new)
                .ok_or(CommandError::MissingArgument("output"))?;
            store.save(&document)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use geo::polygon;
    use serde_json::json;
    use zone_config_lib::Representative;

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
        lookup.insert("H9S", square(0.0, 0.0));
        lookup.insert("H9T", square(5.0, 0.0));
        lookup.insert("H9W", square(1.0, 0.0));
        lookup
    }

    fn plan() -> GenerationPlan {
        serde_json::from_value(json!({
            "settings": {
                "id": "4485",
                "name": "Montreal",
                "admissibleRoutePatterns": "MONT|1500|1599",
                "depotLocation": {"latitude": 0.5, "longitude": 0.5},
                "routeNumberGap": 5
            },
            "routes": [
                {"codes": ["H9S"]},
                {"codes": ["h9t", "ZZZ"], "electric": true}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_generate_links_routes_to_depot() {
        let (document, outcomes) = generate(plan(), &test_lookup()).unwrap();

        assert_eq!(outcomes[0].name.as_deref(), Some("MONT1500"));
        assert_eq!(outcomes[1].name.as_deref(), Some("MONT1505"));
        assert_eq!(outcomes[1].missing, vec!["ZZZ"]);

        assert_eq!(document.routes.len(), 2);
        assert_eq!(document.routes[0].adjacent_routes, "");
        assert_eq!(document.routes[1].adjacent_routes, "MONT1500");
        assert_eq!(
            document.routes[1].representative,
            Some(Representative::Name("MONT1500".to_string()))
        );
        assert_eq!(document.routes[1].extra["electric"], json!(true));
        assert_eq!(document.nodes.len(), 2);
        assert_eq!(document.edges.len(), 1);
        assert_eq!(document.nb_vehicle, Some(2));
    }

    #[test]
    fn test_edit_selects_by_point() {
        let (document, _) = generate(plan(), &test_lookup()).unwrap();
        let mut registry = RouteRegistry::from_document(document, EditorConfig::default()).unwrap();
        let request = EditRequest {
            route_name: Some("MONT1510".to_string()),
            add: vec!["H9W".to_string()],
            ..Default::default()
        };

        let outcome = edit(&mut registry, 0.5, 5.5, &request, &test_lookup()).unwrap();
        assert_eq!(
            outcome.renamed,
            Some(("MONT1505".to_string(), "MONT1510".to_string()))
        );
        assert_eq!(outcome.added.unwrap().added, vec!["H9W"]);
        let route = &registry.document().routes[1];
        assert_eq!(route.name, "MONT1510");
        assert_eq!(route.preferences.len(), 2);
    }

    #[test]
    fn test_edit_rename_reports_dangling_references() {
        let (document, _) = generate(plan(), &test_lookup()).unwrap();
        let mut registry = RouteRegistry::from_document(document, EditorConfig::default()).unwrap();
        let request = EditRequest {
            route_name: Some("MONT1520".to_string()),
            ..Default::default()
        };

        let outcome = edit(&mut registry, 0.5, 0.5, &request, &test_lookup()).unwrap();
        assert_eq!(
            outcome.renamed,
            Some(("MONT1500".to_string(), "MONT1520".to_string()))
        );
        assert!(outcome.unresolved.contains("MONT1500"));
        assert_eq!(registry.document().routes[1].adjacent_routes, "MONT1500");
    }

    #[test]
    fn test_edit_outside_every_zone() {
        let (document, _) = generate(plan(), &test_lookup()).unwrap();
        let mut registry = RouteRegistry::from_document(document, EditorConfig::default()).unwrap();
        let err = edit(&mut registry, 50.0, 50.0, &EditRequest::default(), &ZoneLookup::new())
            .unwrap_err();
        assert!(matches!(err, CommandError::NoZoneAt { .. }));
    }

    #[test]
    fn test_inspect_lists_routes() {
        let (document, _) = generate(plan(), &test_lookup()).unwrap();
        let registry = RouteRegistry::from_document(document, EditorConfig::default()).unwrap();
        let text = inspect(&registry);
        assert!(text.starts_with("Network Montreal (4485)\n"));
        assert!(text.contains("Pattern MONT|1500|1599 (gap 5)"));
        assert!(text.contains("  MONT1505 -> [MONT1500] zones: MONT1505"));
        assert!(text.contains("Derived: 2 zones, 2 nodes, 1 edges"));
        assert!(!text.contains("Unresolved"));
    }

    #[test]
    fn test_remap_renames_and_logs() {
        let (mut document, _) = generate(plan(), &test_lookup()).unwrap();
        let report = remap(&mut document, 2000, 2999, false).unwrap();
        assert!(report.is_consistent());
        assert_eq!(document.routes[0].name, "MONT2000");
        assert_eq!(document.routes[1].adjacent_routes, "MONT2000");
        assert!(!report.log.is_empty());

        assert!(matches!(
            remap(&mut document, 10, 10, false),
            Err(CommandError::Zone(ZoneError::Validation(_)))
        ));
    }

    #[test]
    fn test_run_requires_document() {
        let settings = Settings::parse_from(["zone-config-editor", "inspect"]);
        assert!(matches!(
            run(&settings),
            Err(CommandError::MissingArgument("document"))
        ));
    }

    #[test]
    fn test_run_edit_writes_output() {
        let dir = std::env::temp_dir().join(format!("zone-config-editor-run-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let input = dir.join("config.json");
        let output = dir.join("edited.json");
        let (document, _) = generate(plan(), &test_lookup()).unwrap();
        FileStore::new(&input).save(&document).unwrap();

        let settings = Settings::parse_from([
            "zone-config-editor",
            "edit",
            "--lat",
            "0.5",
            "--lon",
            "0.5",
            "--zone-name",
            "Downtown",
            "--document",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ]);
        run(&settings).unwrap();

        let edited = FileStore::new(&output).load().unwrap();
        assert_eq!(edited.routes[0].zone_names(), vec!["Downtown"]);
        assert_eq!(edited.zones[0].name, "Downtown");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
