//! Bulk renumbering of routes into a new admissible range
//!
//! Routes are renumbered positionally: the Nth route carrying the prefix gets
//! `min + (N - 1) * gap`, whatever its previous number was. The old-to-new name
//! mapping is then applied to adjacency lists, representatives and graph-node
//! labels, and every reference is checked against the final route names.

use crate::document::{Representative, Route, RoutePattern, RoutingConfig, split_references};
use crate::{Result, ZoneError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Category of a change-log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Info,
    Rename,
    UpdatedRoute,
    Adjacency,
    Representative,
    Node,
    Warn,
    Ok,
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            LogTag::Info => "[INFO]",
            LogTag::Rename => "[RENAME]",
            LogTag::UpdatedRoute => "[UPDATED_ROUTE]",
            LogTag::Adjacency => "[ADJ]",
            LogTag::Representative => "[REP]",
            LogTag::Node => "[NODE]",
            LogTag::Warn => "[WARN]",
            LogTag::Ok => "[OK]",
        };
        f.write_str(tag)
    }
}

/// Plain-text record of the changes made by a remap, one line per change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    entries: Vec<(LogTag, String)>,
}

impl ChangeLog {
    pub fn push(&mut self, tag: LogTag, message: impl Into<String>) {
        self.entries.push((tag, message.into()));
    }

    pub fn entries(&self) -> &[(LogTag, String)] {
        &self.entries
    }

    /// Entries with the given tag
    pub fn tagged(&self, tag: LogTag) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(t, _)| *t == tag)
            .map(|(_, message)| message.as_str())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File name for a log written at `time`: `CHANGE_LOG_<yyyymmdd-hhmmss>.txt`
    pub fn file_name<Tz: chrono::TimeZone>(time: &chrono::DateTime<Tz>) -> String
    where
        Tz::Offset: fmt::Display,
    {
        format!("CHANGE_LOG_{}.txt", time.format("%Y%m%d-%H%M%S"))
    }
}

impl fmt::Display for ChangeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (tag, message)) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{tag} {message}")?;
        }
        Ok(())
    }
}

/// Outcome of a remap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemapReport {
    /// Old name to new name, in document order (first occurrence of each old name)
    pub mapping: Vec<(String, String)>,
    /// Routes whose name actually changed
    pub renamed: Vec<(String, String)>,
    /// New names beyond the new maximum
    pub overflow: Vec<String>,
    /// References naming no route after the remap
    pub unresolved: BTreeSet<String>,
    pub log: ChangeLog,
}

impl RemapReport {
    /// Whether every reference resolves
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Renumbers every route into a new range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRemapper {
    pub new_min: u32,
    pub new_max: u32,
    /// Rewrite adjacency, representative and node-label references
    pub update_references: bool,
}

impl RangeRemapper {
    /// New range `[new_min, new_max]`, which must satisfy `new_min < new_max`
    pub fn new(new_min: u32, new_max: u32) -> Result<Self> {
        if new_min >= new_max {
            return Err(ZoneError::Validation(format!(
                "new minimum {new_min} must be strictly below new maximum {new_max}"
            )));
        }
        Ok(Self {
            new_min,
            new_max,
            update_references: true,
        })
    }

    pub fn with_update_references(mut self, update_references: bool) -> Self {
        self.update_references = update_references;
        self
    }

    /// Renumber the document's routes
    ///
    /// Fails only on a malformed admissible pattern. Dangling references and
    /// numbers beyond the new maximum are reported, the document is still
    /// rewritten.
    pub fn apply(&self, document: &mut RoutingConfig) -> Result<RemapReport> {
        let pattern = document.pattern()?;
        let prefix = pattern.prefix.clone();
        let gap = u64::from(document.gap());
        let mut report = RemapReport::default();

        let new_pattern = RoutePattern::new(prefix.as_str(), self.new_min, self.new_max);
        document.admissible_route_patterns = Some(new_pattern.to_string());
        report.log.push(
            LogTag::Info,
            format!(
                "Range updated: {prefix}{} -> {prefix}{}",
                self.new_min, self.new_max
            ),
        );

        // Positional assignment, one new name per matching route
        let mut assignments: Vec<(usize, String)> = Vec::new();
        let mut lookup: HashMap<String, String> = HashMap::new();
        let mut number = u64::from(self.new_min);
        for (index, route) in document.routes.iter().enumerate() {
            if !pattern.matches_prefix(&route.name) {
                continue;
            }
            let new_name = format!("{prefix}{number}");
            if number > u64::from(self.new_max) {
                report.log.push(
                    LogTag::Warn,
                    format!("{} -> {new_name} exceeds the new maximum", route.name),
                );
                report.overflow.push(new_name.clone());
            }
            if lookup.contains_key(&route.name) {
                report.log.push(
                    LogTag::Warn,
                    format!(
                        "Duplicate route name {}, references keep the first mapping",
                        route.name
                    ),
                );
            } else {
                lookup.insert(route.name.clone(), new_name.clone());
                report.mapping.push((route.name.clone(), new_name.clone()));
            }
            report
                .log
                .push(LogTag::Rename, format!("{} -> {new_name}", route.name));
            assignments.push((index, new_name));
            number += gap;
        }

        for (index, new_name) in assignments {
            let route = &mut document.routes[index];
            if route.name != new_name {
                let old_name = std::mem::replace(&mut route.name, new_name.clone());
                report.log.push(
                    LogTag::UpdatedRoute,
                    format!("Route renamed: {old_name} -> {new_name}"),
                );
                report.renamed.push((old_name, new_name));
            }
        }

        if self.update_references {
            rewrite_references(document, &lookup, &mut report.log);
        }

        report.unresolved = unresolved_references(document);
        if report.unresolved.is_empty() {
            report
                .log
                .push(LogTag::Ok, "All references resolve to existing routes");
        } else {
            let list = report.unresolved.iter().cloned().collect::<Vec<_>>().join(", ");
            tracing::warn!("Unresolved references after remap: {list}");
            report
                .log
                .push(LogTag::Warn, format!("Unresolved references: {list}"));
        }

        tracing::info!(
            "Remapped {} routes into {new_pattern} ({} renamed, {} over the maximum)",
            report.mapping.len(),
            report.renamed.len(),
            report.overflow.len()
        );
        Ok(report)
    }
}

/// Map each token of a reference list, rejoined with `,`
fn remap_list(text: &str, mapping: &HashMap<String, String>) -> String {
    split_references(text)
        .into_iter()
        .map(|token| mapping.get(token).map(String::as_str).unwrap_or(token))
        .collect::<Vec<_>>()
        .join(",")
}

fn rewrite_references(
    document: &mut RoutingConfig,
    mapping: &HashMap<String, String>,
    log: &mut ChangeLog,
) {
    for route in &mut document.routes {
        if !route.adjacent_routes.trim().is_empty() {
            let updated = remap_list(&route.adjacent_routes, mapping);
            if updated != route.adjacent_routes {
                log.push(
                    LogTag::Adjacency,
                    format!("{}: {} -> {updated}", route.name, route.adjacent_routes),
                );
                route.adjacent_routes = updated;
            }
        }

        if let Some(Representative::Name(name)) = &mut route.representative {
            let old = name.trim().to_string();
            if let Some(new) = mapping.get(&old) {
                log.push(
                    LogTag::Representative,
                    format!("{}: representative {old} -> {new}", route.name),
                );
                *name = new.clone();
            }
        }
    }

    for node in &mut document.nodes {
        if node.label.is_empty() {
            continue;
        }
        let updated = remap_list(&node.label, mapping);
        if updated != node.label {
            log.push(
                LogTag::Node,
                format!("Label updated: {} -> {updated}", node.label),
            );
            node.label = updated;
        }
    }
}

/// References (adjacency, representative name, node label) naming no route
pub fn unresolved_references(document: &RoutingConfig) -> BTreeSet<String> {
    let names: HashSet<&str> = document.routes.iter().map(|r| r.name.as_str()).collect();
    let node_references = document
        .nodes
        .iter()
        .flat_map(|node| split_references(&node.label))
        .filter(|reference| !names.contains(reference))
        .map(str::to_string);

    let mut unresolved = unresolved_route_references(&document.routes);
    unresolved.extend(node_references);
    unresolved
}

/// Adjacency and representative names that match no route in `routes`
pub fn unresolved_route_references(routes: &[Route]) -> BTreeSet<String> {
    let names: HashSet<&str> = routes.iter().map(|r| r.name.as_str()).collect();
    routes
        .iter()
        .flat_map(|route| {
            let representative = match &route.representative {
                Some(Representative::Name(name)) => split_references(name),
                _ => Vec::new(),
            };
            split_references(&route.adjacent_routes)
                .into_iter()
                .chain(representative)
        })
        .filter(|reference| !names.contains(reference))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn document(names: &[&str], adjacency: &[&str]) -> RoutingConfig {
        let routes: Vec<_> = names
            .iter()
            .zip(adjacency)
            .map(|(name, adjacent)| {
                json!({
                    "name": name,
                    "adjacentRoutes": adjacent,
                    "representative": names[0],
                })
            })
            .collect();
        let nodes: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, name)| json!({"id": i, "label": name}))
            .collect();
        serde_json::from_value(json!({
            "admissibleRoutePatterns": "MONT|1500|1999",
            "routeNumberGap": 5,
            "routingParameterUiVehicleDTOs": routes,
            "routingParameterNodeDTOs": nodes,
        }))
        .unwrap()
    }

    fn names(document: &RoutingConfig) -> Vec<&str> {
        document.routes.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_rejects_invalid_range() {
        assert!(matches!(
            RangeRemapper::new(2000, 2000),
            Err(ZoneError::Validation(_))
        ));
        assert!(RangeRemapper::new(2100, 2000).is_err());
        assert!(RangeRemapper::new(0, 1).is_ok());
    }

    #[test]
    fn test_positional_renumbering() {
        let mut doc = document(
            &["MONT1500", "MONT1505", "MONT1510"],
            &["", "MONT1500", "MONT1505"],
        );
        let report = RangeRemapper::new(2000, 2499)
            .unwrap()
            .apply(&mut doc)
            .unwrap();

        assert_eq!(names(&doc), vec!["MONT2000", "MONT2005", "MONT2010"]);
        assert_eq!(doc.admissible_route_patterns.as_deref(), Some("MONT|2000|2499"));
        assert_eq!(doc.routes[1].adjacent_routes, "MONT2000");
        assert_eq!(doc.routes[2].adjacent_routes, "MONT2005");
        assert_eq!(
            doc.routes[2].representative,
            Some(Representative::Name("MONT2000".to_string()))
        );
        assert_eq!(doc.nodes[1].label, "MONT2005");
        assert!(report.is_consistent());
        assert_eq!(report.renamed.len(), 3);
        assert_eq!(report.log.tagged(LogTag::Ok).count(), 1);
    }

    #[test]
    fn test_order_not_value_decides_numbers() {
        let mut doc = document(&["MONT1510", "MONT1500", "LAVAL7", "MONT1505"], &["", "", "", ""]);
        let report = RangeRemapper::new(2000, 2499)
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        assert_eq!(names(&doc), vec!["MONT2000", "MONT2005", "LAVAL7", "MONT2010"]);
        assert_eq!(report.mapping[0], ("MONT1510".to_string(), "MONT2000".to_string()));
        // LAVAL7 still has its node label, and it still resolves
        assert!(report.is_consistent());
    }

    #[test]
    fn test_dangling_adjacency_is_reported() {
        let mut doc = document(
            &["MONT1500", "MONT1505", "MONT1510"],
            &["", "MONT1500;MONT1700", "MONT1505"],
        );
        let report = RangeRemapper::new(2000, 2499)
            .unwrap()
            .apply(&mut doc)
            .unwrap();

        assert_eq!(doc.routes[1].adjacent_routes, "MONT2000,MONT1700");
        assert_eq!(
            report.unresolved.iter().collect::<Vec<_>>(),
            vec!["MONT1700"]
        );
        assert_eq!(report.log.tagged(LogTag::Warn).count(), 1);
    }

    #[test]
    fn test_keep_references_leaves_them_dangling() {
        let mut doc = document(&["MONT1500", "MONT1505"], &["", "MONT1500"]);
        let report = RangeRemapper::new(2000, 2499)
            .unwrap()
            .with_update_references(false)
            .apply(&mut doc)
            .unwrap();

        assert_eq!(doc.routes[1].adjacent_routes, "MONT1500");
        assert_eq!(doc.nodes[0].label, "MONT1500");
        assert_eq!(
            report.unresolved.into_iter().collect::<Vec<_>>(),
            vec!["MONT1500", "MONT1505"]
        );
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut doc = document(&["MONT1500", "MONT1505", "MONT1510"], &["", "", ""]);
        let report = RangeRemapper::new(2000, 2006)
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        assert_eq!(names(&doc), vec!["MONT2000", "MONT2005", "MONT2010"]);
        assert_eq!(report.overflow, vec!["MONT2010"]);
    }

    #[test]
    fn test_duplicate_names_get_distinct_numbers() {
        let mut doc = document(&["MONT1500", "MONT1500", "MONT1505"], &["", "", "MONT1500"]);
        let report = RangeRemapper::new(2000, 2499)
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        assert_eq!(names(&doc), vec!["MONT2000", "MONT2005", "MONT2010"]);
        assert_eq!(doc.routes[2].adjacent_routes, "MONT2000");
        assert_eq!(report.mapping.len(), 2);
    }

    #[test]
    fn test_flag_representatives_are_left_alone() {
        let mut doc: RoutingConfig = serde_json::from_value(json!({
            "admissibleRoutePatterns": "MONT|1500|1999",
            "routingParameterUiVehicleDTOs": [
                {"name": "MONT1500", "representative": true},
                {"name": "MONT1501", "representative": false, "adjacentRoutes": "MONT1500"}
            ]
        }))
        .unwrap();
        let report = RangeRemapper::new(10, 20).unwrap().apply(&mut doc).unwrap();
        assert_eq!(names(&doc), vec!["MONT10", "MONT11"]);
        assert_eq!(doc.routes[0].representative, Some(Representative::Flag(true)));
        assert_eq!(doc.routes[1].adjacent_routes, "MONT10");
        assert!(report.is_consistent());
    }

    #[test]
    fn test_change_log_text() {
        let mut doc = document(&["MONT1500", "MONT1505"], &["", "MONT1500"]);
        let report = RangeRemapper::new(2000, 2499)
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        let text = report.log.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[INFO] Range updated: MONT2000 -> MONT2499");
        assert_eq!(lines[1], "[RENAME] MONT1500 -> MONT2000");
        assert!(text.contains("[UPDATED_ROUTE] Route renamed: MONT1505 -> MONT2005"));
        assert!(text.contains("[ADJ] MONT2005: MONT1500 -> MONT2000"));
        assert!(text.contains("[NODE] Label updated: MONT1500 -> MONT2000"));
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn test_change_log_file_name() {
        let time = chrono::Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(ChangeLog::file_name(&time), "CHANGE_LOG_20250309-140507.txt");
    }

    #[test]
    fn test_unresolved_references_on_consistent_document() {
        let doc = document(&["MONT1500", "MONT1505"], &["", "MONT1500"]);
        assert!(unresolved_references(&doc).is_empty());
    }
}
