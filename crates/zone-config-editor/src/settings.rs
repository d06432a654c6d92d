use clap::{Parser, Subcommand};
use std::path::PathBuf;
use zone_config_lib::Crs;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Zone Config Editor - Edit the postal-code zones of a delivery-routing configuration
pub struct Settings {
    /// Routing configuration document (JSON)
    #[clap(short, long, value_name = "FILE", global = true)]
    pub document: Option<PathBuf>,

    /// Postal-code boundary dataset (GeoJSON FeatureCollection)
    #[clap(short, long, value_name = "FILE", global = true)]
    pub boundaries: Option<PathBuf>,

    /// Coordinate reference of the boundary dataset, overrides the one it declares
    #[clap(long, value_name = "EPSG", global = true, value_parser = parse_crs)]
    pub boundary_crs: Option<Crs>,

    /// Where to write the result (defaults to overwriting --document)
    #[clap(short, long, value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,

    /// Log at debug level regardless of the build profile
    #[clap(short, long, default_value = "false", global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Summarize routes, zones, numbering pattern and depot
    Inspect,

    /// List the postal codes known to the boundary dataset
    Fsas,

    /// Show which zone owns a point
    Locate {
        #[clap(long, allow_hyphen_values = true)]
        lat: f64,
        #[clap(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Select the zone under a point and edit it
    Edit {
        #[clap(long, allow_hyphen_values = true)]
        lat: f64,
        #[clap(long, allow_hyphen_values = true)]
        lon: f64,

        /// New name for the owning route
        #[clap(long)]
        route_name: Option<String>,

        /// New name for the selected zone
        #[clap(long)]
        zone_name: Option<String>,

        /// Postal codes to add as a new zone of the route (comma or semicolon separated)
        #[clap(long, value_delimiter = ',')]
        add: Vec<String>,

        /// Postal codes to remove from the selected zone
        #[clap(long, value_delimiter = ',')]
        remove: Vec<String>,

        /// Replace the route's adjacency list verbatim
        #[clap(long)]
        adjacent: Option<String>,
    },

    /// Recompute every zone polygon from its postal codes
    Restructure,

    /// Renumber every route into a new range
    Remap {
        #[clap(long)]
        min: u32,
        #[clap(long)]
        max: u32,

        /// Only rename routes, leave adjacency and representatives as they are
        #[clap(long, default_value = "false")]
        keep_references: bool,

        /// Directory receiving the change log
        #[clap(long, value_name = "DIR", default_value = "logs")]
        log_dir: PathBuf,
    },

    /// Build a new document from a generation plan
    Generate {
        /// Generation plan (JSON)
        #[clap(long, value_name = "FILE")]
        plan: PathBuf,
    },
}

fn parse_crs(text: &str) -> Result<Crs, String> {
    Crs::parse(text).map_err(|e| e.to_string())
}

impl Settings {
    pub fn from_cli() -> Self {
        Settings::parse()
    }

    /// Destination of the edited document
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output.as_ref().or(self.document.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_options_after_subcommand() {
        let settings = Settings::parse_from([
            "zone-config-editor",
            "locate",
            "--lat",
            "45.5",
            "--lon",
            "-73.6",
            "--document",
            "config.json",
            "--boundary-crs",
            "EPSG:3347",
        ]);
        assert_eq!(settings.command, Command::Locate { lat: 45.5, lon: -73.6 });
        assert_eq!(settings.boundary_crs, Some(Crs::StatCanLambert));
        assert_eq!(settings.output_path(), Some(&PathBuf::from("config.json")));
    }

    #[test]
    fn test_edit_code_lists() {
        let settings = Settings::parse_from([
            "zone-config-editor",
            "edit",
            "--lat",
            "45.5",
            "--lon",
            "-73.6",
            "--add",
            "H9S,H9T",
            "--remove",
            "H9W",
            "--output",
            "out.json",
        ]);
        let Command::Edit { add, remove, route_name, .. } = settings.command.clone() else {
            panic!("expected edit");
        };
        assert_eq!(add, vec!["H9S", "H9T"]);
        assert_eq!(remove, vec!["H9W"]);
        assert_eq!(route_name, None);
        assert_eq!(settings.output_path(), Some(&PathBuf::from("out.json")));
    }

    #[test]
    fn test_remap_defaults() {
        let settings =
            Settings::parse_from(["zone-config-editor", "remap", "--min", "2000", "--max", "2999"]);
        assert_eq!(
            settings.command,
            Command::Remap {
                min: 2000,
                max: 2999,
                keep_references: false,
                log_dir: PathBuf::from("logs"),
            }
        );
    }

    #[test]
    fn test_rejects_unknown_crs() {
        assert!(
            Settings::try_parse_from(["zone-config-editor", "fsas", "--boundary-crs", "EPSG:2154"])
                .is_err()
        );
    }
}
