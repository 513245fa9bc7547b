//! modform-orbits CLI: report the cached invariants of a space or one orbit.
//!
//! Usage:
//!   --oracle-data=<file>   Oracle tables (default: data/sample_oracle.json)
//!   --label=<label>        Space `N.k.c` or orbit `N.k.c.x` (default: 11.2.0)
//!   --config=<file>        CacheConfig JSON; missing fields keep defaults
//!   --store-dir=<path>     Snapshot directory; spaces are restored from and saved to it
//!   --json                 Print the report as JSON

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use modform_orbits::cm::CmInfo;
use modform_orbits::config::CacheConfig;
use modform_orbits::error::{CacheError, OracleError};
use modform_orbits::labels::{FormLabel, SpaceKey};
use modform_orbits::lazy::LazyField;
use modform_orbits::orbit::{FieldInfo, FieldValue, LazyFieldKind, OrbitRecord};
use modform_orbits::persistence::{JsonDirStore, NoStore, Persistence};
use modform_orbits::registry::SpaceRegistry;
use modform_orbits::space::{OldspaceComponent, SpaceRecord};
use modform_orbits::table_oracle::TableOracle;
use modform_orbits::twist::TwistInfo;

struct CliConfig {
    oracle_data: String,
    label: String,
    config_file: Option<String>,
    store_dir: Option<String>,
    json: bool,
}

fn parse_args() -> CliConfig {
    let args: Vec<String> = std::env::args().collect();

    let value = |flag: &str| -> Option<String> {
        args.iter()
            .find_map(|a| a.strip_prefix(flag))
            .map(|v| v.to_string())
    };

    CliConfig {
        oracle_data: value("--oracle-data=").unwrap_or_else(|| "data/sample_oracle.json".to_string()),
        label: value("--label=").unwrap_or_else(|| "11.2.0".to_string()),
        config_file: value("--config="),
        store_dir: value("--store-dir="),
        json: args.iter().any(|a| a == "--json"),
    }
}

#[derive(Serialize)]
struct OrbitReport {
    label: String,
    dimension: u64,
    field: FieldInfo,
    fields: Vec<(&'static str, LazyField<FieldValue>)>,
}

#[derive(Serialize)]
struct SpaceReport {
    key: String,
    character: String,
    total_dimension: u64,
    new_dimension: u64,
    oldspace: Vec<OldspaceComponent>,
    orbits: Vec<OrbitReport>,
}

fn orbit_report(f: &OrbitRecord) -> OrbitReport {
    OrbitReport {
        label: f.full_label().to_string(),
        dimension: f.dimension(),
        field: f.field_info(),
        fields: LazyFieldKind::ALL
            .iter()
            .map(|&kind| (kind.name(), f.get(kind)))
            .collect(),
    }
}

fn space_report(space: &SpaceRecord, only: Option<&str>) -> SpaceReport {
    SpaceReport {
        key: space.key().to_string(),
        character: space.character().label(),
        total_dimension: space.total_dimension(),
        new_dimension: space.new_dimension(),
        oldspace: space.oldspace().to_vec(),
        orbits: space
            .orbits()
            .iter()
            .filter(|f| only.map_or(true, |l| f.label() == l))
            .map(|f| orbit_report(f))
            .collect(),
    }
}

fn summarize(value: &LazyField<FieldValue>) -> String {
    match value {
        LazyField::Unset | LazyField::Failed(_) => "not computed".to_string(),
        LazyField::Computed(FieldValue::AtkinLehner(signs)) => {
            if signs.is_empty() {
                "-".to_string()
            } else {
                signs
                    .iter()
                    .map(|(q, s)| format!("W_{}={:+}", q, s))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
        LazyField::Computed(FieldValue::Twist(info)) => match info {
            TwistInfo::Minimal => "minimal".to_string(),
            TwistInfo::TwistOf { candidates, ambiguous } => {
                let first = &candidates[0];
                let mut s = format!("twist of {} by {}", first.source_label, first.twisting_character);
                if candidates.len() > 1 {
                    s.push_str(&format!(" (+{} more)", candidates.len() - 1));
                }
                if !ambiguous.is_empty() {
                    s.push_str(&format!(", {} comparisons failed", ambiguous.len()));
                }
                s
            }
            TwistInfo::Inconclusive { ambiguous } => {
                format!("inconclusive ({} comparisons failed)", ambiguous.len())
            }
        },
        LazyField::Computed(FieldValue::Cm(info)) => match info {
            CmInfo::NoCm => "no".to_string(),
            CmInfo::Cm { discriminant, .. } => format!("yes, D = {}", discriminant),
        },
        LazyField::Computed(FieldValue::Satake(params)) => format!("{} primes", params.len()),
        LazyField::Computed(FieldValue::CmPoints(points)) => points
            .iter()
            .map(|p| p.discriminant.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        LazyField::Computed(FieldValue::Embeddings(rows)) => format!("{} embeddings", rows.len()),
    }
}

fn print_table(report: &SpaceReport) {
    println!("Space {} (character {})", report.key, report.character);
    println!(
        "  dim {} = new {} + old {}",
        report.total_dimension,
        report.new_dimension,
        report.total_dimension - report.new_dimension
    );
    for c in &report.oldspace {
        println!(
            "    {} x S_new({}, chi_{}.{}) of dim {}",
            c.multiplicity, c.source_level, c.source_level, c.source_character_index, c.new_dimension
        );
    }
    println!();
    for orbit in &report.orbits {
        println!(
            "{}  dim {}  field {} (degree {}, relative {})",
            orbit.label,
            orbit.dimension,
            orbit.field.field_label,
            orbit.field.absolute_degree,
            orbit.field.relative_degree
        );
        for (name, value) in &orbit.fields {
            println!("  {:<14} {}", name, summarize(value));
        }
        println!();
    }
}

fn main() {
    env_logger::init();

    let cli = parse_args();

    let config = match &cli.config_file {
        Some(path) => CacheConfig::from_json_file(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => CacheConfig::default(),
    };

    let oracle = match TableOracle::from_json_file(Path::new(&cli.oracle_data)) {
        Ok(oracle) => Arc::new(oracle),
        Err(e) => {
            eprintln!("Error loading oracle tables from {}: {}", cli.oracle_data, e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn Persistence> = match &cli.store_dir {
        Some(dir) => Arc::new(JsonDirStore::new(dir)),
        None => Arc::new(NoStore),
    };
    let registry = SpaceRegistry::new(oracle, store, config);

    let (key, only) = match cli.label.parse::<FormLabel>() {
        Ok(label) => (label.key, Some(label.orbit)),
        Err(_) => match cli.label.parse::<SpaceKey>() {
            Ok(key) => (key, None),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    };

    let space = match registry.space(key) {
        Ok(space) => space,
        Err(
            e @ (CacheError::DimensionConsistency { .. }
            | CacheError::Oracle(OracleError::SpaceConstruction { .. })),
        ) => {
            log::warn!("{}", e);
            println!("Space {}: this space could not be computed.", key);
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(label) = &only {
        if let Err(e) = space.orbit(label) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let report = space_report(&space, only.as_deref());
    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print_table(&report);
    }

    if cli.store_dir.is_some() {
        if let Err(e) = registry.persist(key) {
            eprintln!("Error saving snapshot: {}", e);
            std::process::exit(1);
        }
    }
}
