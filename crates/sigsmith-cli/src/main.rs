use std::collections::HashSet;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sigsmith_catalog::{parse_bundle_file, CatalogSource, Technique};
use sigsmith_convert::{Converter, Format};
use sigsmith_store::{SignatureFilter, Store, TechniqueFilter, TechniqueUpsert};

mod config;
mod export;

use config::Config;
use export::{export_signatures, DirSink};

#[derive(Parser)]
#[command(name = "sigsmith")]
#[command(about = "Convert MITRE ATT&CK techniques into YARA, Sigma, and KQL detection signatures")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the technique catalog and upsert it into the database
    Update {
        /// Ingest a local STIX bundle file instead of fetching the configured URL
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Re-download even if the cached bundle is still fresh
        #[arg(long)]
        refresh: bool,
    },

    /// List stored techniques (or tactic labels)
    List {
        /// Only techniques with this tactic
        #[arg(long)]
        tactic: Option<String>,

        /// Only techniques for this platform
        #[arg(long)]
        platform: Option<String>,

        /// List distinct tactic labels instead of techniques
        #[arg(long)]
        tactics: bool,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one technique and its stored signatures
    Show {
        /// Technique id (e.g. T1055)
        id: String,

        /// Only show the signature in this format
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Render signatures for stored techniques and commit them
    Convert {
        /// Convert a single technique by id
        #[arg(long)]
        technique: Option<String>,

        /// Convert every technique with this tactic
        #[arg(long)]
        tactic: Option<String>,

        /// Comma-separated formats (yara, sigma, kql) or "all"
        #[arg(short, long, default_value = "all")]
        formats: String,

        /// Re-render signatures that are already up to date
        #[arg(long)]
        force: bool,

        /// Sub-techniques with empty tactics/platforms inherit their parent's
        #[arg(long)]
        inherit_parent: bool,
    },

    /// Export stored signatures as rule files
    Export {
        /// Output directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only export this format
        #[arg(long)]
        format: Option<String>,

        /// Only export one technique's signatures
        #[arg(long)]
        technique: Option<String>,
    },

    /// Delete all stored signatures for a technique
    Purge {
        /// Technique id (e.g. T1055)
        id: String,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let store = match Store::open(&config.db_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Update { bundle, refresh } => cmd_update(&config, &store, bundle, refresh),
        Commands::List {
            tactic,
            platform,
            tactics,
            json,
        } => cmd_list(&store, tactic, platform, tactics, json),
        Commands::Show { id, format } => cmd_show(&store, &id, format),
        Commands::Convert {
            technique,
            tactic,
            formats,
            force,
            inherit_parent,
        } => cmd_convert(
            &config,
            &store,
            technique,
            tactic,
            &formats,
            force,
            inherit_parent,
        ),
        Commands::Export {
            output,
            format,
            technique,
        } => cmd_export(&config, &store, output, format, technique),
        Commands::Purge { id } => cmd_purge(&store, &id),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_update(config: &Config, store: &Store, bundle: Option<PathBuf>, refresh: bool) {
    let techniques = match bundle {
        Some(path) => match parse_bundle_file(&path) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("Error reading bundle {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => {
            let source = CatalogSource::new(
                config.bundle_url.clone(),
                config.cache_path.clone(),
                config.freshness(refresh),
            );
            match source.fetch() {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("Error fetching catalog: {e}");
                    process::exit(1);
                }
            }
        }
    };

    let mut inserted = 0usize;
    let mut updated = 0usize;
    let mut unchanged = 0usize;
    let mut errors = 0usize;
    for technique in &techniques {
        match store.upsert_technique(technique) {
            Ok(TechniqueUpsert::Inserted(_)) => inserted += 1,
            Ok(TechniqueUpsert::Updated(_)) => updated += 1,
            Ok(TechniqueUpsert::Unchanged(_)) => unchanged += 1,
            Err(e) => {
                // A failed upsert aborts only itself; the rest of the batch
                // proceeds and the error is reported with its key.
                eprintln!("Error: {e}");
                errors += 1;
            }
        }
    }

    println!(
        "Ingested {} techniques ({inserted} new, {updated} updated, {unchanged} unchanged)",
        techniques.len() - errors
    );
    match store.stale_signatures() {
        Ok(stale) if !stale.is_empty() => {
            println!(
                "{} stored signatures are now stale; run `sigsmith convert`",
                stale.len()
            );
        }
        Ok(_) => {}
        Err(e) => eprintln!("Error: {e}"),
    }
    if errors > 0 {
        eprintln!("{errors} upserts failed");
        process::exit(1);
    }
}

fn cmd_list(
    store: &Store,
    tactic: Option<String>,
    platform: Option<String>,
    tactics: bool,
    json: bool,
) {
    if tactics {
        match store.list_tactics() {
            Ok(labels) => {
                for label in &labels {
                    println!("{label}");
                }
                eprintln!("Total tactics: {}", labels.len());
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let filter = match (tactic, platform) {
        (Some(t), _) => TechniqueFilter::Tactic(t),
        (None, Some(p)) => TechniqueFilter::Platform(p),
        (None, None) => TechniqueFilter::All,
    };
    let techniques = match store.list_techniques(&filter) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if json {
        print_json(&techniques);
    } else {
        for t in &techniques {
            println!("{:<12} {:<55} [{}]", t.id, t.name, t.tactics.join(", "));
        }
        eprintln!("Total techniques: {}", techniques.len());
    }
}

fn cmd_show(store: &Store, id: &str, format: Option<String>) {
    let technique = match store.get_technique(id) {
        Ok(Some(t)) => t,
        Ok(None) => {
            eprintln!("Error: technique {id} not found");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    println!("{}: {} (revision {})", technique.id, technique.name, technique.revision);
    if !technique.tactics.is_empty() {
        println!("Tactics:   {}", technique.tactics.join(", "));
    }
    if !technique.platforms.is_empty() {
        println!("Platforms: {}", technique.platforms.join(", "));
    }
    if let Some(parent) = &technique.parent_id {
        println!("Parent:    {parent}");
    }
    match store.subtechniques_of(id) {
        Ok(subs) if !subs.is_empty() => {
            let ids: Vec<&str> = subs.iter().map(|s| s.id.as_str()).collect();
            println!("Subtechniques: {}", ids.join(", "));
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }

    let filter = match format.as_deref() {
        Some(f) => SignatureFilter::Format(parse_format(f)),
        None => SignatureFilter::Technique(id.to_string()),
    };
    let signatures = match store.list_signatures(&filter) {
        Ok(sigs) => sigs
            .into_iter()
            .filter(|s| s.technique_id == id)
            .collect::<Vec<_>>(),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if signatures.is_empty() {
        println!("\nNo stored signatures (run `sigsmith convert --technique {id}`)");
        return;
    }
    for signature in &signatures {
        let stale = if signature.is_stale(technique.revision) {
            " [stale]"
        } else {
            ""
        };
        println!(
            "\n--- {} ({}, from revision {}){stale}",
            signature.rule_name, signature.format, signature.generated_from_revision
        );
        println!("{}", signature.body);
    }
}

fn cmd_convert(
    config: &Config,
    store: &Store,
    technique: Option<String>,
    tactic: Option<String>,
    formats: &str,
    force: bool,
    inherit_parent: bool,
) {
    let formats = parse_formats(formats);
    let techniques: Vec<Technique> = match (technique, tactic) {
        (Some(id), _) => match store.get_technique(&id) {
            Ok(Some(t)) => vec![t],
            Ok(None) => {
                eprintln!("Error: technique {id} not found");
                process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        (None, Some(t)) => match store.list_techniques(&TechniqueFilter::Tactic(t.clone())) {
            Ok(ts) if ts.is_empty() => {
                eprintln!("Error: no techniques found for tactic '{t}'");
                process::exit(1);
            }
            Ok(ts) => ts,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        (None, None) => match store.list_techniques(&TechniqueFilter::All) {
            Ok(ts) => ts,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
    };

    let inherit = inherit_parent || config.inherit_parent;
    let parent_pool = if inherit {
        resolve_parents(store, &techniques)
    } else {
        Vec::new()
    };

    let existing = match store.existing_revisions() {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let report = Converter::new(formats)
        .force(force)
        .inherit_parent(inherit)
        .convert(&techniques, &parent_pool, &existing);

    let mut commit_errors = 0usize;
    for signature in &report.signatures {
        if let Err(e) = store.upsert_signature(signature) {
            eprintln!("Error: {e}");
            commit_errors += 1;
        }
    }

    println!(
        "Rendered {} signatures, {} skipped up to date, {} failed",
        report.rendered_count() - commit_errors,
        report.skipped_count(),
        report.failed_count()
    );
    if !report.failures.is_empty() {
        println!("Failures:");
        for failure in &report.failures {
            println!(
                "  - {} {}: {}",
                failure.technique_id, failure.format, failure.error
            );
        }
    }
    if commit_errors > 0 {
        eprintln!("{commit_errors} signature upserts failed");
        process::exit(1);
    }
}

fn cmd_export(
    config: &Config,
    store: &Store,
    output: Option<PathBuf>,
    format: Option<String>,
    technique: Option<String>,
) {
    let filter = match (&technique, &format) {
        (Some(id), _) => SignatureFilter::Technique(id.clone()),
        (None, Some(f)) => SignatureFilter::Format(parse_format(f)),
        (None, None) => SignatureFilter::All,
    };
    let mut signatures = match store.list_signatures(&filter) {
        Ok(sigs) => sigs,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    // A technique filter may still need narrowing by format.
    if let (Some(_), Some(f)) = (&technique, &format) {
        let wanted = parse_format(f);
        signatures.retain(|s| s.format == wanted);
    }

    let dir = output.unwrap_or_else(|| config.output_dir.clone());
    let mut sink = match DirSink::new(&dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error creating {}: {e}", dir.display());
            process::exit(1);
        }
    };

    let (written, failures) = export_signatures(&mut sink, &signatures);
    println!("Exported {written} rule files to {}", sink.dir().display());
    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("Error: {failure}");
        }
        eprintln!("{} exports failed", failures.len());
        process::exit(1);
    }
}

fn cmd_purge(store: &Store, id: &str) {
    match store.purge_signatures(id) {
        Ok(count) => println!("Removed {count} signatures for {id}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a comma-separated format list; `all` selects every dialect.
fn parse_formats(arg: &str) -> Vec<Format> {
    if arg.eq_ignore_ascii_case("all") {
        return Format::ALL.to_vec();
    }
    let mut formats = Vec::new();
    for part in arg.split(',') {
        formats.push(parse_format(part.trim()));
    }
    formats
}

fn parse_format(arg: &str) -> Format {
    match Format::from_str(arg) {
        Some(f) => f,
        None => {
            eprintln!("Error: unknown format '{arg}' (expected yara, sigma, or kql)");
            process::exit(1);
        }
    }
}

/// Fetch parents needed for inheritance that are not already part of the
/// selection. Dangling parent ids are tolerated (partial catalog loads).
fn resolve_parents(store: &Store, techniques: &[Technique]) -> Vec<Technique> {
    let selected: HashSet<&str> = techniques.iter().map(|t| t.id.as_str()).collect();
    let mut parents = Vec::new();
    let mut fetched: HashSet<String> = HashSet::new();
    for technique in techniques {
        let Some(parent_id) = technique.parent_id.as_deref() else {
            continue;
        };
        if selected.contains(parent_id) || fetched.contains(parent_id) {
            continue;
        }
        match store.get_technique(parent_id) {
            Ok(Some(parent)) => {
                fetched.insert(parent.id.clone());
                parents.push(parent);
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
    parents
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("JSON serialization error: {e}");
            process::exit(1);
        }
    }
}
