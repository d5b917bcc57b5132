use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quam::config::{QuamConfig, SerialiserConfig};
use quam::resolve;
use quam::serialise::{self, InstantiateOptions};
use quam::storage::{ContentMapping, JsonSerialiser};
use quam::{ClassRegistry, FieldType, Quam, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const FALLBACK_ROOT_CLASS: &str = "quam.QuamRoot";

#[derive(Parser)]
#[command(name = "quam")]
struct Cli {
    /// JSON config file (`{"quam": {"version": 3, ...}}`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State file or folder; falls back to the configured state path.
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the state as an indented tree.
    Show,
    /// Resolve a reference against the state and print the value.
    Resolve {
        reference: String,
        /// Reference to the node the lookup starts from (defaults to the root).
        #[arg(long)]
        from: Option<String>,
    },
    /// Re-save the state split into several files.
    Split {
        dest: PathBuf,
        /// `file.json=key1,key2`, repeatable.
        #[arg(long = "map")]
        mappings: Vec<String>,
        #[arg(long)]
        ignore: Vec<String>,
    },
    /// Merge a state folder into a single file.
    Merge { dest: PathBuf },
    /// SHA-256 of the merged state document.
    Digest,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_mapping(entries: &[String]) -> Result<ContentMapping> {
    let mut mapping = ContentMapping::new();
    for entry in entries {
        let (file, keys) = entry
            .split_once('=')
            .with_context(|| format!("Invalid mapping '{}', expected file.json=key1,key2", entry))?;
        mapping
            .entry(file.to_string())
            .or_default()
            .extend(keys.split(',').filter(|k| !k.is_empty()).map(str::to_string));
    }
    Ok(mapping)
}

fn load_graph(serialiser: &JsonSerialiser, path: Option<&Path>) -> Result<Quam> {
    serialiser.load_quam(
        path,
        Arc::new(ClassRegistry::lenient()),
        Some(FALLBACK_ROOT_CLASS),
        &InstantiateOptions::lenient(),
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => SerialiserConfig::from_quam_config(&QuamConfig::load(path)?),
        None => SerialiserConfig::default(),
    }
    .with_env();
    let serialiser = JsonSerialiser::new(config);
    let state = cli.state.as_deref();

    match cli.command {
        Commands::Show => {
            let quam = load_graph(&serialiser, state)?;
            let root = quam.root().context("state has no root")?;
            print!("{}", quam.summary(root)?);
        }
        Commands::Resolve { reference, from } => {
            let quam = load_graph(&serialiser, state)?;
            let root = quam.root().context("state has no root")?;
            let origin = match from {
                Some(origin_ref) => resolve::resolve(&quam, root, &origin_ref, Some(root))?
                    .as_node()
                    .with_context(|| format!("{} does not point to a node", origin_ref))?,
                None => root,
            };
            let value = resolve::resolve_reference(&quam, origin, &reference)?;
            let json = match &value {
                Value::Node(id) => serialise::to_dict(&quam, *id, true)?,
                other => serialise::value_to_json(&quam, other, &FieldType::Any, true)?,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::Split {
            dest,
            mappings,
            ignore,
        } => {
            let quam = load_graph(&serialiser, state)?;
            let mapping = parse_mapping(&mappings)?;
            let ignore: Vec<&str> = ignore.iter().map(String::as_str).collect();
            let report = serialiser.save(&quam, Some(dest.as_path()), Some(&mapping), &ignore)?;
            for file in &report.files {
                println!("Wrote {}", file.display());
            }
            for warning in &report.warnings {
                println!("Warning: {:?}", warning);
            }
        }
        Commands::Merge { dest } => {
            let state = serialiser.load(state)?;
            for collision in &state.collisions {
                println!(
                    "Key '{}' in {} overrides {}",
                    collision.key,
                    collision.winner.display(),
                    collision.previous.display()
                );
            }
            let report = serialiser.save_contents(state.contents, Some(dest.as_path()), Some(&ContentMapping::new()))?;
            for file in &report.files {
                println!("Wrote {}", file.display());
            }
        }
        Commands::Digest => {
            let state = serialiser.load(state)?;
            println!("{}", serialise::fingerprint_hex(&state.into_document()));
        }
    }

    Ok(())
}
