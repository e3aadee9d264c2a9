//! Metagate CLI - offline inspection of a node's local metadata
//!
//! Works directly on the data paths of a stopped node. Only `upgrade`
//! writes; every other command leaves the data paths as they are.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metagate_common::{
    fingerprint, hex_encode, AutoImportPolicy, Config, GlobalRecord, IndexRecord,
};
use metagate_gateway::{scan_dangling, StartupLoader};
use metagate_storage::{
    find_legacy_files, read_state_file, upgrade_legacy_layout, NodeEnvironment, StateHeader,
    StateStores, VersionedStateStore,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "metagate-cli")]
#[command(about = "Metagate local metadata CLI")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/etc/metagate/metagate.toml")]
    config: PathBuf,

    /// Data path, overrides the configured ones (repeatable)
    #[arg(short, long = "data-path")]
    data_paths: Vec<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the metadata currently on disk (legacy files are reported, not upgraded)
    Inspect,
    /// List state files with their header and validity
    Files {
        /// Only this index (global state when omitted)
        #[arg(short, long)]
        index: Option<String>,
    },
    /// List local indices that are not part of the given metadata
    Dangling {
        /// Index names the cluster knows about (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        known: Vec<String>,

        /// Import policy to preview (no, yes, closed); defaults to the configured one
        #[arg(short, long)]
        policy: Option<AutoImportPolicy>,
    },
    /// Upgrade a legacy single-file metadata layout
    Upgrade {
        /// Only report what would be upgraded
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if !args.data_paths.is_empty() {
        config.node.data_paths = args.data_paths;
    }
    info!("using data paths {:?}", config.node.data_paths);

    let data_paths = config.node.data_paths.clone();
    let env = match args.command {
        Commands::Upgrade { dry_run: false } => NodeEnvironment::open(data_paths)?,
        _ => NodeEnvironment::existing(data_paths),
    };
    let env = Arc::new(env);
    let stores = Arc::new(StateStores::new(config.gateway.format));

    match args.command {
        Commands::Inspect => inspect(&config, env, stores),
        Commands::Files { index } => files(&env, &stores, index.as_deref()),
        Commands::Dangling { known, policy } => dangling(
            &env,
            &stores,
            known,
            policy.unwrap_or(config.gateway.auto_import_dangled),
        ),
        Commands::Upgrade { dry_run } => upgrade(&env, &stores, dry_run),
    }
}

fn inspect(config: &Config, env: Arc<NodeEnvironment>, stores: Arc<StateStores>) -> Result<()> {
    let legacy = find_legacy_files(&env);
    if !legacy.is_empty() {
        warn!(
            "{} legacy metadata file(s) not upgraded, run `upgrade` to convert them",
            legacy.len()
        );
    }

    let loaded = StartupLoader::new(env, stores, config.gateway.startup_read_attempts)
        .without_legacy_upgrade()
        .load()
        .context("failed to load local metadata")?;
    let metadata = &loaded.metadata;

    let indices: Vec<_> = metadata
        .indices
        .values()
        .map(|index| {
            json!({
                "name": index.name,
                "uuid": index.uuid.to_string(),
                "version": index.version,
                "state": index.state.to_string(),
                "aliases": index.aliases,
            })
        })
        .collect();

    let output = json!({
        "global_found": loaded.global_found,
        "legacy_files": legacy
            .iter()
            .map(|file| file.path.display().to_string())
            .collect::<Vec<_>>(),
        "version": metadata.version,
        "cluster_uuid": metadata.cluster_uuid,
        "settings": metadata.settings,
        "templates": metadata.templates.keys().collect::<Vec<_>>(),
        "indices": indices,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn files(env: &NodeEnvironment, stores: &StateStores, index: Option<&str>) -> Result<()> {
    let rows = match index {
        Some(name) => describe_files::<IndexRecord>(&stores.index, &env.find_local_index_locations(name)),
        None => describe_files::<GlobalRecord>(&stores.global, &env.node_state_locations()),
    };
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn describe_files<T: DeserializeOwned>(
    store: &VersionedStateStore,
    locations: &[PathBuf],
) -> Vec<serde_json::Value> {
    store
        .scan(locations)
        .into_iter()
        .map(|file| {
            let raw = std::fs::read(&file.path).unwrap_or_default();
            let header = StateHeader::from_bytes(&raw);
            let status = match read_state_file::<T>(&file.path, file.version) {
                Ok(_) => "ok".to_string(),
                Err(e) => e.to_string(),
            };
            json!({
                "path": file.path.display().to_string(),
                "version": file.version,
                "bytes": raw.len(),
                "fingerprint": format!("{:016x}", fingerprint(&raw)),
                "crc32c": header.map(|h| hex_encode(&h.checksum.to_be_bytes())),
                "codec": header.map(|h| h.codec),
                "status": status,
            })
        })
        .collect()
}

fn dangling(
    env: &NodeEnvironment,
    stores: &StateStores,
    known: Vec<String>,
    policy: AutoImportPolicy,
) -> Result<()> {
    let known: BTreeSet<String> = known.into_iter().collect();
    let candidates = scan_dangling(env, stores, |index| known.contains(index))?;

    let rows: Vec<_> = candidates
        .iter()
        .map(|candidate| {
            let import = policy.should_import().then(|| {
                let record = candidate.import_record(policy);
                json!({ "name": record.name, "state": record.state.to_string() })
            });
            json!({
                "index": candidate.index,
                "stored_name": candidate.record.name,
                "uuid": candidate.record.uuid.to_string(),
                "version": candidate.record.version,
                "state": candidate.record.state.to_string(),
                "policy": policy.to_string(),
                "import": import,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn upgrade(env: &NodeEnvironment, stores: &StateStores, dry_run: bool) -> Result<()> {
    if dry_run {
        let files = find_legacy_files(env);
        if files.is_empty() {
            println!("no legacy metadata found");
        }
        for file in files {
            println!("{}\tversion {}", file.path.display(), file.version);
        }
        return Ok(());
    }

    match upgrade_legacy_layout(env, stores).context("legacy upgrade failed")? {
        Some(upgrade) => {
            println!(
                "upgraded {} (version {}, {} index(es))",
                upgrade.source.display(),
                upgrade.metadata.version,
                upgrade.metadata.indices.len()
            );
            for backup in upgrade.backups {
                println!("  moved aside: {}", backup.display());
            }
        }
        None => println!("no legacy metadata found"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_policy_parsed() {
        let args =
            Args::try_parse_from(["metagate-cli", "dangling", "--known", "a,b", "--policy", "closed"])
                .unwrap();
        match args.command {
            Commands::Dangling { known, policy } => {
                assert_eq!(known, vec!["a", "b"]);
                assert_eq!(policy, Some(AutoImportPolicy::Closed));
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Args::try_parse_from(["metagate-cli", "dangling", "--policy", "true"]).is_err());
    }

    #[test]
    fn test_policy_defaults_to_config() {
        let args = Args::try_parse_from(["metagate-cli", "dangling"]).unwrap();
        assert!(matches!(args.command, Commands::Dangling { policy: None, .. }));
    }
}
