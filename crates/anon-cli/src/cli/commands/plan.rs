use super::load_config;
use crate::cli::args::{OutputFormat, PlanArgs};
use crate::exit_codes::SUCCESS;
use crate::host::{OfflineHost, PgConfigHost, ProbeSink};
use anon_core::{EngineVersion, Extension, HostEngine, StateStore};
use anyhow::Context;
use std::sync::Arc;

/// Dry-run an install against an in-memory state store and print what the
/// engine would receive.
pub fn run(args: PlanArgs) -> anyhow::Result<i32> {
    let cfg = load_config(&args.config)?;

    let version = match (&args.server_version_num, &args.pg_config) {
        (Some(num), _) => EngineVersion::parse_num(num)
            .with_context(|| format!("invalid --server-version-num {num:?}"))?,
        (None, Some(pg_config)) => PgConfigHost::new(pg_config).version()?,
        (None, None) => anyhow::bail!("either --server-version-num or --pg-config is required"),
    };

    let host = Arc::new(OfflineHost::with_version(version));
    let mut ext = Extension::new(
        cfg.clone(),
        host.clone(),
        Arc::new(ProbeSink),
        StateStore::memory()?,
    );
    let report = ext.install()?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("-- engine version {version}");
            for stmt in host.statements() {
                println!("{stmt};");
            }
            for skipped in &report.grants.skipped {
                println!(
                    "-- skipped (requires {}): {}",
                    skipped.min_version,
                    skipped.effect.statement(&cfg.schema, &cfg.operator_role)
                );
            }
        }
    }
    Ok(SUCCESS)
}
