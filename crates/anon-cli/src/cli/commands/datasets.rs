use super::load_config;
use crate::cli::args::{DatasetsArgs, OutputFormat};
use crate::exit_codes::{CHECK_FAILED, SUCCESS};
use crate::host::{OfflineHost, PgConfigHost, ProbeSink};
use anon_core::routine::core_routines;
use anon_core::{
    ExecutionContextSelector, HostEngine, InvocationPath, ReferenceDatasetLoader, RoutineRegistry,
};
use std::sync::Arc;

pub fn run(args: DatasetsArgs) -> anyhow::Result<i32> {
    let cfg = load_config(&args.config)?;

    let host: Arc<dyn HostEngine> = match (&args.share_dir, &args.pg_config) {
        (Some(dir), _) => Arc::new(OfflineHost::with_share_dir(dir)),
        (None, Some(pg_config)) => Arc::new(PgConfigHost::new(pg_config)),
        (None, None) => anyhow::bail!("either --share-dir or --pg-config is required"),
    };

    let loader = ReferenceDatasetLoader::new(
        host,
        Arc::new(ProbeSink),
        cfg.schema.clone(),
        cfg.data_subdir.clone(),
    );
    let mut registry = RoutineRegistry::new();
    registry.install(core_routines(&cfg.schema))?;
    let descriptor = registry.authorize(loader.routine(), InvocationPath::Direct, None)?;
    let cap = ExecutionContextSelector::new(cfg.owner_role.clone()).elevate(descriptor)?;
    let report = loader.load_all(&cap);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            for outcome in &report.outcomes {
                let path = outcome
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                match &outcome.error {
                    None => println!("ok       {:<24} {path}", outcome.target),
                    Some(err) => println!("MISSING  {:<24} {path}: {err}", outcome.target),
                }
            }
            println!(
                "{}/{} datasets readable; bootstrap would {} under the '{}' policy",
                report.loaded_count(),
                report.outcomes.len(),
                if report.succeeded(cfg.aggregation) {
                    "succeed"
                } else {
                    "fail"
                },
                cfg.aggregation.as_str()
            );
        }
    }

    if report.all_succeeded() {
        Ok(SUCCESS)
    } else {
        Ok(CHECK_FAILED)
    }
}
