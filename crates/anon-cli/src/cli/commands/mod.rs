pub mod datasets;
pub mod plan;
pub mod state;

use super::args::{Cli, Command, ConfigArgs};
use crate::exit_codes::SUCCESS;
use anon_core::AnonConfig;
use anyhow::Context;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Plan(args) => plan::run(args),
        Command::Datasets(args) => datasets::run(args),
        Command::Status(args) => state::status(args),
        Command::Reset(args) => state::reset(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}

/// Config file (or defaults) with `ANON_*` overrides applied.
fn load_config(args: &ConfigArgs) -> anyhow::Result<AnonConfig> {
    let base = match &args.config {
        Some(path) => AnonConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnonConfig::default(),
    };
    base.with_env_overrides()
}
