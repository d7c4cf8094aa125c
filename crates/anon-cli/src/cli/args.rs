use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "anon",
    version,
    about = "Install planning, reference data checks and bootstrap state for the anonymization extension"
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the security labels and grants an install would issue
    Plan(PlanArgs),
    /// Resolve the dataset catalog and check every file is readable
    Datasets(DatasetsArgs),
    /// Show the persisted initialization flag
    Status(StateArgs),
    /// Clear the initialization flag (extension reinstall)
    Reset(StateArgs),
    Version,
}

#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Config file (YAML). Defaults apply when omitted.
    #[arg(long, env = "ANON_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Target engine version as server_version_num (e.g. 150004)
    #[arg(long, conflicts_with = "pg_config", required_unless_present = "pg_config")]
    pub server_version_num: Option<String>,

    /// Read the engine version from this pg_config binary
    #[arg(long)]
    pub pg_config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct DatasetsArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Engine share directory (as reported by `pg_config --sharedir`)
    #[arg(long, conflicts_with = "pg_config", required_unless_present = "pg_config")]
    pub share_dir: Option<PathBuf>,

    /// Ask this pg_config binary for the share directory
    #[arg(long)]
    pub pg_config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct StateArgs {
    /// State database file
    #[arg(long, env = "ANON_STATE")]
    pub state: PathBuf,
}
