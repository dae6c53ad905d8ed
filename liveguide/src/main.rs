mod command;
mod run;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use liveguide_core::config;
use liveguide_core::tracing_ext::init_tracing;

#[derive(Parser)]
#[command(about, version)]
struct Opt {
    /// Path to a configuration file in a YAML format.
    ///
    /// The LIVEGUIDE_CONFIG environment variable is used if this option is not
    /// specified.
    #[arg(short, long, env = "LIVEGUIDE_CONFIG")]
    config: PathBuf,

    /// Logging format.
    #[arg(
        long,
        env = "LIVEGUIDE_LOG_FORMAT",
        value_parser = ["text", "json"],
        default_value = "text",
    )]
    log_format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    init_tracing(&opt.log_format);

    let config = config::load(&opt.config)
        .with_context(|| format!("Failed to load {}", opt.config.display()))?;

    run::main(config).await
}
