mod bridge;
mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::ValueEnum;

use osdpush_core::error::Error;
use osdpush_core::tracing_ext::init_tracing;
use osdpush_core::*;

#[derive(Parser)]
#[command(author, version, about)]
struct Opt {
    /// Path to a configuration file in a YAML format.
    ///
    /// The OSDPUSH_CONFIG environment variable is used if this option is not
    /// specified.  Built-in defaults are used if neither is specified.
    #[arg(short, long, env = "OSDPUSH_CONFIG")]
    config: Option<PathBuf>,

    /// Logging format.
    #[arg(long, value_enum, env = "OSDPUSH_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let opt = Opt::parse();

    init_tracing(match opt.log_format {
        LogFormat::Text => "text",
        LogFormat::Json => "json",
    });

    let config = match opt.config {
        Some(ref path) => config::load(path),
        None => {
            tracing::info!("No config file, use defaults");
            Arc::new(config::Config::default())
        }
    };

    serve::main(config).await
}
