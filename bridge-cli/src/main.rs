mod command;
mod env;

use std::path::PathBuf;

use bridge_core::BridgeConfig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cling-bridge", about = "Move variables between a host environment and a C++ kernel")]
struct Args {
    /// Config file (default: ~/.cling-bridge/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Kernel the engine adapter starts, by language (C++17) or kernel name
    /// (xeus-cling-cpp17). Passed to the adapter as CLING_BRIDGE_KERNEL and
    /// CLING_BRIDGE_LANGUAGE.
    #[arg(long, global = true, default_value = "C++17")]
    kernel: String,

    /// Give up on a query after this many empty responses (default: retry forever)
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Working directory for the engine, also sent as a change-directory command
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the declarations a push would send, without an engine
    Encode {
        /// JSON file mapping names to values
        #[arg(long)]
        env: PathBuf,
        /// Names to encode (default: every name in the file)
        names: Vec<String>,
    },
    /// Declare host values in the engine
    Push {
        /// Engine adapter command line
        #[arg(long, env = "CLING_BRIDGE_ENGINE")]
        engine: String,
        #[arg(long)]
        env: PathBuf,
        names: Vec<String>,
    },
    /// Read engine variables and print them as JSON
    Pull {
        #[arg(long, env = "CLING_BRIDGE_ENGINE")]
        engine: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List configured kernels
    Kernels,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries statements and JSON only.
    {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::try_from_env("CLING_BRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_from(path)?,
        None => BridgeConfig::load()?,
    };
    if let Some(max) = args.max_attempts {
        config.retry.max_attempts = Some(max);
    }

    match args.command {
        Command::Encode { env, names } => command::encode(&env, &names),
        Command::Kernels => {
            command::kernels(&config);
            Ok(())
        }
        Command::Push { engine, env, names } => {
            let ctx = command::EngineContext {
                engine,
                kernel: args.kernel,
                cwd: args.cwd,
            };
            command::push(&ctx, config, &env, &names).await
        }
        Command::Pull { engine, names } => {
            let ctx = command::EngineContext {
                engine,
                kernel: args.kernel,
                cwd: args.cwd,
            };
            command::pull(&ctx, config, &names).await
        }
    }
}
