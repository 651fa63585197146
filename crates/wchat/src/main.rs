use clap::{Parser, Subcommand};

mod commands;
mod config;
mod output;
mod relay_gateway;
mod wallet;

use output::Output;

#[derive(Parser)]
#[command(name = "wchat")]
#[command(version)]
#[command(about = "Wallet-identity chat over relays")]
#[command(
    long_about = "Chat with a fixed peer from a wallet identity.\n\nThe wallet key derives a cached messaging key; conversation history and live sync run over relays."
)]
struct Cli {
    /// Output in JSON format (for agents/scripts)
    #[arg(short, long, global = true)]
    json: bool,

    /// Data directory (default: platform data dir/wchat)
    #[arg(long, global = true, env = "WCHAT_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with a wallet key (hex), or generate a new one
    Login {
        /// Wallet key (hex); omit to generate
        key: Option<String>,
    },

    /// Logout and clear cached keys
    Logout,

    /// Show current identity
    Whoami,

    /// Set or show the fixed peer address
    Peer {
        /// Peer wallet address (0x-hex)
        address: Option<String>,
    },

    /// Set or show the network environment
    Env {
        /// local, dev or production
        environment: Option<String>,
    },

    /// Connect to the network and load conversation history
    Connect,

    /// Send a message to the fixed peer
    Send {
        /// Message content
        message: String,
    },

    /// Listen for new messages
    Listen {
        /// Stop after this many seconds (default: run until interrupted)
        #[arg(long)]
        duration: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new(cli.json);

    if let Err(e) = run(cli, &output) {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(cli: Cli, output: &Output) -> anyhow::Result<()> {
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .expect("Could not find data directory")
            .join("wchat")
    });
    std::fs::create_dir_all(&data_dir)?;

    let mut config = config::Config::load(&data_dir)?;

    match cli.command {
        Commands::Login { key } => commands::identity::login(key.as_deref(), &config, output),
        Commands::Logout => commands::identity::logout(&data_dir, output),
        Commands::Whoami => commands::identity::whoami(&config, output),
        Commands::Peer { address } => {
            if let Some(address) = address {
                config.set_peer(&address)?;
            }
            output.success("peer", serde_json::json!({ "peer": config.peer }));
            Ok(())
        }
        Commands::Env { environment } => {
            if let Some(environment) = environment {
                config.set_environment(environment.parse()?)?;
            }
            output.success(
                "env",
                serde_json::json!({ "environment": config.environment.to_string() }),
            );
            Ok(())
        }
        Commands::Connect => commands::chat::connect(&config, &data_dir, output),
        Commands::Send { message } => commands::chat::send(&message, &config, &data_dir, output),
        Commands::Listen { duration } => {
            commands::chat::listen(duration, &config, &data_dir, output)
        }
    }
}
