//! Binary entrypoint for the upbproxy CLI.
//!
//! Commands:
//! - `start [--pim <host>] [--pim-port <n>] [--listen-port <n>]` - run the decoding relay
//! - `init` - create a starter `config.toml`
//! - `decode --side pim|client <file>` - decode a captured byte stream offline
//! - `set-password` - interactively store the PIM password used to verify logins
//!
//! See the library crate docs for module-level details: `upbproxy::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use upbproxy::config::Config;
use upbproxy::display::EventPrinter;
use upbproxy::metrics;
use upbproxy::proxy::ProxyServer;
use upbproxy::upb::{decoder_for, SharedHandshake, Side, SideEvent, StreamDecoder};

#[derive(Parser)]
#[command(name = "upbproxy")]
#[command(about = "Transparent TCP proxy that decodes UPB PIM traffic")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Pim,
    Client,
}

impl From<SideArg> for Side {
    fn from(s: SideArg) -> Self {
        match s {
            SideArg::Pim => Side::Pim,
            SideArg::Client => Side::Client,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy
    Start {
        /// PIM host name or address
        #[arg(long)]
        pim: Option<String>,

        /// PIM TCP port
        #[arg(long)]
        pim_port: Option<u16>,

        /// Port to accept the client on
        #[arg(long)]
        listen_port: Option<u16>,
    },
    /// Write a default configuration file
    Init,
    /// Decode a captured byte stream from one side of a session
    Decode {
        /// Which endpoint produced the capture
        #[arg(long, value_enum)]
        side: SideArg,

        /// Capture starts after the handshake
        #[arg(long)]
        no_handshake: bool,

        /// Raw capture file
        file: String,
    },
    /// Set or update the PIM password in the config file
    SetPassword,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start {
            pim,
            pim_port,
            listen_port,
        } => {
            let mut config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            // CLI overrides config
            if let Some(host) = pim {
                config.proxy.pim_host = host;
            }
            if let Some(port) = pim_port {
                config.proxy.pim_port = port;
            }
            if let Some(port) = listen_port {
                config.proxy.listen_port = port;
            }
            config.validate()?;
            info!("Starting upbproxy v{}", env!("CARGO_PKG_VERSION"));
            ProxyServer::new(config).run().await?;
        }
        Commands::Init => {
            if tokio::fs::metadata(&cli.config).await.is_ok() {
                warn!("{} already exists; not overwriting", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Decode {
            side,
            no_handshake,
            file,
        } => {
            let config = pre_config.unwrap_or_default();
            let bytes = tokio::fs::read(&file)
                .await
                .map_err(|e| anyhow!("Failed to read capture {}: {}", file, e))?;
            let side = Side::from(side);
            let mut decoder = decoder_for(side, SharedHandshake::new(config.credentials()));
            if no_handshake {
                decoder.skip_handshake();
            }
            let printer = EventPrinter::new(&config.display);
            for event in decoder.feed(&bytes) {
                metrics::observe(&event);
                printer.emit(&SideEvent { side, event });
            }
            info!("Decoded {} bytes; {}", bytes.len(), metrics::snapshot());
        }
        Commands::SetPassword => {
            let mut config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            println!("Setting PIM password for '{}'.", config.auth.username);
            // Prompt twice without echo
            let pass1 = rpassword::prompt_password("PIM password: ")?;
            if pass1.is_empty() {
                println!("Error: password must not be empty.");
                return Ok(());
            }
            let pass2 = rpassword::prompt_password("Confirm password: ")?;
            if pass1 != pass2 {
                println!("Error: passwords do not match.");
                return Ok(());
            }
            config.auth.password = Some(pass1);
            config.save(&cli.config).await?;
            println!("PIM password updated successfully.");
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from config, raised by CLI verbosity
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => configured.max(log::LevelFilter::Debug),
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Console output only when attached to a terminal; the file always gets the line.
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
