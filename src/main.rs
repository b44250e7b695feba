mod cli;

use anyhow::Result;
use clap::Parser;

use af_core::config::Config;
use cli::{Cli, Commands};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    // Load config, then layer env vars and CLI flags on top.
    let mut config = Config::load_or_default(config_path);
    config.apply_env();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting audioforge server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    af_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "audioforge=trace,af_server=trace,af_av=trace,af_core=debug,tower_http=debug"
                .to_string()
        } else {
            "audioforge=debug,af_server=debug,af_av=debug,af_core=info,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("audioforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    config.apply_env();

    println!("Checking external tools...\n");
    match af_av::resolve_ffmpeg(&config.tools) {
        Ok(path) => {
            print!("✓ ffmpeg - {}", path.display());
            if let Some(version) = af_av::ffmpeg_version(&path) {
                print!(" ({version})");
            }
            println!();
            println!("\nAll required tools are available!");
            Ok(())
        }
        Err(e) => {
            println!("✗ ffmpeg");
            println!("\n{e}");
            anyhow::bail!("ffmpeg is required; install it or set tools.ffmpeg_path")
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Max upload: {} MiB",
        config.limits.max_upload_bytes / (1024 * 1024)
    );
    println!(
        "  Event loop delay ceiling: {} ms",
        config.limits.max_event_loop_delay_ms
    );
    println!(
        "  RSS ceiling: {} MiB",
        config.limits.max_rss_bytes / (1024 * 1024)
    );
    println!("  Transcoder threads: {}", config.transcode.threads);

    for warning in config.validate() {
        println!("  Warning: {warning}");
    }

    Ok(())
}
