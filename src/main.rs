mod cli;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tf_core::config::Config;
use tf_pipeline::Classifier;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "thumbforge=trace,tf_core=debug,tf_channel=debug,tf_blob=debug,tf_transform=debug,tf_pipeline=trace,tf_server=debug,tower_http=info".to_string()
        } else {
            "thumbforge=info,tf_pipeline=info,tf_server=info,tf_transform=info,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Classify { file_names } => classify(&file_names, cli.config.as_deref()),
        Commands::CheckTools => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("thumbforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting thumbforge");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    tf_server::start(config).await?;
    Ok(())
}

fn classify(file_names: &[String], config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let classifier = Classifier::from_config(&config.routing)?;

    for name in file_names {
        let c = classifier.classify(name);
        let branches = if c.branches.is_empty() {
            "-".to_string()
        } else {
            c.branches.to_string()
        };
        println!("{name}\t{}\t{branches}", c.route);
    }

    Ok(())
}

async fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    println!("Checking external tools...\n");

    let tool = tf_transform::tools::check("ffmpeg", config.transform.ffmpeg_path.as_deref()).await;
    let status = if tool.available { "✓" } else { "✗" };
    print!("{status} {}", tool.name);
    if let Some(ref version) = tool.version {
        print!(" ({version})");
    }
    if let Some(ref path) = tool.path {
        print!(" - {}", path.display());
    }
    println!("\n");

    if tool.available {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing. Install it or set transform.engine to \"passthrough\".");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let config = Config::load(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Partitions: {}", config.channels.partitions);
    println!("  Engine: {}", config.transform.engine);
    println!(
        "  Image branches: {}",
        config.routing.image_branch_set()
    );
    println!(
        "  Video branches: {}",
        config.routing.video_branch_set()
    );
    println!("  Join timeout: {}s", config.join.timeout_secs);

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("  No warnings");
    } else {
        println!("  Warnings:");
        for w in &warnings {
            println!("    - {w}");
        }
    }

    Ok(())
}
