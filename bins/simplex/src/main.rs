use anyhow::{Context, Result};
use cli::{Cli, Commands, LogFormatArg};
use config::{generate_default_config, load_config, save_config, validate_config, SimplexConfig};
use gateway::{create_router, Gateway, WsHandler};
use matching_engine::BookRegistry;
use observability::{init_logging, init_metrics, LogFormat};
use server::{health_routes, CombinedServer, HealthState, Server, ServerConfig, ShutdownController};
use settlement::InMemoryEscrow;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "simplex";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start {
            config,
            http,
            ws,
            log_format,
        } => start_exchange(config, http, ws, log_format).await,
        Commands::Validate { config } => {
            init_logging(SERVICE_NAME, LogFormat::Pretty)?;
            validate_command(config)
        }
        Commands::Init { output } => {
            init_logging(SERVICE_NAME, LogFormat::Pretty)?;
            init_command(output)
        }
    }
}

/// Load and validate, refusing to start on any error
fn load_valid_config<P: AsRef<Path>>(path: P) -> Result<SimplexConfig> {
    let config = load_config(&path)?;
    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, "{}", warning.message);
    }
    if !report.is_valid() {
        for err in &report.errors {
            error!(%err, "Invalid configuration");
        }
        anyhow::bail!("Configuration validation failed with {} error(s)", report.errors.len());
    }
    Ok(config)
}

async fn start_exchange<P: AsRef<Path>>(
    config_path: P,
    http_override: Option<u16>,
    ws_override: Option<u16>,
    log_format: Option<LogFormatArg>,
) -> Result<()> {
    let config = load_valid_config(&config_path)?;

    let format_name = log_format
        .map(|f| f.as_str().to_string())
        .unwrap_or_else(|| config.logging.format.clone());
    let format: LogFormat = format_name.parse().map_err(anyhow::Error::msg)?;
    init_logging(SERVICE_NAME, format)?;

    info!(
        exchange = %config.exchange.name,
        version = %config.exchange.version,
        books = config.books.len(),
        "Starting exchange"
    );

    if let Some(port) = config.monitoring.metrics_port {
        init_metrics(port).context("Failed to start metrics exporter")?;
    }

    let shutdown = ShutdownController::with_ctrl_c();

    let escrow = Arc::new(InMemoryEscrow::new());
    let registry = Arc::new(BookRegistry::from_config(&config, escrow));
    let reconcilers = registry.spawn_reconcilers(&config.reconciliation, &shutdown.token());

    let gateway = Gateway::new(registry.clone(), shutdown.child_token());
    let health = Arc::new(HealthState::with_version(SERVICE_NAME, config.exchange.version.clone()));
    let router = create_router(gateway.clone()).merge(health_routes(health));

    let server_config = ServerConfig::new(
        config.server.host.clone(),
        http_override.unwrap_or(config.server.http_port),
        ws_override.unwrap_or(config.server.websocket_port),
    );
    let server = CombinedServer::new(SERVICE_NAME, server_config)
        .with_http_router(router)
        .with_ws_handler(Arc::new(WsHandler::new(gateway)));

    server.validate_ports().await?;

    let result = server.run(shutdown.child_token()).await;

    shutdown.shutdown();
    registry.shutdown();
    for handle in reconcilers {
        if let Err(e) = handle.await {
            warn!(%e, "Reconciliation worker did not stop cleanly");
        }
    }

    info!("Exchange stopped");
    result.map_err(Into::into)
}

fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Exchange: {}", config.exchange.name);
    println!("Version: {}", config.exchange.version);
    println!("Books:");
    for book in &config.books {
        let pinned = if config.default_book.as_deref() == Some(book.id.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!(
            "  - {}{}: {} for {}",
            book.id, pinned, book.asset.brand, book.price.brand
        );
    }
    println!(
        "Settlement failure policy: {}",
        config.matching.settlement_failure_policy
    );

    Ok(())
}

fn init_command<P: AsRef<Path> + std::fmt::Debug>(output_path: P) -> Result<()> {
    let path = output_path.as_ref();
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing file {:?}", path);
    }

    let config = generate_default_config();
    save_config(&config, path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", path);
    println!();
    println!("This configuration includes:");
    println!("  - Exchange metadata (name, description, version)");
    println!("  - 1 book trading simoleans for moola, pinned as the default");
    println!("  - Reconciliation every 4 seconds");
    println!();
    println!("Next steps:");
    println!("  1. Edit the configuration file to customize settings");
    println!("  2. Run: simplex validate --config {}", path.display());
    println!("  3. Run: simplex start --config {}", path.display());

    Ok(())
}
