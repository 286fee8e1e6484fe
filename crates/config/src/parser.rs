use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SimplexConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());

    parse_config(&content)
}

/// Parse a YAML document after environment substitution
pub fn parse_config(content: &str) -> Result<SimplexConfig> {
    let substituted = substitution::substitute_env_vars(content)?;
    debug!("Environment variable substitution completed");

    let config: SimplexConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    info!(books = config.books.len(), "Configuration loaded successfully");
    Ok(config)
}

#[instrument]
pub fn generate_default_config() -> SimplexConfig {
    SimplexConfig {
        exchange: ExchangeConfig {
            name: "Simple Exchange".to_string(),
            description: "Single-pair limit order exchange with live book updates".to_string(),
            version: default_version(),
        },
        books: vec![BookConfig {
            id: default_book_id(),
            asset: PairSideConfig {
                keyword: "Asset".to_string(),
                brand: "simoleans".to_string(),
                label: Some("simoleans".to_string()),
            },
            price: PairSideConfig {
                keyword: "Price".to_string(),
                brand: "moola".to_string(),
                label: Some("moola".to_string()),
            },
        }],
        default_book: Some(default_book_id()),
        matching: MatchingConfig::default(),
        reconciliation: ReconciliationConfig::default(),
        server: ServerConfig::default(),
        logging: LoggingConfig::default(),
        monitoring: MonitoringConfig {
            metrics_port: Some(default_metrics_port()),
        },
    }
}

#[instrument(skip(config))]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &SimplexConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = generate_default_config();
        let report = validate_config(&cfg);
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("simplex-config-{}.yaml", std::process::id()));
        let cfg = generate_default_config();

        save_config(&cfg, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.exchange.name, cfg.exchange.name);
        assert_eq!(loaded.books[0].id, cfg.books[0].id);
        assert_eq!(loaded.default_book, cfg.default_book);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = load_config("/nonexistent/simplex.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_parse_substitutes_environment() {
        std::env::set_var("SIMPLEX_TEST_HTTP_PORT", "18081");
        let yaml = r#"
exchange:
  name: "Simple Exchange"
server:
  http_port: ${SIMPLEX_TEST_HTTP_PORT}
"#;
        let cfg = parse_config(yaml).unwrap();
        assert_eq!(cfg.server.http_port, 18081);
    }
}
