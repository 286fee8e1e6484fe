//! Configuration for Simplex
//!
//! The whole process is described by one YAML document. Loading performs
//! `${VAR}` substitution from the environment before parsing, and
//! [`validate_config`] produces a report of errors, warnings and the
//! defaults that were filled in.

use serde::{Deserialize, Serialize};

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
}

/// One side of a trading pair: the keyword it travels under and its brand
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PairSideConfig {
    pub keyword: String,
    pub brand: String,
    /// Public name shown for the brand in book views; falls back to `keyword`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl PairSideConfig {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.keyword)
    }
}

/// A single order book
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BookConfig {
    pub id: String,
    pub asset: PairSideConfig,
    pub price: PairSideConfig,
}

/// What happens to an incoming order whose matched settlement failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementFailurePolicy {
    /// The incoming order stays booked and the error is returned
    #[default]
    KeepResting,
    /// The incoming order is cancelled and handed back to its owner
    Withdraw,
}

impl std::fmt::Display for SettlementFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepResting => f.write_str("keep_resting"),
            Self::Withdraw => f.write_str("withdraw"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub settlement_failure_policy: SettlementFailurePolicy,
}

/// Sweep that moves externally withdrawn orders into history
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Upper bound on how long an externally cancelled order stays visible
    #[serde(default = "default_reconciliation_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_enabled")]
    pub run_on_startup: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_reconciliation_interval_seconds(),
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,
}

impl ServerConfig {
    /// Full HTTP bind address (host:http_port)
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    /// Full WebSocket bind address (host:websocket_port)
    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.host, self.websocket_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            websocket_port: default_websocket_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// One of `pretty`, `json`, `compact`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Prometheus exporter port; metrics are not exported when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Root configuration document
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimplexConfig {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub books: Vec<BookConfig>,
    /// Book that requests without an explicit book id are routed to
    #[serde(default)]
    pub default_book: Option<String>,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl SimplexConfig {
    /// Look up a book by id
    pub fn book(&self, id: &str) -> Option<&BookConfig> {
        self.books.iter().find(|b| b.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_fills_defaults() {
        let yaml = r#"
exchange:
  name: "Simple Exchange"
books:
  - id: "simoleans-moola"
    asset: { keyword: "Asset", brand: "simoleans" }
    price: { keyword: "Price", brand: "moola" }
"#;
        let cfg: SimplexConfig = serde_yaml::from_str(yaml).expect("Failed to parse YAML");

        assert_eq!(cfg.exchange.version, "1.0.0");
        assert_eq!(cfg.books.len(), 1);
        assert_eq!(cfg.books[0].asset.brand, "simoleans");
        assert!(cfg.default_book.is_none());
        assert_eq!(
            cfg.matching.settlement_failure_policy,
            SettlementFailurePolicy::KeepResting
        );
        assert!(cfg.reconciliation.enabled);
        assert_eq!(cfg.reconciliation.interval_seconds, 4);
        assert_eq!(cfg.server.http_port, 8080);
        assert_eq!(cfg.server.websocket_port, 7080);
        assert_eq!(cfg.logging.format, "pretty");
        assert!(cfg.monitoring.metrics_port.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
exchange:
  name: "Simple Exchange"
  description: "Limit order book"
  version: "2.1.0"
books:
  - id: "simoleans-moola"
    asset: { keyword: "Asset", brand: "simoleans" }
    price: { keyword: "Price", brand: "moola" }
default_book: "simoleans-moola"
matching:
  settlement_failure_policy: withdraw
reconciliation:
  enabled: false
  interval_seconds: 10
  run_on_startup: false
server:
  host: "127.0.0.1"
  http_port: 18080
  websocket_port: 17080
logging:
  format: json
monitoring:
  metrics_port: 9090
"#;
        let cfg: SimplexConfig = serde_yaml::from_str(yaml).expect("Failed to parse YAML");

        assert_eq!(cfg.default_book.as_deref(), Some("simoleans-moola"));
        assert_eq!(
            cfg.matching.settlement_failure_policy,
            SettlementFailurePolicy::Withdraw
        );
        assert!(!cfg.reconciliation.enabled);
        assert_eq!(cfg.server.http_address(), "127.0.0.1:18080");
        assert_eq!(cfg.server.ws_address(), "127.0.0.1:17080");
        assert_eq!(cfg.monitoring.metrics_port, Some(9090));
        assert!(cfg.book("simoleans-moola").is_some());
        assert!(cfg.book("missing").is_none());
    }
}
