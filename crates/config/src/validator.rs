use crate::*;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Exchange name is required")]
    MissingExchangeName,

    #[error("Invalid version format: {0}. Must be in format X.Y.Z (e.g., 1.0.0)")]
    InvalidVersionFormat(String),

    #[error("At least one book must be configured")]
    NoBooks,

    #[error("Duplicate book id '{0}'")]
    DuplicateBook(String),

    #[error("Book {id}: {message}")]
    InvalidBook { id: String, message: String },

    #[error("default_book '{0}' does not name a configured book")]
    UnknownDefaultBook(String),

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Server: {message}")]
    InvalidServer { message: String },

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

const LOG_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

/// Proposal keywords each book side must travel under
const ASSET_KEYWORD: &str = "Asset";
const PRICE_KEYWORD: &str = "Price";

pub fn validate_config(config: &SimplexConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_exchange(&config.exchange, &mut report);
    validate_books(config, &mut report);
    validate_reconciliation(&config.reconciliation, &mut report);
    validate_server(&config.server, &mut report);

    if !LOG_FORMATS.contains(&config.logging.format.to_lowercase().as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(config.logging.format.clone()));
    }

    match config.monitoring.metrics_port {
        Some(port) => {
            if port == config.server.http_port || port == config.server.websocket_port {
                report.add_error(ValidationError::InvalidServer {
                    message: format!("metrics_port {} collides with a server port", port),
                });
            }
        }
        None => report.add_warning(
            "monitoring.metrics_port",
            "Not set; Prometheus metrics will not be exported",
        ),
    }

    report
}

fn validate_exchange(exchange: &ExchangeConfig, report: &mut ValidationReport) {
    if exchange.name.trim().is_empty() {
        report.add_error(ValidationError::MissingExchangeName);
    }

    let version_ok = Regex::new(r"^\d+\.\d+\.\d+$")
        .map(|re| re.is_match(&exchange.version))
        .unwrap_or(false);
    if !version_ok {
        report.add_error(ValidationError::InvalidVersionFormat(exchange.version.clone()));
    }

    if exchange.description.is_empty() {
        report.add_default("exchange.description", "\"\"");
    }
}

fn validate_books(config: &SimplexConfig, report: &mut ValidationReport) {
    if config.books.is_empty() {
        report.add_error(ValidationError::NoBooks);
    }

    let mut seen = HashSet::new();
    for book in &config.books {
        if !seen.insert(book.id.as_str()) {
            report.add_error(ValidationError::DuplicateBook(book.id.clone()));
        }
        validate_book(book, report);
    }

    match &config.default_book {
        Some(id) if config.book(id).is_none() => {
            report.add_error(ValidationError::UnknownDefaultBook(id.clone()));
        }
        Some(_) => {}
        None if config.books.len() > 1 => report.add_warning(
            "default_book",
            "Not set; requests must always name a book",
        ),
        None => {}
    }
}

fn validate_book(book: &BookConfig, report: &mut ValidationReport) {
    let mut invalid = |message: String| {
        report.add_error(ValidationError::InvalidBook {
            id: book.id.clone(),
            message,
        })
    };

    if book.id.trim().is_empty() {
        invalid("id must not be empty".to_string());
    }
    if book.asset.keyword != ASSET_KEYWORD {
        invalid(format!("asset keyword must be 'Asset', got '{}'", book.asset.keyword));
    }
    if book.price.keyword != PRICE_KEYWORD {
        invalid(format!("price keyword must be 'Price', got '{}'", book.price.keyword));
    }
    if book.asset.brand.is_empty() || book.price.brand.is_empty() {
        invalid("brands must not be empty".to_string());
    }
    if book.asset.brand == book.price.brand {
        invalid(format!(
            "asset and price must use different brands, both are '{}'",
            book.asset.brand
        ));
    }
    for (field, value) in [("asset.brand", &book.asset.brand), ("price.brand", &book.price.brand)] {
        if has_unresolved_env_vars(value) {
            report.add_error(ValidationError::InvalidEnvVar {
                var: value.clone(),
                message: format!("unresolved in books[{}].{}", book.id, field),
            });
        }
    }
}

fn validate_reconciliation(reconciliation: &ReconciliationConfig, report: &mut ValidationReport) {
    if !reconciliation.enabled {
        report.add_warning(
            "reconciliation.enabled",
            "Disabled; externally withdrawn orders leave the book only when it is next mutated",
        );
        return;
    }

    if reconciliation.interval_seconds == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "reconciliation.interval_seconds".to_string(),
        });
    }
}

fn validate_server(server: &ServerConfig, report: &mut ValidationReport) {
    if server.host.trim().is_empty() {
        report.add_error(ValidationError::InvalidServer {
            message: "host must not be empty".to_string(),
        });
    }
    if server.http_port == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "server.http_port".to_string(),
        });
    }
    if server.websocket_port == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "server.websocket_port".to_string(),
        });
    }
    if server.http_port != 0 && server.http_port == server.websocket_port {
        report.add_error(ValidationError::InvalidServer {
            message: format!(
                "http_port and websocket_port must differ, both are {}",
                server.http_port
            ),
        });
    }
}
