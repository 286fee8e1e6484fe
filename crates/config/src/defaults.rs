pub fn default_enabled() -> bool {
    true
}

pub fn default_version() -> String {
    "1.0.0".to_string()
}

pub fn default_reconciliation_interval_seconds() -> u64 {
    4
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_http_port() -> u16 {
    8080
}

pub fn default_websocket_port() -> u16 {
    7080
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

pub fn default_book_id() -> String {
    "simoleans-moola".to_string()
}
