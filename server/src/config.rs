//! Server configuration.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

/// Database configuration.
///
/// `url` wins when set; otherwise the connection is assembled from the
/// component fields.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    pub ssl_root_cert: Option<String>,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            name: "wallet".to_string(),
            ssl_mode: "prefer".to_string(),
            ssl_root_cert: None,
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    /// Build sqlx connect options.
    pub fn connect_options(&self) -> Result<PgConnectOptions, String> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url).map_err(|e| format!("Invalid DATABASE_URL: {e}"));
        }

        let ssl_mode = PgSslMode::from_str(&self.ssl_mode)
            .map_err(|e| format!("Invalid DB_SSLMODE {:?}: {e}", self.ssl_mode))?;
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name)
            .ssl_mode(ssl_mode);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        if let Some(cert) = &self.ssl_root_cert {
            options = options.ssl_root_cert(cert.as_str());
        }
        Ok(options)
    }

    /// Connection target without credentials, for logs.
    pub fn describe(&self) -> String {
        match &self.url {
            Some(url) => match url.rsplit_once('@') {
                Some((_, target)) => format!("postgres://***@{target}"),
                None => url.clone(),
            },
            None => format!(
                "{}:{}/{} sslmode={}",
                self.host, self.port, self.name, self.ssl_mode
            ),
        }
    }
}

/// Which rate source backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSourceKind {
    /// The local `exchange_rates` table.
    Database,
    /// A remote rate service.
    Remote,
}

impl FromStr for RateSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(RateSourceKind::Database),
            "remote" | "http" => Ok(RateSourceKind::Remote),
            other => Err(format!("Unknown rate source: {other}")),
        }
    }
}

/// Rate source and cache configuration.
#[derive(Debug, Clone)]
pub struct RateConfig {
    pub source: RateSourceKind,
    /// Base URL of the remote rate service.
    pub service_url: Option<String>,
    /// Timeout of one remote request.
    pub request_timeout: Duration,
    /// Freshness window of cached rates.
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            source: RateSourceKind::Database,
            service_url: None,
            request_timeout: Duration::from_secs(3),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 1024,
        }
    }
}

/// Ledger timeouts.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Upper bound on one unit of work.
    pub op_timeout: Duration,
    /// Postgres `lock_timeout` inside each unit of work.
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(5000),
            lock_timeout: Duration::from_millis(3000),
        }
    }
}

/// Token and password configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret.
    pub jwt_secret: String,
    /// Lifetime of tokens issued on login.
    pub token_ttl: Duration,
    /// bcrypt cost for new password hashes.
    pub password_hash_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl: Duration::from_secs(24 * 60 * 60),
            password_hash_cost: 12,
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Default)]
pub struct HttpConfig {
    /// Value of `Access-Control-Allow-Origin`; CORS headers are omitted when unset.
    pub cors_allowed_origin: Option<String>,
}

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    pub database: DatabaseConfig,
    pub rates: RateConfig,
    pub ledger: LedgerConfig,
    pub auth: AuthConfig,
    pub http: HttpConfig,
    /// Log level.
    pub log_level: String,
    /// Emit JSON logs.
    pub log_json: bool,
    /// Variables that were set but could not be parsed.
    pub parse_errors: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            database: DatabaseConfig::default(),
            rates: RateConfig::default(),
            ledger: LedgerConfig::default(),
            auth: AuthConfig::default(),
            http: HttpConfig::default(),
            log_level: "info".to_string(),
            log_json: true,
            parse_errors: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparsable values keep their defaults and are recorded in
    /// `parse_errors`, which [`ServerConfig::validate`] rejects.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let mut errors = Vec::new();

        if let Some(addr) = get("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(port) = parse_var(&get, "LISTEN_PORT", &mut errors) {
            config.listen_port = port;
        }

        let db = &mut config.database;
        db.url = get("DATABASE_URL");
        if let Some(host) = get("DB_HOST") {
            db.host = host;
            // Component variables follow the hosted default of verified TLS.
            db.ssl_mode = "verify-full".to_string();
        }
        if let Some(port) = parse_var(&get, "DB_PORT", &mut errors) {
            db.port = port;
        }
        if let Some(user) = get("DB_USER") {
            db.user = user;
        }
        if let Some(password) = get("DB_PASSWORD") {
            db.password = password;
        }
        if let Some(name) = get("DB_NAME") {
            db.name = name;
        }
        if let Some(mode) = get("DB_SSLMODE") {
            db.ssl_mode = mode;
        }
        db.ssl_root_cert = get("DB_SSLROOTCERT").filter(|c| !c.is_empty());
        if let Some(max) = parse_var(&get, "DB_MAX_CONNECTIONS", &mut errors) {
            db.max_connections = max;
        }

        if let Some(secret) = get("JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if let Some(secs) = parse_var(&get, "JWT_TTL_SECS", &mut errors) {
            config.auth.token_ttl = Duration::from_secs(secs);
        }
        if let Some(cost) = parse_var(&get, "PASSWORD_HASH_COST", &mut errors) {
            config.auth.password_hash_cost = cost;
        }

        if let Some(source) = parse_var(&get, "RATE_SOURCE", &mut errors) {
            config.rates.source = source;
        }
        config.rates.service_url = get("RATE_SERVICE_URL").filter(|u| !u.is_empty());
        if let Some(secs) = parse_var(&get, "RATE_CACHE_TTL_SECS", &mut errors) {
            config.rates.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var(&get, "RATE_CACHE_MAX_ENTRIES", &mut errors) {
            config.rates.cache_max_entries = max;
        }

        if let Some(ms) = parse_var(&get, "LEDGER_OP_TIMEOUT_MS", &mut errors) {
            config.ledger.op_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&get, "LEDGER_LOCK_TIMEOUT_MS", &mut errors) {
            config.ledger.lock_timeout = Duration::from_millis(ms);
        }

        config.http.cors_allowed_origin = get("CORS_ALLOWED_ORIGIN").filter(|o| !o.is_empty());

        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(json) = parse_var(&get, "LOG_JSON", &mut errors) {
            config.log_json = json;
        }

        config.parse_errors = errors;
        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.parse_errors.is_empty() {
            return Err(format!(
                "Unparsable environment values: {}",
                self.parse_errors.join("; ")
            ));
        }

        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        match &self.database.url {
            Some(url) if url.is_empty() => {
                return Err("Database URL cannot be empty".to_string());
            }
            None if self.database.host.is_empty() => {
                return Err("Database host cannot be empty".to_string());
            }
            _ => {}
        }

        if self.auth.jwt_secret.is_empty() {
            return Err("JWT secret cannot be empty".to_string());
        }

        if self.auth.token_ttl.is_zero() {
            return Err("Token lifetime cannot be 0".to_string());
        }

        if !(4..=31).contains(&self.auth.password_hash_cost) {
            return Err("Password hash cost must be between 4 and 31".to_string());
        }

        if self.rates.cache_ttl.is_zero() {
            return Err("Rate cache TTL cannot be 0".to_string());
        }

        if self.rates.source == RateSourceKind::Remote && self.rates.service_url.is_none() {
            return Err("Remote rate source requires RATE_SERVICE_URL".to_string());
        }

        if self.ledger.lock_timeout >= self.ledger.op_timeout {
            return Err("Lock timeout must be shorter than the operation timeout".to_string());
        }

        Ok(())
    }
}

/// Parse an optional variable, recording a message when it is malformed.
fn parse_var<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(format!("{key}={raw:?} ({e})"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn valid() -> ServerConfig {
        ServerConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")]))
    }

    #[test]
    fn test_default_config() {
        let config = valid();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.rates.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.rates.source, RateSourceKind::Database);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = valid();
        config.listen_port = 0;
        assert!(config.validate().is_err());

        let config = ServerConfig::from_lookup(lookup(&[]));
        assert!(config.validate().unwrap_err().contains("JWT"));

        let mut config = valid();
        config.rates.cache_ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.ledger.lock_timeout = config.ledger.op_timeout;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("RATE_SOURCE", "remtoe"),
            ("LEDGER_OP_TIMEOUT_MS", "5s"),
        ]));
        assert_eq!(config.rates.source, RateSourceKind::Database);
        assert_eq!(config.parse_errors.len(), 2);

        let err = config.validate().unwrap_err();
        assert!(err.contains("RATE_SOURCE"));
        assert!(err.contains("LEDGER_OP_TIMEOUT_MS"));
    }

    #[test]
    fn test_auth_settings() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("JWT_TTL_SECS", "600"),
            ("PASSWORD_HASH_COST", "10"),
        ]));
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.token_ttl, Duration::from_secs(600));
        assert_eq!(config.auth.password_hash_cost, 10);

        let mut config = valid();
        config.auth.password_hash_cost = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_source_requires_url() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("RATE_SOURCE", "remote"),
        ]));
        assert!(config.validate().is_err());

        let config = ServerConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("RATE_SOURCE", "remote"),
            ("RATE_SERVICE_URL", "http://rates.internal"),
        ]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_component_database_variables() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6432"),
            ("DB_USER", "wallet"),
            ("DB_PASSWORD", "pw"),
            ("DB_NAME", "ledger"),
            ("DB_SSLROOTCERT", "/etc/ssl/root.crt"),
        ]));
        let db = &config.database;
        assert_eq!(db.ssl_mode, "verify-full");
        assert_eq!(db.ssl_root_cert.as_deref(), Some("/etc/ssl/root.crt"));
        assert_eq!(db.describe(), "db.internal:6432/ledger sslmode=verify-full");

        let options = db.connect_options().unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_database(), Some("ledger"));
    }

    #[test]
    fn test_database_url_wins_and_is_redacted() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://u:pw@localhost:5432/wallet"),
            ("DB_HOST", "ignored"),
        ]));
        assert_eq!(config.database.describe(), "postgres://***@localhost:5432/wallet");
        assert_eq!(config.database.connect_options().unwrap().get_host(), "localhost");
    }

    #[test]
    fn test_bad_ssl_mode_rejected() {
        let mut db = DatabaseConfig::default();
        db.ssl_mode = "sometimes".to_string();
        assert!(db.connect_options().is_err());
    }
}
