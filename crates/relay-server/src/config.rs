//! Server configuration.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! - Built-in defaults (`PORT` or `SOCKET_PORT` sets the listen port)
//! - TOML configuration file
//! - Environment variables (`RELAY_*`, nested with `__`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default configuration file locations, searched in order.
const CONFIG_PATHS: [&str; 3] = [
    "firechat-relay.toml",
    "/etc/firechat/relay.toml",
    "~/.config/firechat/relay.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Allowed browser origins.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Query parameter carrying the verified user identity.
    #[serde(default = "default_identity_param")]
    pub identity_param: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Origin allow-list for WebSocket upgrades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Exact origins (`https://chat.example.com`) or host suffix
    /// wildcards (`*.example.com`). Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    port_from(|key| std::env::var(key).ok())
}

/// `PORT`, then `SOCKET_PORT`, then 3001. Unparsable values are skipped.
fn port_from(lookup: impl Fn(&str) -> Option<String>) -> u16 {
    ["PORT", "SOCKET_PORT"]
        .into_iter()
        .find_map(|key| lookup(key).and_then(|p| p.parse().ok()))
        .unwrap_or(3001)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_identity_param() -> String {
    "userId".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            cors: CorsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            identity_param: default_identity_param(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl CorsConfig {
    /// Check whether a browser `Origin` header value is allowed.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }

        let origin = origin.trim_end_matches('/');
        let host = origin
            .split_once("://")
            .map_or(origin, |(_, rest)| rest)
            .split(':')
            .next()
            .unwrap_or_default();

        self.allowed_origins.iter().any(|allowed| {
            match allowed.strip_prefix('*') {
                Some(suffix) => suffix.starts_with('.') && host.ends_with(suffix),
                None => allowed.trim_end_matches('/').eq_ignore_ascii_case(origin),
            }
        })
    }
}

impl Config {
    /// Load configuration from defaults, a config file and the environment.
    ///
    /// An explicit `path` must exist. Without one, the first existing
    /// default location is used, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read or any source fails
    /// to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&Self::default())
                .context("Failed to build default configuration")?,
        );

        let file = match path {
            Some(path) => Some((path.to_path_buf(), true)),
            None => Self::find_default_file().map(|p| (p, false)),
        };
        if let Some((file, required)) = file {
            tracing::info!("Loading configuration from {}", file.display());
            builder = builder.add_source(
                config::File::from(file.as_path())
                    .format(config::FileFormat::Toml)
                    .required(required),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("cors.allowed_origins"),
        );

        builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Find the first default config file that exists.
    fn find_default_file() -> Option<PathBuf> {
        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.transport.identity_param, "userId");
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert!(config.cors.allowed_origins.is_empty());
        assert!(config.metrics.enabled);
    }

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_port_env_fallback() {
        assert_eq!(port_from(env(&[])), 3001);
        assert_eq!(port_from(env(&[("SOCKET_PORT", "4001")])), 4001);
        assert_eq!(port_from(env(&[("PORT", "8080"), ("SOCKET_PORT", "4001")])), 8080);
        assert_eq!(port_from(env(&[("PORT", "nope"), ("SOCKET_PORT", "4001")])), 4001);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".into();
        config.port = 4000;
        assert_eq!(config.bind_addr().unwrap().port(), 4000);

        config.host = "not a host".into();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "127.0.0.1"
            port = 9000

            [limits]
            max_connections = 500

            [cors]
            allowed_origins = ["http://localhost:3000", "*.vercel.app"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_connections, 500);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert_eq!(config.cors.allowed_origins.len(), 2);
    }

    #[test]
    fn test_load_explicit_file() {
        let path = std::env::temp_dir().join(format!(
            "firechat-relay-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "port = 4100\n[transport]\nwebsocket_path = \"/socket\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 4100);
        assert_eq!(config.transport.websocket_path, "/socket");
        assert_eq!(config.transport.identity_param, "userId");
    }

    #[test]
    fn test_load_missing_explicit_file() {
        assert!(Config::load(Some(Path::new("/nonexistent/firechat-relay.toml"))).is_err());
        assert!(Config::from_file("/nonexistent/firechat-relay.toml").is_err());
    }

    #[test]
    fn test_origin_allow_list() {
        let any = CorsConfig::default();
        assert!(any.allows("https://anything.example"));

        let cors = CorsConfig {
            allowed_origins: vec![
                "http://localhost:3000".into(),
                "https://chat.example.com/".into(),
                "*.vercel.app".into(),
            ],
        };
        assert!(cors.allows("http://localhost:3000"));
        assert!(cors.allows("https://chat.example.com"));
        assert!(cors.allows("https://fire-chat-beta.vercel.app"));
        assert!(!cors.allows("https://vercel.app.evil.com"));
        assert!(!cors.allows("http://localhost:4000"));
        assert!(!cors.allows("https://example.com"));
    }
}
