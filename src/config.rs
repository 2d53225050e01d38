use std::env;
use std::path::PathBuf;

/// Runtime configuration for the permitflow server.
///
/// Resolution order: built-in defaults, then `PERMITFLOW_*` environment
/// variables, then CLI flags (applied by `main`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Dev mode binds on all interfaces and relaxes CORS.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8642,
            db_path: PathBuf::from("data/permitflow.db"),
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(port) = env::var("PERMITFLOW_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            } else {
                tracing::warn!("Ignoring unparseable PERMITFLOW_PORT={}", port);
            }
        }
        if let Ok(path) = env::var("PERMITFLOW_DB") {
            if !path.is_empty() {
                config.db_path = PathBuf::from(path);
            }
        }
        if let Ok(dev) = env::var("PERMITFLOW_DEV") {
            config.dev_mode = matches!(dev.as_str(), "1" | "true" | "yes");
        }
        config
    }

    pub fn bind_addr(&self) -> String {
        let host = if self.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
        format!("{}:{}", host, self.port)
    }
}
