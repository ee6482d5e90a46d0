//! Environment-derived service configuration.

use std::net::SocketAddr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Read configuration from the environment, with local-dev defaults.
    pub fn from_env() -> Self {
        let host = std::env::var("CASEFLOW_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("CASEFLOW_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        Self {
            server: ServerConfig { host, port },
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
