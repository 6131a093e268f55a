use super::RequestsLoggingLevel;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub host: String,
    pub port: u16,
    /// Port of the Prometheus listener, 0 disables it.
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            host: "0.0.0.0".to_string(),
            port: 8080,
            metrics_port: 9091,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn metrics_addr(&self) -> Option<String> {
        (self.metrics_port != 0).then(|| format!("{}:{}", self.host, self.metrics_port))
    }
}
