use crate::error::{IntakeError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Mail domain served by this gateway; mail for any other domain is refused
    pub domain: String,
    /// Name used in the SMTP greeting (empty: the machine's host name)
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub listen_addr: String,
    pub max_message_size: usize,
    pub max_recipients: usize,
    pub command_timeout_secs: u64,
    pub data_timeout_secs: u64,
    /// Protocol errors tolerated before the connection is closed
    pub max_errors: usize,
}

/// Endpoints of the MailHub API the intake relays messages into.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub create_message_url: String,
    pub store_attachment_url: String,
    /// Base URL; `/{message_id}/file/{file_id}` is appended per call
    pub link_attachment_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            domain: "mailhub.su".to_string(),
            hostname: String::new(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:587".to_string(),
            max_message_size: 25 * 1024 * 1024, // 25MB
            max_recipients: 100,
            command_timeout_secs: 300,
            data_timeout_secs: 600,
            max_errors: 10,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            create_message_url: "https://mailhub.su/api/v1/auth/sendOther".to_string(),
            store_attachment_url: "https://mailhub.su/api/v1/auth/addFileOther".to_string(),
            link_attachment_url: "https://mailhub.su/api/v1/auth/addFileToEmailOther".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IntakeError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| IntakeError::Config(e.to_string()))
    }

    /// Load defaults, then the optional TOML file, then `INTAKE__*` environment
    /// variables (`INTAKE__SERVER__DOMAIN=example.org`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("INTAKE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| IntakeError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| IntakeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.smtp.listen_addr.parse::<SocketAddr>().map_err(|e| {
            IntakeError::Config(format!(
                "Invalid listen address '{}': {}",
                self.smtp.listen_addr, e
            ))
        })?;

        if self.server.domain.trim().is_empty() {
            return Err(IntakeError::Config("Mail domain is empty".to_string()));
        }

        for url in [
            &self.api.create_message_url,
            &self.api.store_attachment_url,
            &self.api.link_attachment_url,
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(IntakeError::Config(format!(
                    "Endpoint URL '{}' must be absolute http(s)",
                    url
                )));
            }
        }

        if self.api.request_timeout_secs == 0
            || self.smtp.command_timeout_secs == 0
            || self.smtp.data_timeout_secs == 0
        {
            return Err(IntakeError::Config("Timeouts must be positive".to_string()));
        }

        Ok(())
    }

    /// Greeting name, falling back to the machine's host name.
    pub fn hostname(&self) -> String {
        if self.server.hostname.is_empty() {
            gethostname::gethostname().to_string_lossy().into_owned()
        } else {
            self.server.hostname.clone()
        }
    }
}
