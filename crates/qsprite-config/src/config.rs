//! Main configuration types.
//!
//! This module provides the top-level [`QspriteConfig`] struct and its builder.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use qsprite_telemetry::TelemetryConfig;
use qsprite_ws::{ConversationConfig, OriginPattern};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConversationSection, LogFormat, ServerConfig, TelemetrySection};

/// Complete qsprite configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use qsprite_config::QspriteConfig;
///
/// let config = QspriteConfig::default();
/// assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct QspriteConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Conversation configuration.
    #[serde(default)]
    pub conversation: ConversationSection,

    /// Telemetry configuration (logging, metrics).
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl QspriteConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> QspriteConfigBuilder {
        QspriteConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `BadAddress` for a listen or metrics address that does not
    /// parse, `NoOrigins` or `BadOrigin` for a bad allow-list, and
    /// `ZeroLimit` for a zero size or capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::bad_address(
                "server.listen_addr",
                &self.server.listen_addr,
            ));
        }

        if self.server.max_header_bytes == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "server.max_header_bytes",
            });
        }

        if self.telemetry.metrics.enabled
            && self.telemetry.metrics.addr.parse::<SocketAddr>().is_err()
        {
            return Err(ConfigError::bad_address(
                "telemetry.metrics.addr",
                &self.telemetry.metrics.addr,
            ));
        }

        let conversation = &self.conversation;
        if conversation.allowed_origins.is_empty() {
            return Err(ConfigError::NoOrigins);
        }
        for pattern in &conversation.allowed_origins {
            if let Err(e) = OriginPattern::from_str(pattern) {
                return Err(ConfigError::BadOrigin {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }

        for (field, value) in [
            ("conversation.max_message_size", conversation.max_message_size),
            ("conversation.event_capacity", conversation.event_capacity),
            ("conversation.read_buffer_size", conversation.read_buffer_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit { field });
            }
        }

        Ok(())
    }

    /// Runtime conversation configuration.
    pub fn conversation_config(&self) -> ConversationConfig {
        self.conversation
            .to_conversation_config(Duration::from_secs(self.server.keepalive_secs))
    }

    /// Runtime telemetry configuration.
    pub fn telemetry_config(&self) -> TelemetryConfig {
        self.telemetry.to_telemetry_config()
    }

    /// Create a development configuration preset.
    ///
    /// Pretty debug-level logs with source locations and span events.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.listen_addr = "127.0.0.1:8080".to_string();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config.telemetry.logging.span_events = true;
        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON info-level logs and the Prometheus exporter enabled.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.enabled = true;
        config
    }
}

/// Builder for [`QspriteConfig`].
#[derive(Debug, Default)]
pub struct QspriteConfigBuilder {
    server: Option<ServerConfig>,
    conversation: Option<ConversationSection>,
    telemetry: Option<TelemetrySection>,
}

impl QspriteConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listener configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the conversation configuration.
    #[must_use]
    pub fn conversation(mut self, conversation: ConversationSection) -> Self {
        self.conversation = Some(conversation);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> QspriteConfig {
        QspriteConfig {
            server: self.server.unwrap_or_default(),
            conversation: self.conversation.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<QspriteConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsSection;

    #[test]
    fn test_default_config_is_valid() {
        let config = QspriteConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.conversation.allowed_origins, vec!["*:*".to_string()]);
    }

    #[test]
    fn test_validate_invalid_listen_addr() {
        let config = QspriteConfig::builder()
            .server(ServerConfig {
                listen_addr: "not-an-address".to_string(),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.listen_addr"));
    }

    #[test]
    fn test_validate_invalid_metrics_addr() {
        let config = QspriteConfig::builder()
            .telemetry(TelemetrySection {
                metrics: MetricsSection {
                    enabled: true,
                    addr: "invalid".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.addr"));
    }

    #[test]
    fn test_validate_empty_origins() {
        let config = QspriteConfig::builder()
            .conversation(ConversationSection {
                allowed_origins: Vec::new(),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("allowed_origins"));
    }

    #[test]
    fn test_validate_bad_origin_pattern() {
        let result = QspriteConfig::builder()
            .conversation(ConversationSection {
                allowed_origins: vec!["example.com:http".to_string()],
                ..Default::default()
            })
            .build_validated();

        assert!(matches!(
            result,
            Err(ConfigError::BadOrigin { pattern, .. }) if pattern == "example.com:http"
        ));
    }

    #[test]
    fn test_validate_zero_message_size() {
        let config = QspriteConfig::builder()
            .conversation(ConversationSection {
                max_message_size: 0,
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_message_size"));
    }

    #[test]
    fn test_presets() {
        let dev = QspriteConfig::development();
        assert_eq!(dev.telemetry.logging.format, LogFormat::Pretty);
        assert_eq!(dev.telemetry.logging.level, "debug");

        let prod = QspriteConfig::production();
        assert_eq!(prod.telemetry.logging.format, LogFormat::Json);
        assert!(prod.telemetry.metrics.enabled);
        assert!(prod.validate().is_ok());
    }

    #[test]
    fn test_runtime_conversions() {
        let config = QspriteConfig::default();
        assert_eq!(
            config.conversation_config().keepalive_interval,
            Duration::from_secs(50)
        );
        assert!(config.telemetry_config().logging.json_format);
    }

    #[test]
    fn test_toml_roundtrip_sections() {
        let config = QspriteConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[conversation]"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            [server]
            listen_addr = "127.0.0.1:8000"

            [conversation]
            allowed_origins = ["example.com:443", "*:8080"]
        "#;

        let config: QspriteConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8000");
        assert_eq!(config.conversation.allowed_origins.len(), 2);
        assert_eq!(config.conversation.nonce_timeout_ms, 5000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml_str = r#"
            [conversation]
            max_frame = 10
        "#;

        let result: Result<QspriteConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }
}
