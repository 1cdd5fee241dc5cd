/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::message::{ConfigError, MessageType};

/// Service configuration for the topic-rpc bridge.
///
/// Loaded from TOML, usually from `$XDG_CONFIG_HOME/topic-rpc/config.toml`:
///
/// ```toml
/// [services.calculator]
/// service_instance_name = "calc-1"
///
/// [services.calculator.request]
/// name = "Calculator_Request"
/// members = { addition = "AddRequest" }
///
/// [services.calculator.reply]
/// name = "Calculator_Reply"
/// members = { addition = "AddReply" }
///
/// [services.calculator.remap]
/// type = "addition"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Per-service settings keyed by service name.
    pub services: BTreeMap<String, ServiceConfig>,
}

/// Settings for one request/reply service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Data type of the request topic.
    pub request: MessageType,
    /// Data type of the reply topic.
    pub reply: MessageType,
    /// Discriminator aliases for union-shaped types.
    pub remap: RemapConfig,
    /// Instance name advertised with the endpoint's publication.
    pub service_instance_name: Option<String>,
}

/// Names of the union members that carry a service's payloads.
///
/// When `type` is set it applies to both request and reply unions and the
/// direction-specific entries are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemapConfig {
    /// Member used in both directions.
    #[serde(rename = "type")]
    pub type_member: Option<String>,
    /// Member carrying requests.
    pub request_type: Option<String>,
    /// Member carrying replies.
    pub reply_type: Option<String>,
}

impl ServiceConfig {
    /// A service whose request and reply topics carry plain types.
    #[must_use]
    pub fn plain(request_type: impl Into<String>, reply_type: impl Into<String>) -> Self {
        Self {
            request: MessageType::plain(request_type),
            reply: MessageType::plain(reply_type),
            ..Self::default()
        }
    }

    /// Sets the remap aliases.
    #[must_use]
    pub fn with_remap(mut self, remap: RemapConfig) -> Self {
        self.remap = remap;
        self
    }

    /// Sets the service instance name.
    #[must_use]
    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.service_instance_name = Some(name.into());
        self
    }
}

impl RemapConfig {
    /// One member name used for both directions.
    #[must_use]
    pub fn both(member: impl Into<String>) -> Self {
        Self {
            type_member: Some(member.into()),
            ..Self::default()
        }
    }

    /// Separate members for requests and replies.
    #[must_use]
    pub fn split(request: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            type_member: None,
            request_type: Some(request.into()),
            reply_type: Some(reply.into()),
        }
    }

    /// Whether no alias is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_member.is_none() && self.request_type.is_none() && self.reply_type.is_none()
    }
}

impl BridgeConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the text is not valid for the schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if it is malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads configuration from XDG-compliant locations.
    ///
    /// Looks for `topic-rpc/config.toml` under the XDG config directories.
    /// A missing file yields the default (empty) configuration; a file that
    /// exists but cannot be read or parsed is logged and also yields the
    /// default.
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("topic-rpc") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::from_path(&path) {
            Ok(config) => {
                info!(services = config.services.len(), "Successfully loaded configuration");
                config
            }
            Err(e) => {
                error!("{}", e);
                Self::default()
            }
        }
    }

    /// Looks up the configuration for `service`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownService`] if no entry exists.
    pub fn service(&self, service: &str) -> Result<&ServiceConfig, ConfigError> {
        self.services
            .get(service)
            .ok_or_else(|| ConfigError::UnknownService(service.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [services.calculator]
        service_instance_name = "calc-1"

        [services.calculator.request]
        name = "Calculator_Request"
        members = { addition = "AddRequest", subtraction = "SubRequest" }

        [services.calculator.reply]
        name = "Calculator_Reply"
        members = { addition = "AddReply", subtraction = "SubReply" }

        [services.calculator.remap]
        request_type = "addition"
        reply_type = "addition"

        [services.echo.request]
        name = "EchoRequest"

        [services.echo.reply]
        name = "EchoReply"
    "#;

    #[test]
    fn test_parse_services() {
        let config = BridgeConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.services.len(), 2);

        let calc = config.service("calculator").unwrap();
        assert_eq!(calc.service_instance_name.as_deref(), Some("calc-1"));
        assert_eq!(calc.request.member_type("subtraction"), Some("SubRequest"));
        assert_eq!(calc.remap, RemapConfig::split("addition", "addition"));

        let echo = config.service("echo").unwrap();
        assert!(!echo.request.is_union());
        assert!(echo.remap.is_empty());
    }

    #[test]
    fn test_type_key_maps_to_type_member() {
        let remap: RemapConfig = toml::from_str(r#"type = "addition""#).unwrap();
        assert_eq!(remap, RemapConfig::both("addition"));
    }

    #[test]
    fn test_unknown_service_is_an_error() {
        let config = BridgeConfig::default();
        assert!(matches!(
            config.service("missing"),
            Err(ConfigError::UnknownService(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = BridgeConfig::from_toml_str("[services.calculator\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
