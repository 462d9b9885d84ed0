//! Configuration loading and management.
//!
//! Configuration is layered with figment and loaded from (in order of
//! priority, later wins):
//! 1. Default values (compiled in)
//! 2. Config file: `sdk-segments.toml` in the working directory (optional)
//! 3. Standard AWS environment variables (`AWS_REGION`, `AWS_DEFAULT_REGION`)
//! 4. Prefixed environment variables (`SDK_SEGMENTS_*`)
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `SDK_SEGMENTS_ENABLED` | `enabled` | Master switch for segment recording |
//! | `SDK_SEGMENTS_REGION` | `region` | Region recorded as `aws.region` |
//! | `SDK_SEGMENTS_ATTRIBUTES_EXCLUDE` | `attributes.exclude` | Attribute keys to drop, e.g. `[aws.region]` |

use crate::classifier::OperationDescriptor;
use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "sdk-segments.toml";
const ENV_PREFIX: &str = "SDK_SEGMENTS_";
pub(crate) const DEFAULT_REGION: &str = "us-east-1";

/// Interceptor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether traced calls record segments at all.
    pub enabled: bool,
    /// Region of the wrapped client.
    pub region: String,
    /// Attribute filtering.
    pub attributes: AttributesConfig,
    /// Extra operations to trace, keyed by SDK operation name.
    pub operations: HashMap<String, OperationDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            region: DEFAULT_REGION.to_string(),
            attributes: AttributesConfig::default(),
            operations: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from all sources using the default file path.
    ///
    /// # Errors
    ///
    /// Returns an error if any source holds a value of the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration using a custom config file path.
    ///
    /// A missing file is not an error; the remaining layers still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if any source holds a value of the wrong type.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(standard_aws_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("_"));

        Ok(figment.extract()?)
    }

    /// Creates a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Attribute filtering configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributesConfig {
    /// Keys that are never recorded.
    pub exclude: Vec<String>,
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Enables or disables segment recording.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Sets the client region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    /// Adds an attribute key to the exclude list.
    pub fn exclude_attribute(mut self, key: impl Into<String>) -> Self {
        self.config.attributes.exclude.push(key.into());
        self
    }

    /// Adds or overrides a traced operation.
    pub fn operation(mut self, name: impl Into<String>, descriptor: OperationDescriptor) -> Self {
        self.config.operations.insert(name.into(), descriptor);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial config for standard AWS env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
}

fn standard_aws_env() -> Serialized<PartialConfig> {
    let region = std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .ok()
        .filter(|region| !region.is_empty());

    Serialized::defaults(PartialConfig { region })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Action, ResourceKind};
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const AWS_VARS: [(&str, Option<&str>); 4] = [
        ("AWS_REGION", None),
        ("AWS_DEFAULT_REGION", None),
        ("SDK_SEGMENTS_REGION", None),
        ("SDK_SEGMENTS_ENABLED", None),
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.enabled);
        assert_eq!(config.region, "us-east-1");
        assert!(config.attributes.exclude.is_empty());
        assert!(config.operations.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let descriptor = OperationDescriptor::new(Action::Other, ResourceKind::Queue);
        let config = Config::builder()
            .enabled(false)
            .region("eu-west-1")
            .exclude_attribute("aws.requestId")
            .operation("DeleteMessageCommand", descriptor)
            .build();

        assert!(!config.enabled);
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.attributes.exclude, vec!["aws.requestId".to_string()]);
        assert_eq!(config.operations.get("DeleteMessageCommand"), Some(&descriptor));
    }

    #[test]
    #[serial]
    fn test_load_from_toml() {
        let toml_content = r#"
enabled = false
region = "ap-southeast-2"

[attributes]
exclude = ["aws.region"]

[operations.DeleteMessageCommand]
action = "Other"
resource_kind = "Queue"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = temp_env::with_vars(AWS_VARS, || {
            Config::load_from_path(temp_file.path()).unwrap()
        });

        assert!(!config.enabled);
        assert_eq!(config.region, "ap-southeast-2");
        assert_eq!(config.attributes.exclude, vec!["aws.region".to_string()]);
        assert_eq!(
            config.operations.get("DeleteMessageCommand"),
            Some(&OperationDescriptor::new(Action::Other, ResourceKind::Queue))
        );
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = temp_env::with_vars(AWS_VARS, || {
            Config::load_from_path("/nonexistent/path/sdk-segments.toml").unwrap()
        });

        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_standard_env_overrides_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"region = \"ap-southeast-2\"\n").unwrap();

        let config = temp_env::with_vars(
            [
                ("AWS_REGION", Some("us-west-2")),
                ("AWS_DEFAULT_REGION", None),
                ("SDK_SEGMENTS_REGION", None),
                ("SDK_SEGMENTS_ENABLED", None),
            ],
            || Config::load_from_path(temp_file.path()).unwrap(),
        );

        assert_eq!(config.region, "us-west-2");
    }

    #[test]
    #[serial]
    fn test_default_region_fallback() {
        let config = temp_env::with_vars(
            [
                ("AWS_REGION", None),
                ("AWS_DEFAULT_REGION", Some("ca-central-1")),
                ("SDK_SEGMENTS_REGION", None),
                ("SDK_SEGMENTS_ENABLED", None),
            ],
            || Config::load_from_path("/nonexistent").unwrap(),
        );

        assert_eq!(config.region, "ca-central-1");
    }

    #[test]
    #[serial]
    fn test_prefixed_env_wins() {
        let config = temp_env::with_vars(
            [
                ("AWS_REGION", Some("us-west-2")),
                ("AWS_DEFAULT_REGION", None),
                ("SDK_SEGMENTS_REGION", Some("eu-central-1")),
                ("SDK_SEGMENTS_ENABLED", Some("false")),
            ],
            || Config::load_from_path("/nonexistent").unwrap(),
        );

        assert_eq!(config.region, "eu-central-1");
        assert!(!config.enabled);
    }

    #[test]
    #[serial]
    fn test_invalid_value_is_an_error() {
        let result = temp_env::with_vars(
            [
                ("AWS_REGION", None),
                ("AWS_DEFAULT_REGION", None),
                ("SDK_SEGMENTS_REGION", None),
                ("SDK_SEGMENTS_ENABLED", Some("definitely")),
            ],
            || Config::load_from_path("/nonexistent"),
        );

        assert!(matches!(result, Err(ConfigError::Figment(_))));
    }
}
