use std::path::Path;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use crate::errors::SetupError;

/// Configuration file read when no other path is given.
pub const DEFAULT_CONFIG_PATH: &str = "./schemalog.yaml";

/// Prefix of environment overrides, e.g. `SCHEMALOG_LOGGING__POOL_SIZE=2`.
pub const ENV_PREFIX: &str = "SCHEMALOG_";

const CURRENT_VERSION: &str = "1.0.0";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, JsonSchema)]
pub struct ConfigV1 {
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// YAML file first, then environment overrides. A missing file or a file
/// without `version` is treated as the current version.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .join(Serialized::default("version", CURRENT_VERSION))
}

/// Load the configuration from `path` plus environment overrides.
pub fn load_config(path: &Path) -> Result<ConfigV1, SetupError> {
    match figment(path).extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() -> Result<(), serde_json::Error> {
    let schema = schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use figment::Jail;

    #[test]
    fn loads_yaml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "schemalog.yaml",
                r#"
version: "1.0.0"
logging:
  level: "warn"
  logfile: "metrics.log"
  pool_size: 2
  schema: "field1: string, field2: integer"
"#,
            )?;

            let config = load_config(Path::new("schemalog.yaml")).expect("config should load");
            assert_eq!(config.logging.level, "warn");
            assert_eq!(config.logging.pool_size, 2);
            assert_eq!(
                config.logging.schema,
                Some(SchemaConfig::Declaration(
                    "field1: string, field2: integer".to_string()
                ))
            );
            Ok(())
        });
    }

    #[test]
    fn schema_may_be_a_field_map() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "schemalog.yaml",
                r#"
logging:
  schema:
    field1: string
    field2: integer
"#,
            )?;

            let config = load_config(Path::new("schemalog.yaml")).expect("config should load");
            let schema = config.logging.schema.unwrap().to_schema().unwrap();
            assert_eq!(schema.fields().len(), 2);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("schemalog.yaml", "logging:\n  pool_size: 1\n")?;
            jail.set_env("SCHEMALOG_LOGGING__POOL_SIZE", "4");
            jail.set_env("SCHEMALOG_LOGGING__LOGFILE", "from-env.log");

            let config = load_config(Path::new("schemalog.yaml")).expect("config should load");
            assert_eq!(config.logging.pool_size, 4);
            assert_eq!(
                config.logging.logfile.as_deref(),
                Some(Path::new("from-env.log"))
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_gives_defaults() {
        Jail::expect_with(|_jail| {
            let config = load_config(Path::new("absent.yaml")).expect("config should load");
            assert_eq!(config, ConfigV1::default());
            Ok(())
        });
    }

    #[test]
    fn negative_pool_size_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("schemalog.yaml", "logging:\n  pool_size: -1\n")?;
            assert!(matches!(
                load_config(Path::new("schemalog.yaml")),
                Err(SetupError::Config(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn unknown_version_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("schemalog.yaml", "version: \"0.9.0\"\n")?;
            assert!(load_config(Path::new("schemalog.yaml")).is_err());
            Ok(())
        });
    }
}
