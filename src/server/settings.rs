use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::env;

/// Environment variables that select the configuration files themselves and
/// are therefore not treated as setting overrides.
const CONFIG_DIR_VAR: &str = "IMGTAR_CONFIG_DIR";
const RUN_MODE_VAR: &str = "IMGTAR_CONFIG_RUN_MODE";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub docker: DockerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix the service is mounted under, e.g. "/imgtar".
    /// Empty serves everything from the root.
    #[serde(default)]
    pub base_url: String,

    /// Maximum accepted request body size in bytes (multipart uploads)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: String::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerSettings {
    /// Base URL without a trailing slash, with a leading one unless empty.
    pub fn base_path(&self) -> String {
        let trimmed = self.base_url.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    512 * 1024
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DockerSettings {
    /// Unix socket of the Docker daemon. Falls back to `DOCKER_HOST` and the
    /// platform default when unset.
    #[serde(default)]
    pub socket: Option<String>,
}

impl Settings {
    /// Substitute environment variables in a string value
    /// Replaces ${VAR_NAME} or ${VAR_NAME:-default} with environment variable values
    fn substitute_env_vars_in_string(s: &str) -> String {
        lazy_static::lazy_static! {
            static ref ENV_VAR_RE: regex::Regex =
                regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
        }

        ENV_VAR_RE
            .replace_all(s, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default_value = caps.get(2).map(|m| m.as_str());

                match env::var(var_name) {
                    Ok(val) => val,
                    Err(_) => default_value.unwrap_or("").to_string(),
                }
            })
            .to_string()
    }

    /// Convert a config::Value to a serde_json::Value, performing environment variable substitution
    fn config_value_to_json(value: &config::Value) -> serde_json::Value {
        use config::ValueKind;

        match &value.kind {
            ValueKind::Nil => serde_json::Value::Null,
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
            ValueKind::I128(i) => serde_json::Value::Number((*i as i64).into()),
            ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
            ValueKind::U128(u) => serde_json::Value::Number((*u as u64).into()),
            ValueKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::String(s) => {
                serde_json::Value::String(Self::substitute_env_vars_in_string(s))
            }
            ValueKind::Table(table) => serde_json::Value::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::config_value_to_json(v)))
                    .collect(),
            ),
            ValueKind::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Self::config_value_to_json).collect())
            }
        }
    }

    /// Add `{config_dir}/{name}.{toml,yaml,yml}` if present.
    /// Returns whether a file was found.
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
    ) -> bool {
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{}/{}.{}", config_dir, name, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading config file: {}", path);
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{}/{}", config_dir, name)));
                return true;
            }
        }

        tracing::debug!(
            "Optional config file not found: {}/{}.{{toml,yaml,yml}}",
            config_dir,
            name
        );
        false
    }

    /// Load settings from `IMGTAR_CONFIG_DIR` (default `config`) for the run
    /// mode in `IMGTAR_CONFIG_RUN_MODE` (default `development`), with
    /// `IMGTAR_SECTION__KEY` environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var(RUN_MODE_VAR).unwrap_or_else(|_| "development".into());
        let config_dir = env::var(CONFIG_DIR_VAR).unwrap_or_else(|_| "config".into());
        let overrides = env::vars()
            .filter(|(key, _)| key != CONFIG_DIR_VAR && key != RUN_MODE_VAR)
            .collect();

        Self::load(&config_dir, &run_mode, overrides)
    }

    /// Layer `default`, `{run_mode}` and `local` files from `config_dir`, then
    /// the `IMGTAR_`-prefixed entries of `environment`. Every layer is
    /// optional; missing keys take their built-in defaults.
    pub fn load(
        config_dir: &str,
        run_mode: &str,
        environment: config::Map<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for name in ["default", run_mode, "local"] {
            Self::try_add_config_file(&mut builder, config_dir, name);
        }

        builder = builder.add_source(
            Environment::with_prefix("IMGTAR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(environment)),
        );

        let config = builder.build()?;

        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("Failed to get config table: {}", e)))?;

        let json_value = serde_json::Value::Object(
            root_value
                .iter()
                .map(|(k, v)| (k.clone(), Self::config_value_to_json(v)))
                .collect(),
        );

        let mut unused_fields = Vec::new();
        let settings: Settings = serde_ignored::deserialize(json_value, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            tracing::warn!("Unknown configuration field: {}", field);
        }

        if settings.server.max_upload_bytes == 0 {
            return Err(ConfigError::Message(
                "server.max_upload_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_env() -> config::Map<String, String> {
        config::Map::new()
    }

    #[test]
    fn test_substitute_env_vars_in_string_basic() {
        env::set_var("IMGTAR_TEST_VAR", "test_value");
        let result = Settings::substitute_env_vars_in_string("${IMGTAR_TEST_VAR}");
        assert_eq!(result, "test_value");
        env::remove_var("IMGTAR_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_in_string_with_default() {
        env::remove_var("IMGTAR_MISSING_VAR");
        let result = Settings::substitute_env_vars_in_string("${IMGTAR_MISSING_VAR:-/imgtar}");
        assert_eq!(result, "/imgtar");
    }

    #[test]
    fn test_substitute_env_vars_in_string_no_substitution() {
        assert_eq!(Settings::substitute_env_vars_in_string("plain_value"), "plain_value");
    }

    #[test]
    fn test_defaults_without_config_files() {
        let temp_dir = TempDir::new().unwrap();

        let settings =
            Settings::load(temp_dir.path().to_str().unwrap(), "development", no_env()).unwrap();

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.base_url, "");
        assert_eq!(settings.server.max_upload_bytes, 512 * 1024);
        assert!(settings.docker.socket.is_none());
    }

    #[test]
    fn test_layered_files_and_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("default.toml"),
            "[server]\nport = 3000\nbase_url = \"/imgtar\"\n",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("production.yaml"),
            "server:\n  port: 4000\ndocker:\n  socket: /run/docker.sock\n",
        )
        .unwrap();

        let mut environment = no_env();
        environment.insert("IMGTAR_SERVER__HOST".into(), "127.0.0.1".into());
        environment.insert("IMGTAR_SERVER__MAX_UPLOAD_BYTES".into(), "1024".into());
        environment.insert("UNRELATED".into(), "ignored".into());

        let settings =
            Settings::load(temp_dir.path().to_str().unwrap(), "production", environment).unwrap();

        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.base_url, "/imgtar");
        assert_eq!(settings.server.max_upload_bytes, 1024);
        assert_eq!(settings.docker.socket.as_deref(), Some("/run/docker.sock"));
    }

    #[test]
    fn test_unknown_fields_do_not_fail() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("default.yaml"),
            "server:\n  port: 3000\n  unknown_field: true\nhelm: {}\n",
        )
        .unwrap();

        let result = Settings::load(temp_dir.path().to_str().unwrap(), "development", no_env());

        assert!(
            result.is_ok(),
            "Config should load despite unknown fields: {:?}",
            result.err()
        );
    }

    #[test]
    fn test_zero_upload_limit_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("local.toml"),
            "[server]\nmax_upload_bytes = 0\n",
        )
        .unwrap();

        assert!(Settings::load(temp_dir.path().to_str().unwrap(), "development", no_env()).is_err());
    }

    #[test]
    fn test_base_path() {
        let mut server = ServerSettings::default();
        assert_eq!(server.base_path(), "");
        server.base_url = "/".into();
        assert_eq!(server.base_path(), "");
        server.base_url = "/sub".into();
        assert_eq!(server.base_path(), "/sub");
        server.base_url = "sub/".into();
        assert_eq!(server.base_path(), "/sub");
    }
}
