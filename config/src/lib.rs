//! Configuration loading for Revision Desk.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`Settings::default`])
//! 2. A TOML file: `$REVDESK_CONFIG`, else `./revdesk.toml`, else
//!    `<config dir>/revdesk/config.toml`
//! 3. Environment variables (see [`ENV_OVERRIDES`])
//!
//! String values in the TOML file may reference environment variables as
//! `${NAME}`.
//!
//! ```toml
//! [app]
//! bind = "0.0.0.0:8000"
//! base_url = "https://revisions.example"
//!
//! [paths]
//! data_dir = "/var/lib/revdesk"
//!
//! [llm]
//! provider = "openai"
//! openai_api_key = "${OPENAI_API_KEY}"
//!
//! [notifier]
//! mattermost_webhook_url = "${MATTERMOST_WEBHOOK_URL}"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use revdesk_types::{ApiKey, ExtractorSettings, NotifierSettings, Settings};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "REVDESK_CONFIG";

/// Environment variables read on top of the config file.
pub const ENV_OVERRIDES: &[&str] = &[
    "REVDESK_BIND",
    "REVDESK_BASE_URL",
    "REVDESK_DATA_DIR",
    "REVDESK_STORAGE_DIR",
    "REVDESK_OUTPUT_DIR",
    "REVDESK_LLM_PROVIDER",
    "OPENAI_API_KEY",
    "REVDESK_OPENAI_MODEL",
    "MATTERMOST_WEBHOOK_URL",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("max_upload_mb must be between 1 and 1024 (got {0})")]
    UploadLimit(u64),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    app: Option<RawApp>,
    paths: Option<RawPaths>,
    llm: Option<RawLlm>,
    notifier: Option<RawNotifier>,
}

#[derive(Debug, Default, Deserialize)]
struct RawApp {
    name: Option<String>,
    bind: Option<String>,
    base_url: Option<String>,
    max_upload_mb: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPaths {
    data_dir: Option<String>,
    storage_dir: Option<String>,
    output_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLlm {
    provider: Option<String>,
    openai_api_key: Option<String>,
    openai_model: Option<String>,
    openai_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNotifier {
    mattermost_webhook_url: Option<String>,
}

/// Load settings from the default locations and the process environment.
pub fn load() -> Result<Settings, ConfigError> {
    let env = |name: &str| std::env::var(name).ok();
    let path = resolve_config_path(&env)?;
    load_with(path.as_deref(), &env)
}

/// Load settings from an optional file with a custom environment lookup.
///
/// `None` means "no file": defaults plus environment overrides.
pub fn load_with(
    path: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let raw = match path {
        Some(path) => read_raw(path)?,
        None => RawConfig::default(),
    };
    resolve(raw, env)
}

/// Parse settings from TOML text (no file IO).
pub fn parse_str(
    content: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let raw: RawConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    resolve(raw, env)
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_config_path(
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(explicit) = env(CONFIG_ENV).filter(|v| !v.trim().is_empty()) {
        let path = PathBuf::from(explicit.trim());
        if !path.exists() {
            return Err(ConfigError::Missing { path });
        }
        return Ok(Some(path));
    }

    let local = PathBuf::from("revdesk.toml");
    if local.exists() {
        return Ok(Some(local));
    }

    Ok(config_path().filter(|p| p.exists()))
}

/// Per-user config location, whether or not it exists.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("revdesk").join("config.toml"))
}

/// Expand `${NAME}` references using `env`. Unknown variables expand to "".
pub fn expand_env_vars(value: &str, env: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn resolve(raw: RawConfig, env: &dyn Fn(&str) -> Option<String>) -> Result<Settings, ConfigError> {
    let defaults = Settings::default();
    let expand = |value: Option<String>| value.map(|v| expand_env_vars(&v, env));
    let env_value = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let app = raw.app.unwrap_or_default();
    let paths = raw.paths.unwrap_or_default();
    let llm = raw.llm.unwrap_or_default();
    let notifier = raw.notifier.unwrap_or_default();

    let max_upload_bytes = match app.max_upload_mb {
        Some(mb) if (1..=1024).contains(&mb) => (mb as usize) * 1024 * 1024,
        Some(mb) => return Err(ConfigError::UploadLimit(mb)),
        None => defaults.max_upload_bytes,
    };

    let path_setting = |env_name: &str, file: Option<String>, default: PathBuf| {
        env_value(env_name)
            .or_else(|| expand(file))
            .map_or(default, PathBuf::from)
    };

    let provider = env_value("REVDESK_LLM_PROVIDER")
        .or_else(|| expand(llm.provider))
        .unwrap_or_else(|| "mock".to_string());
    let api_key = env_value("OPENAI_API_KEY")
        .or_else(|| expand(llm.openai_api_key))
        .and_then(ApiKey::new);
    let model = env_value("REVDESK_OPENAI_MODEL")
        .or_else(|| expand(llm.openai_model))
        .unwrap_or_else(|| ExtractorSettings::DEFAULT_OPENAI_MODEL.to_string());
    let endpoint = expand(llm.openai_endpoint)
        .unwrap_or_else(|| ExtractorSettings::DEFAULT_OPENAI_ENDPOINT.to_string());
    let extractor = resolve_extractor(&provider, api_key, model, endpoint);

    let webhook = env_value("MATTERMOST_WEBHOOK_URL")
        .or_else(|| expand(notifier.mattermost_webhook_url))
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());
    let notifier = match webhook {
        Some(url) => NotifierSettings::Webhook { url },
        None => NotifierSettings::Disabled,
    };

    Ok(Settings {
        app_name: expand(app.name).unwrap_or(defaults.app_name),
        bind: env_value("REVDESK_BIND")
            .or_else(|| expand(app.bind))
            .unwrap_or(defaults.bind),
        base_url: env_value("REVDESK_BASE_URL")
            .or_else(|| expand(app.base_url))
            .unwrap_or(defaults.base_url),
        data_dir: path_setting("REVDESK_DATA_DIR", paths.data_dir, defaults.data_dir),
        storage_dir: path_setting("REVDESK_STORAGE_DIR", paths.storage_dir, defaults.storage_dir),
        output_dir: path_setting("REVDESK_OUTPUT_DIR", paths.output_dir, defaults.output_dir),
        max_upload_bytes,
        extractor,
        notifier,
    })
}

fn resolve_extractor(
    provider: &str,
    api_key: Option<ApiKey>,
    model: String,
    endpoint: String,
) -> ExtractorSettings {
    match provider.trim().to_ascii_lowercase().as_str() {
        "mock" | "rules" | "" => ExtractorSettings::Rules,
        "openai" => match api_key {
            Some(api_key) => ExtractorSettings::OpenAI {
                api_key,
                model,
                endpoint,
            },
            None => {
                tracing::warn!("llm.provider is openai but no API key is set; using rules");
                ExtractorSettings::Rules
            }
        },
        other => {
            tracing::warn!("Unknown llm provider in config: {}", other);
            ExtractorSettings::Rules
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use revdesk_types::{ExtractorSettings, NotifierSettings, Settings};

    use super::{ConfigError, expand_env_vars, load_with, parse_str};

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let settings = load_with(None, &env_of(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn expands_env_references() {
        let env = env_of(&[("HOME_DIR", "/srv")]);
        assert_eq!(expand_env_vars("${HOME_DIR}/data", &env), "/srv/data");
        assert_eq!(expand_env_vars("x${MISSING}y", &env), "xy");
        assert_eq!(expand_env_vars("open ${brace", &env), "open ${brace");
        assert_eq!(expand_env_vars("çğ${HOME_DIR}ş", &env), "çğ/srvş");
    }

    #[test]
    fn file_values_are_resolved() {
        let toml = r#"
            [app]
            bind = "0.0.0.0:9000"
            max_upload_mb = 5

            [paths]
            data_dir = "${ROOT}/data"

            [llm]
            provider = "openai"
            openai_api_key = "${KEY}"

            [notifier]
            mattermost_webhook_url = "https://chat.example/hooks/abc"
        "#;
        let settings = parse_str(toml, &env_of(&[("ROOT", "/srv"), ("KEY", "sk-1")])).unwrap();

        assert_eq!(settings.bind, "0.0.0.0:9000");
        assert_eq!(settings.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.data_dir, PathBuf::from("/srv/data"));
        match settings.extractor {
            ExtractorSettings::OpenAI { api_key, model, .. } => {
                assert_eq!(api_key.as_str(), "sk-1");
                assert_eq!(model, ExtractorSettings::DEFAULT_OPENAI_MODEL);
            }
            other @ ExtractorSettings::Rules => panic!("expected openai, got {other:?}"),
        }
        assert_eq!(
            settings.notifier,
            NotifierSettings::Webhook {
                url: "https://chat.example/hooks/abc".into()
            }
        );
    }

    #[test]
    fn environment_beats_file() {
        let toml = r#"
            [app]
            bind = "0.0.0.0:9000"
            [llm]
            provider = "mock"
        "#;
        let env = env_of(&[
            ("REVDESK_BIND", "127.0.0.1:7000"),
            ("REVDESK_LLM_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-env"),
        ]);
        let settings = parse_str(toml, &env).unwrap();
        assert_eq!(settings.bind, "127.0.0.1:7000");
        assert_eq!(settings.extractor.label(), "openai");
    }

    #[test]
    fn openai_without_key_falls_back_to_rules() {
        let settings = parse_str("[llm]\nprovider = \"openai\"\n", &env_of(&[])).unwrap();
        assert_eq!(settings.extractor, ExtractorSettings::Rules);
    }

    #[test]
    fn blank_webhook_disables_notifier() {
        let env = env_of(&[("MATTERMOST_WEBHOOK_URL", "   ")]);
        let settings = load_with(None, &env).unwrap();
        assert_eq!(settings.notifier, NotifierSettings::Disabled);
    }

    #[test]
    fn upload_limit_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revdesk.toml");
        std::fs::write(&path, "[app]\nmax_upload_mb = 0\n").unwrap();

        let err = load_with(Some(&path), &env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::UploadLimit(0)));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[app\nbind=").unwrap();

        let err = load_with(Some(&path), &env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
