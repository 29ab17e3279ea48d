//! Configuration file management for fiesta.
//!
//! Provides a TOML-based config file at `~/.config/fiesta/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use fiesta_core::relay::openai::DEFAULT_MODEL;
use fiesta_db::config::DbConfig;

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

const BOT_TOKEN_VAR: &str = "BOT_TOKEN";
const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
const ASSISTANT_ID_VAR: &str = "ASSISTANT_ID";
const FUNCTION_PROMPTS_VAR: &str = "FIESTA_FUNCTION_PROMPTS";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub openai: OpenAiSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::DEFAULT_URL.to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_owned(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TelegramSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OpenAiSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// JSON object mapping function names to canned responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_prompts: Option<PathBuf>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the fiesta config directory: `$XDG_CONFIG_HOME/fiesta` or
/// `~/.config/fiesta`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fiesta");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fiesta")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file at `path`. A missing file is `Ok(None)`; a file
/// that does not parse is an error.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file to `path`, creating parent dirs as
/// needed. The file is readable by the owner only on Unix.
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Show the first and last few characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct FiestaConfig {
    pub db_config: DbConfig,
    pub bind: String,
    pub port: u16,
    pub bot_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub model: String,
    pub function_prompts: PathBuf,
}

impl FiestaConfig {
    /// Resolve against the real environment and the config file at
    /// [`config_path`].
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file = load_config_from(&config_path())?;
        Ok(Self::resolve_with(cli_db_url, file.as_ref(), |key| {
            std::env::var(key).ok()
        }))
    }

    /// Resolve each value as CLI flag > env var > config file > default.
    /// Empty environment values count as unset.
    pub fn resolve_with(
        cli_db_url: Option<&str>,
        file: Option<&ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let var = |key: &str| env(key).filter(|v| !v.is_empty());

        let db_url = cli_db_url
            .map(str::to_owned)
            .or_else(|| var(DbConfig::ENV_VAR))
            .or_else(|| file.map(|f| f.database.url.clone()))
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_owned());

        let (bind, port) = match file {
            Some(f) => (f.server.bind.clone(), f.server.port),
            None => (DEFAULT_BIND.to_owned(), DEFAULT_PORT),
        };

        let openai = file.map(|f| &f.openai);

        Self {
            db_config: DbConfig::new(db_url),
            bind,
            port,
            bot_token: var(BOT_TOKEN_VAR)
                .or_else(|| file.and_then(|f| f.telegram.bot_token.clone())),
            openai_api_key: var(OPENAI_API_KEY_VAR)
                .or_else(|| openai.and_then(|o| o.api_key.clone())),
            assistant_id: var(ASSISTANT_ID_VAR)
                .or_else(|| openai.and_then(|o| o.assistant_id.clone())),
            model: openai
                .and_then(|o| o.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            function_prompts: var(FUNCTION_PROMPTS_VAR)
                .map(PathBuf::from)
                .or_else(|| openai.and_then(|o| o.function_prompts.clone()))
                .unwrap_or_else(|| config_dir().join("function_prompts.json")),
        }
    }

    pub fn require_bot_token(&self) -> Result<&str> {
        match self.bot_token.as_deref() {
            Some(token) => Ok(token),
            None => bail!(
                "telegram bot token not found; set {BOT_TOKEN_VAR} or add [telegram] bot_token to {}",
                config_path().display()
            ),
        }
    }

    pub fn require_openai_api_key(&self) -> Result<&str> {
        match self.openai_api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!(
                "OpenAI API key not found; set {OPENAI_API_KEY_VAR} or add [openai] api_key to {}",
                config_path().display()
            ),
        }
    }

    pub fn require_assistant_id(&self) -> Result<&str> {
        match self.assistant_id.as_deref() {
            Some(id) => Ok(id),
            None => bail!(
                "assistant id not found; set {ASSISTANT_ID_VAR}, add [openai] assistant_id to {}, \
                 or create one with `fiesta assistant create`",
                config_path().display()
            ),
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_file() -> ConfigFile {
        toml::from_str(
            r#"
            [database]
            url = "postgresql://file:5432/filedb"

            [server]
            bind = "0.0.0.0"
            port = 9000

            [telegram]
            bot_token = "file-bot-token"

            [openai]
            api_key = "sk-file"
            assistant_id = "asst_file"
            model = "gpt-4o-mini"
            function_prompts = "/etc/fiesta/prompts.json"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fiesta").join("config.toml");

        let mut original = ConfigFile::default();
        original.database.url = "postgresql://testhost:5432/testdb".to_owned();
        original.telegram.bot_token = Some("123:abc".to_owned());

        save_config_to(&original, &path).unwrap();
        let loaded = load_config_from(&path).unwrap().expect("file was written");

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(loaded.server.port, DEFAULT_PORT);
        assert!(loaded.openai.api_key.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&ConfigFile::default(), &path).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(load_config_from(&tmp.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[database\nurl = ").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let file: ConfigFile = toml::from_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(file.server.port, 8080);
        assert_eq!(file.server.bind, DEFAULT_BIND);
        assert_eq!(file.database.url, DbConfig::DEFAULT_URL);
    }

    #[test]
    fn cli_flag_overrides_env_and_file() {
        let file = full_file();
        let env = env_of(&[(DbConfig::ENV_VAR, "postgresql://env:5432/envdb")]);

        let config =
            FiestaConfig::resolve_with(Some("postgresql://cli:5432/clidb"), Some(&file), env);
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
    }

    #[test]
    fn env_overrides_file() {
        let file = full_file();
        let env = env_of(&[
            (DbConfig::ENV_VAR, "postgresql://env:5432/envdb"),
            (BOT_TOKEN_VAR, "env-bot-token"),
            (OPENAI_API_KEY_VAR, "sk-env"),
            (ASSISTANT_ID_VAR, "asst_env"),
            (FUNCTION_PROMPTS_VAR, "/tmp/prompts.json"),
        ]);

        let config = FiestaConfig::resolve_with(None, Some(&file), env);
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.bot_token.as_deref(), Some("env-bot-token"));
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.assistant_id.as_deref(), Some("asst_env"));
        assert_eq!(config.function_prompts, PathBuf::from("/tmp/prompts.json"));
    }

    #[test]
    fn file_values_used_when_env_empty() {
        let file = full_file();
        let env = env_of(&[(BOT_TOKEN_VAR, "")]);

        let config = FiestaConfig::resolve_with(None, Some(&file), env);
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!((config.bind.as_str(), config.port), ("0.0.0.0", 9000));
        assert_eq!(config.bot_token.as_deref(), Some("file-bot-token"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(
            config.function_prompts,
            PathBuf::from("/etc/fiesta/prompts.json")
        );
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = FiestaConfig::resolve_with(None, None, env_of(&[]));
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!((config.bind.as_str(), config.port), (DEFAULT_BIND, DEFAULT_PORT));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.function_prompts.ends_with("fiesta/function_prompts.json"));

        let err = config.require_bot_token().unwrap_err();
        assert!(err.to_string().contains("telegram bot token not found"));
        assert!(config.require_openai_api_key().is_err());
        assert!(config.require_assistant_id().is_err());
    }

    #[test]
    fn resolve_reads_process_environment() {
        let _lock = crate::test_util::lock_env();

        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        unsafe { std::env::set_var(DbConfig::ENV_VAR, "postgresql://env:5432/envdb") };

        let result = FiestaConfig::resolve(None);

        unsafe { std::env::remove_var(DbConfig::ENV_VAR) };
        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let config = result.unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
    }

    #[test]
    fn mask_secret_hides_middle() {
        assert_eq!(mask_secret("sk-abcdefghijklmnop"), "sk-a...mnop");
        assert_eq!(mask_secret("short"), "*****");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("fiesta/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
