//! Loader for Vigil configuration with YAML + environment overlays.
//!
//! Sources are merged in order: YAML file(s) or inline snippets, then
//! `VIGIL__`-prefixed environment variables (`VIGIL__BOT__ONEBOT__API`, `__` as
//! the path separator). String values may reference `${VAR}`; references are
//! expanded recursively after the merge. The result is an immutable
//! [`VigilConfig`] snapshot handed to the crawler and bot constructors.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub crawler: CrawlerConfig,
    pub proxy: ProxyConfig,
    pub bot: BotConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub x: XConfig,
}

/// Knobs for the X (Twitter) acquisition tiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XConfig {
    /// Handles to monitor when no accounts file is usable.
    pub accounts: Vec<String>,
    /// JSON file of `[{"username": "..."}]`; wins over `accounts` when non-empty.
    pub accounts_file: Option<PathBuf>,
    pub bearer_token: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub delegated: DelegatedConfig,
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            accounts_file: Some(PathBuf::from("x-kit/dev-accounts.json")),
            bearer_token: None,
            api_key: None,
            api_secret: None,
            delegated: DelegatedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelegatedConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for DelegatedConfig {
    fn default() -> Self {
        Self {
            program: "bun".into(),
            args: vec!["run".into(), "scripts/crawl-user.ts".into()],
            working_dir: Some(PathBuf::from("x-kit")),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub crawler_proxy_enabled: bool,
    pub proxy_url: Option<String>,
}

impl ProxyConfig {
    /// The proxy URL to use for crawling, if proxying is switched on and a URL is set.
    pub fn crawler_proxy(&self) -> Option<&str> {
        if !self.crawler_proxy_enabled {
            return None;
        }
        non_empty(&self.proxy_url)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub onebot: OneBotConfig,
}

/// OneBot HTTP delivery settings. Ids of `0` count as "not configured".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OneBotConfig {
    pub api: String,
    pub access_token: Option<String>,
    pub group_id: Option<i64>,
    pub user_id: Option<i64>,
    pub timeout_secs: u64,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            api: String::new(),
            access_token: None,
            group_id: None,
            user_id: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `text` or `json`.
    pub format: String,
    pub dir: Option<PathBuf>,
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".into(),
            dir: None,
            stderr: true,
        }
    }
}

/// Treat `None`, `""` and whitespace-only strings alike.
pub fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    username: String,
}

impl XConfig {
    /// Resolve the monitored handles: the accounts file when it yields any, else `accounts`.
    pub fn roster(&self) -> Vec<String> {
        if let Some(path) = &self.accounts_file {
            match read_accounts_file(path) {
                Ok(users) if !users.is_empty() => {
                    tracing::debug!(path=%path.display(), count=users.len(), "config.roster.file");
                    return users;
                }
                Ok(_) => {
                    tracing::debug!(path=%path.display(), "config.roster.file_empty");
                }
                Err(e) => {
                    tracing::debug!(path=%path.display(), error=%e, "config.roster.file_unusable");
                }
            }
        }
        self.accounts
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect()
    }
}

fn read_accounts_file(path: &Path) -> Result<Vec<String>, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let entries: Vec<AccountEntry> = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    Ok(entries
        .into_iter()
        .map(|e| e.username.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect())
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct VigilConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for VigilConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl VigilConfigLoader {
    /// Start with `VIGIL__` env overrides only.
    ///
    /// ```
    /// use vigil_config::VigilConfigLoader;
    ///
    /// let cfg = VigilConfigLoader::new()
    ///     .with_yaml_str("bot:\n  onebot:\n    api: 'http://127.0.0.1:3000/'\n    group_id: 42")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(cfg.bot.onebot.api, "http://127.0.0.1:3000/");
    /// assert_eq!(cfg.bot.onebot.group_id, Some(42));
    /// assert_eq!(cfg.bot.onebot.timeout_secs, 10);
    /// ```
    pub fn new() -> Self {
        let builder = Config::builder();
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file) but silently skipped when the file is absent.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    pub fn load(self) -> Result<VigilConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("VIGIL")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("crawler.x.accounts"),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: VigilConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Winston")), ("STATE", Some("NC"))], || {
            let mut v = json!([
                "hello-$CITY",
                { "loc": "${CITY}-${STATE}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Winston", { "loc": "Winston-NC" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn proxy_requires_toggle_and_url() {
        let mut p = ProxyConfig {
            crawler_proxy_enabled: false,
            proxy_url: Some("http://127.0.0.1:7890".into()),
        };
        assert_eq!(p.crawler_proxy(), None);
        p.crawler_proxy_enabled = true;
        assert_eq!(p.crawler_proxy(), Some("http://127.0.0.1:7890"));
        p.proxy_url = Some("  ".into());
        assert_eq!(p.crawler_proxy(), None);
    }

    #[test]
    fn roster_falls_back_to_inline_accounts() {
        let x = XConfig {
            accounts: vec!["alice".into(), " ".into(), "bob".into()],
            accounts_file: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        assert_eq!(x.roster(), vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn empty_config_has_defaults() {
        let cfg = VigilConfigLoader::new().with_yaml_str("{}").load().unwrap();
        assert_eq!(cfg.crawler.x.delegated.program, "bun");
        assert!(cfg.crawler.x.accounts.is_empty());
        assert_eq!(
            cfg.crawler.x.accounts_file.as_deref(),
            Some(Path::new("x-kit/dev-accounts.json"))
        );
        assert_eq!(cfg.logging.format, "text");
    }
}
