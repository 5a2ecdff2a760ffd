use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use dirs::config_dir;
use log::LevelFilter;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::{
    columns::{ColumnKey, DEFAULT_VISIBLE},
    sort::{SortDirection, SortKey, SortSpec},
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub webui: WebUiConfig,
    pub ui: UiConfig,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WebUiConfig {
    pub url: Option<String>,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub verify_ssl: bool,
    pub user_agent: String,
}

impl Default for WebUiConfig {
    fn default() -> Self {
        Self {
            url: None,
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            username: None,
            password: None,
            timeout: Duration::from_secs(10),
            verify_ssl: true,
            user_agent: "qbit-tui".to_string(),
        }
    }
}

impl WebUiConfig {
    /// Root of the WebUI without a trailing slash.
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.trim_end_matches('/').to_string();
        }
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Settings the dashboard core reads; fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct UiConfig {
    pub poll_interval: Duration,
    pub ui_refresh_interval: Duration,
    pub refresh_delay: Duration,
    pub sort: SortSpec,
    pub columns: Vec<ColumnKey>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            ui_refresh_interval: Duration::from_millis(250),
            refresh_delay: Duration::from_millis(750),
            sort: SortSpec::default(),
            columns: DEFAULT_VISIBLE.to_vec(),
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "qBittorrent WebUI terminal dashboard", long_about = None)]
pub struct Cli {
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub timeout: Option<f64>,
    #[arg(long)]
    pub poll_interval: Option<f64>,
    #[arg(long)]
    pub refresh_delay: Option<f64>,
    /// Sort column, optionally with a direction: `size:desc`.
    #[arg(long)]
    pub sort: Option<String>,
    /// Comma separated list of visible columns.
    #[arg(long)]
    pub columns: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    pub tls: bool,
    #[arg(long = "no-tls", action = ArgAction::SetTrue)]
    pub no_tls: bool,
    #[arg(long)]
    pub insecure: bool,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    webui: Option<FileWebUiConfig>,
    ui: Option<FileUiConfig>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileWebUiConfig {
    url: Option<String>,
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<f64>,
    tls: Option<bool>,
    verify_ssl: Option<bool>,
    user_agent: Option<String>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
struct FileUiConfig {
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    #[serde(default)]
    poll_interval: Option<Duration>,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    #[serde(default)]
    ui_refresh_interval: Option<Duration>,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    #[serde(default)]
    refresh_delay: Option<Duration>,
    sort_column: Option<SortKey>,
    sort_direction: Option<SortDirection>,
    secondary_sort: Option<SortKey>,
    columns: Option<Vec<ColumnKey>>,
}

pub fn build_config(cli: &Cli) -> Result<AppConfig> {
    let file_config = load_file_config(cli.config.as_deref())?;
    resolve(cli, &|name| env::var(name).ok(), file_config.unwrap_or_default())
}

/// Merges flags, environment and file settings, in that order of precedence.
fn resolve(cli: &Cli, env: &dyn Fn(&str) -> Option<String>, file: FileConfig) -> Result<AppConfig> {
    let webui_file = file.webui.unwrap_or_default();
    let ui_file = file.ui.unwrap_or_default();
    let defaults = WebUiConfig::default();

    let url = cli
        .url
        .clone()
        .or_else(|| env("QBT_URL"))
        .or(webui_file.url);

    let host = cli
        .host
        .clone()
        .or_else(|| env("QBT_HOST"))
        .or(webui_file.host)
        .unwrap_or(defaults.host);

    let port = cli
        .port
        .or_else(|| parse_env(env, "QBT_PORT"))
        .or(webui_file.port)
        .unwrap_or(defaults.port);

    let username = cli
        .username
        .clone()
        .or_else(|| env("QBT_USERNAME"))
        .or(webui_file.username);

    let password = cli
        .password
        .clone()
        .or_else(|| env("QBT_PASSWORD"))
        .or(webui_file.password);

    let timeout_secs = cli
        .timeout
        .or_else(|| parse_env(env, "QBT_TIMEOUT"))
        .or(webui_file.timeout)
        .unwrap_or(defaults.timeout.as_secs_f64());
    if timeout_secs <= 0.0 {
        bail!("timeout must be positive");
    }

    let tls_flag = if cli.tls {
        Some(true)
    } else if cli.no_tls {
        Some(false)
    } else {
        None
    };
    let use_tls = tls_flag
        .or_else(|| env_bool(env, "QBT_TLS"))
        .or(webui_file.tls)
        .unwrap_or(false);

    let mut verify_ssl = webui_file.verify_ssl.unwrap_or(true);
    if let Some(value) = env_bool(env, "QBT_VERIFY_SSL") {
        verify_ssl = value;
    }
    if cli.insecure {
        verify_ssl = false;
    }

    let scheme = webui_file
        .scheme
        .unwrap_or_else(|| if use_tls { "https" } else { "http" }.to_string());

    let user_agent = env("QBT_USER_AGENT")
        .or(webui_file.user_agent)
        .unwrap_or(defaults.user_agent);

    let ui_defaults = UiConfig::default();
    let poll_interval = match cli.poll_interval.or_else(|| parse_env(env, "QBT_POLL_INTERVAL")) {
        Some(secs) => seconds("poll interval", secs)?,
        None => ui_file.poll_interval.unwrap_or(ui_defaults.poll_interval),
    };
    if poll_interval.is_zero() {
        bail!("poll interval must be positive");
    }
    let refresh_delay = match cli.refresh_delay.or_else(|| parse_env(env, "QBT_REFRESH_DELAY")) {
        Some(secs) => seconds("refresh delay", secs)?,
        None => ui_file.refresh_delay.unwrap_or(ui_defaults.refresh_delay),
    };
    let ui_refresh_interval = ui_file
        .ui_refresh_interval
        .unwrap_or(ui_defaults.ui_refresh_interval);
    if ui_refresh_interval.is_zero() {
        bail!("ui refresh interval must be positive");
    }

    let mut sort = SortSpec {
        key: ui_file.sort_column.unwrap_or(ui_defaults.sort.key),
        direction: ui_file.sort_direction.unwrap_or(ui_defaults.sort.direction),
        secondary: ui_file.secondary_sort,
    };
    if let Some(raw) = cli.sort.clone().or_else(|| env("QBT_SORT")) {
        let (key, direction) = parse_sort(&raw)?;
        sort.key = key;
        sort.direction = direction.unwrap_or(SortDirection::Ascending);
    }

    let columns = match cli.columns.clone().or_else(|| env("QBT_COLUMNS")) {
        Some(raw) => parse_columns(&raw)?,
        None => ui_file.columns.unwrap_or(ui_defaults.columns),
    };

    let log_level_str = cli
        .log_level
        .clone()
        .or_else(|| env("QBT_LOG_LEVEL"))
        .or(file.log_level)
        .unwrap_or_else(|| "warn".to_string());
    let log_level = LevelFilter::from_str(&log_level_str).unwrap_or(LevelFilter::Warn);

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| env("QBT_LOG_FILE").map(PathBuf::from))
        .or(file.log_file);

    Ok(AppConfig {
        webui: WebUiConfig {
            url,
            scheme,
            host,
            port,
            username,
            password,
            timeout: Duration::from_secs_f64(timeout_secs),
            verify_ssl,
            user_agent,
        },
        ui: UiConfig {
            poll_interval,
            ui_refresh_interval,
            refresh_delay,
            sort,
            columns,
        },
        log_level,
        log_file,
    })
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        bail!("{name} cannot be negative");
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Parses `column` or `column:direction`.
pub fn parse_sort(raw: &str) -> Result<(SortKey, Option<SortDirection>)> {
    let (column, direction) = match raw.split_once(':') {
        Some((column, direction)) => (column, Some(direction)),
        None => (raw, None),
    };
    let key = SortKey::from_str(column).map_err(anyhow::Error::msg)?;
    let direction = direction
        .map(SortDirection::from_str)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    Ok((key, direction))
}

pub fn parse_columns(raw: &str) -> Result<Vec<ColumnKey>> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            ColumnKey::from_str(name)
                .map_err(anyhow::Error::msg)
                .context("invalid --columns value")
        })
        .collect()
}

fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = path {
        return read_file_config(path);
    }

    if let Ok(env_path) = env::var("QBT_TUI_CONFIG") {
        return read_file_config(Path::new(&env_path));
    }

    if let Some(dir) = config_dir() {
        let modern_path = dir.join("qbit-tui").join("config.toml");
        if let Some(cfg) = read_file_config(&modern_path)? {
            return Ok(Some(cfg));
        }

        let legacy_path = dir.join("qbit-tui.toml");
        return read_file_config(&legacy_path);
    }

    Ok(None)
}

fn read_file_config(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let parsed = parse_file_config(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some(parsed))
}

fn parse_file_config(contents: &str) -> Result<FileConfig> {
    Ok(toml::from_str(contents)?)
}

fn parse_env<T>(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: FromStr,
{
    env(name).and_then(|value| value.parse().ok())
}

fn env_bool(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    env(name).and_then(|value| match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}
