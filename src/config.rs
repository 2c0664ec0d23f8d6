use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::store::{self, BackupPolicy};

pub const ENV_ENVIRONMENT: &str = "TICK_TOCK_ENV";
pub const ENV_DATA_FILE: &str = "TICK_TOCK_DATA_FILE";
pub const ENV_DEBUG: &str = "TICK_TOCK_DEBUG";
pub const ENV_AUTO_SAVE: &str = "TICK_TOCK_AUTO_SAVE";
pub const ENV_CONFIG_FILE: &str = "TICK_TOCK_CONFIG";

const APP_DIR: &str = "tick-tock";

/// Deployment mode selecting the data file and display settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Development,
        Environment::Production,
        Environment::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown environment '{0}' (expected development, production or test)")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}

/// Contents of config.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub data_files: DataFiles,
    #[serde(default)]
    pub environment_display: EnvironmentDisplays,
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval: u64,
    #[serde(default = "default_backup_enabled")]
    pub backup_enabled: bool,
    #[serde(default = "default_backup_directory")]
    pub backup_directory: String,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    #[serde(default)]
    pub debug_mode: bool,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            data_files: DataFiles::default(),
            environment_display: EnvironmentDisplays::default(),
            auto_save_interval: default_auto_save_interval(),
            backup_enabled: default_backup_enabled(),
            backup_directory: default_backup_directory(),
            max_backups: default_max_backups(),
            debug_mode: false,
        }
    }
}

fn default_environment() -> String {
    Environment::Production.as_str().to_string()
}

fn default_auto_save_interval() -> u64 {
    30
}

fn default_backup_enabled() -> bool {
    true
}

fn default_backup_directory() -> String {
    "backups".to_string()
}

fn default_max_backups() -> usize {
    10
}

/// Data file path per environment. Relative paths resolve against the user
/// data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFiles {
    #[serde(default = "default_development_file")]
    pub development: String,
    #[serde(default = "default_production_file")]
    pub production: String,
    #[serde(default = "default_test_file")]
    pub test: String,
}

impl Default for DataFiles {
    fn default() -> Self {
        Self {
            development: default_development_file(),
            production: default_production_file(),
            test: default_test_file(),
        }
    }
}

impl DataFiles {
    pub fn get(&self, environment: Environment) -> &str {
        match environment {
            Environment::Development => &self.development,
            Environment::Production => &self.production,
            Environment::Test => &self.test,
        }
    }
}

fn default_development_file() -> String {
    "tick_tock_projects_dev.json".to_string()
}

fn default_production_file() -> String {
    "tick_tock_projects.json".to_string()
}

fn default_test_file() -> String {
    "tick_tock_projects_test.json".to_string()
}

/// Window title and colors shown for an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default = "default_window_title")]
    pub window_title: String,
    #[serde(default = "default_title_color")]
    pub title_color: String,
    #[serde(default = "default_border_color")]
    pub border_color: String,
}

impl DisplaySettings {
    fn new(window_title: &str, title_color: &str, border_color: &str) -> Self {
        Self {
            window_title: window_title.to_string(),
            title_color: title_color.to_string(),
            border_color: border_color.to_string(),
        }
    }

    fn development() -> Self {
        Self::new("Tick-Tock Widget [DEV]", "#00FF00", "#004400")
    }

    fn production() -> Self {
        Self::new("Tick-Tock Widget", "#FFFFFF", "#444444")
    }

    fn test() -> Self {
        Self::new("Tick-Tock Widget [TEST]", "#FFFF00", "#444400")
    }
}

fn default_window_title() -> String {
    "Tick-Tock Widget".to_string()
}

fn default_title_color() -> String {
    "#FFFFFF".to_string()
}

fn default_border_color() -> String {
    "#444444".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDisplays {
    #[serde(default = "DisplaySettings::development")]
    pub development: DisplaySettings,
    #[serde(default = "DisplaySettings::production")]
    pub production: DisplaySettings,
    #[serde(default = "DisplaySettings::test")]
    pub test: DisplaySettings,
}

impl Default for EnvironmentDisplays {
    fn default() -> Self {
        Self {
            development: DisplaySettings::development(),
            production: DisplaySettings::production(),
            test: DisplaySettings::test(),
        }
    }
}

impl EnvironmentDisplays {
    pub fn get(&self, environment: Environment) -> &DisplaySettings {
        match environment {
            Environment::Development => &self.development,
            Environment::Production => &self.production,
            Environment::Test => &self.test,
        }
    }
}

/// Raw values of the environment variables that override the config file.
/// Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub environment: Option<String>,
    pub data_file: Option<String>,
    pub debug_mode: Option<String>,
    pub auto_save_interval: Option<String>,
    pub config_file: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            environment: get(ENV_ENVIRONMENT),
            data_file: get(ENV_DATA_FILE),
            debug_mode: get(ENV_DEBUG),
            auto_save_interval: get(ENV_AUTO_SAVE),
            config_file: get(ENV_CONFIG_FILE),
        }
    }
}

/// Effective configuration: defaults, then config.json, then environment
/// variables.
#[derive(Debug, Clone)]
pub struct Config {
    file: ConfigFile,
    config_path: PathBuf,
    data_root: PathBuf,
    environment: Environment,
    data_file_override: Option<(Environment, String)>,
    auto_save_interval: u64,
    debug_mode: bool,
}

impl Config {
    /// Load from the default locations and the process environment
    pub fn load() -> Self {
        let overrides = EnvOverrides::from_env();
        let config_path = overrides
            .config_file
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(default_config_path);
        Self::from_parts(config_path, default_data_root(), &overrides)
    }

    pub fn from_parts(config_path: PathBuf, data_root: PathBuf, overrides: &EnvOverrides) -> Self {
        let file = read_config_file(&config_path);
        Self::resolve(file, config_path, data_root, overrides)
    }

    fn resolve(
        file: ConfigFile,
        config_path: PathBuf,
        data_root: PathBuf,
        overrides: &EnvOverrides,
    ) -> Self {
        let environment_name = overrides
            .environment
            .as_deref()
            .unwrap_or(&file.environment);
        let environment = environment_name.parse::<Environment>().unwrap_or_else(|err| {
            warn!(%err, "Falling back to development environment");
            Environment::Development
        });

        let debug_mode = overrides
            .debug_mode
            .as_deref()
            .map(parse_flag)
            .unwrap_or(file.debug_mode);

        let auto_save_interval = match overrides.auto_save_interval.as_deref() {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = raw, "Invalid {ENV_AUTO_SAVE} value, keeping configured interval");
                file.auto_save_interval
            }),
            None => file.auto_save_interval,
        };

        let data_file_override = overrides
            .data_file
            .clone()
            .map(|path| (environment, path));

        Self {
            file,
            config_path,
            data_root,
            environment,
            data_file_override,
            auto_save_interval,
            debug_mode,
        }
    }

    pub fn settings(&self) -> &ConfigFile {
        &self.file
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
        self.file.environment = environment.as_str().to_string();
        info!(%environment, "Environment set");
    }

    /// Data file of the active environment
    pub fn data_file(&self) -> PathBuf {
        self.data_file_for(self.environment)
    }

    pub fn data_file_for(&self, environment: Environment) -> PathBuf {
        match &self.data_file_override {
            Some((overridden, path)) if *overridden == environment => self.resolve_path(path),
            _ => self.resolve_path(self.file.data_files.get(environment)),
        }
    }

    pub fn backup_directory(&self) -> PathBuf {
        self.resolve_path(&self.file.backup_directory)
    }

    pub fn is_backup_enabled(&self) -> bool {
        self.file.backup_enabled
    }

    pub fn max_backups(&self) -> usize {
        self.file.max_backups
    }

    /// Backups to keep when overwriting a data file, or `None` when no
    /// backup should be taken at all
    pub fn backup_policy(&self) -> Option<BackupPolicy> {
        (self.is_backup_enabled() && self.max_backups() > 0).then(|| BackupPolicy {
            directory: self.backup_directory(),
            max_backups: self.max_backups(),
        })
    }

    /// Auto-save interval in seconds
    pub fn auto_save_interval(&self) -> u64 {
        self.auto_save_interval
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn log_directory(&self) -> PathBuf {
        self.data_root.join("logs")
    }

    pub fn display(&self, environment: Environment) -> &DisplaySettings {
        self.file.environment_display.get(environment)
    }

    pub fn window_title(&self) -> &str {
        &self.display(self.environment).window_title
    }

    pub fn title_color(&self) -> &str {
        &self.display(self.environment).title_color
    }

    pub fn border_color(&self) -> &str {
        &self.display(self.environment).border_color
    }

    /// Write the config file. Environment variable overrides are not
    /// persisted.
    pub fn save(&self) -> Result<()> {
        write_config_file(&self.config_path, &self.file)?;
        info!(path = %self.config_path.display(), "Configuration saved");
        Ok(())
    }

    /// Copy one environment's data file over another's
    pub fn migrate_data_file(&self, from: Environment, to: Environment) -> bool {
        let source = self.data_file_for(from);
        let target = self.data_file_for(to);
        let policy = self.backup_policy();

        match store::migrate_data_file(&source, &target, policy.as_ref(), Local::now().naive_local()) {
            Ok(()) => {
                info!(%from, %to, "Data migrated");
                true
            }
            Err(err) => {
                error!(%from, %to, %err, "Error migrating data");
                false
            }
        }
    }

    pub fn create_development_copy(&self) -> bool {
        self.migrate_data_file(Environment::Production, Environment::Development)
    }

    pub fn promote_to_production(&self) -> bool {
        self.migrate_data_file(Environment::Development, Environment::Production)
    }

    fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = expand_path(raw);
        if path.is_absolute() {
            path
        } else {
            self.data_root.join(path)
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Get the default config file path (~/.config/tick-tock/config.json)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

/// Get the user data directory (~/.local/share/tick-tock on Linux)
pub fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Read a config file, falling back to defaults when it is missing or
/// unreadable
pub fn read_config_file(path: &Path) -> ConfigFile {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No config file, using defaults");
            return ConfigFile::default();
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "Could not read config file, using defaults");
            return ConfigFile::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %path.display(), %err, "Could not parse config file, using defaults");
            ConfigFile::default()
        }
    }
}

fn write_config_file(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let content =
        serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

/// Create a default config file if none exists yet
pub fn init_config_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        write_config_file(path, &ConfigFile::default())?;
    }
    Ok(path.to_path_buf())
}

/// Expand ~ and environment variables in a path. Unexpandable input is used
/// verbatim.
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(err) => {
            warn!(path, %err, "Failed to expand path, using it verbatim");
            PathBuf::from(path)
        }
    }
}
