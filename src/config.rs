//! Configuration for hookflow.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (HOOKFLOW_HOME, HOOKFLOW_WORKFLOWS, HOOKFLOW_BIND, HOOKFLOW_PROCESSORS)
//! 2. Config file (.hookflow/config.yaml)
//! 3. Defaults (~/.hookflow)
//!
//! Config file discovery:
//! - Searches current directory and parents for .hookflow/config.yaml
//! - Paths in config file are relative to the project root (the directory holding .hookflow/)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::steps::http::DEFAULT_TIMEOUT_SECONDS;
use crate::steps::HttpSettings;
use crate::worker::LifecycleSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".hookflow";
const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_PROCESSORS: usize = 4;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory
    pub home: Option<String>,
    /// Directory of workflow definition files
    pub workflows: Option<String>,
    /// Run history log
    pub runs_log: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerConfig {
    pub processors: Option<usize>,
    pub record_unknown_workflows: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: Option<f64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine state directory
    pub home: PathBuf,
    /// Workflow definition directory
    pub workflows_dir: PathBuf,
    /// JSONL run log
    pub runs_log: PathBuf,
    /// HTTP listen address
    pub bind: SocketAddr,
    /// Number of background processors
    pub processors: usize,
    /// Write a failed record for jobs naming an unknown workflow
    pub record_unknown_workflows: bool,
    /// Default timeout of outbound http steps
    pub http_timeout: Duration,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: self.http_timeout,
        }
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            record_unknown_workflows: self.record_unknown_workflows,
        }
    }
}

/// Find config file by searching a directory and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Resolve configuration from an env lookup and an optional config file
fn resolve(
    env: impl Fn(&str) -> Option<String>,
    config_file: Option<PathBuf>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    // Project root is the parent of .hookflow/ (i.e., grandparent of config.yaml)
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let home = if let Some(env_home) = env("HOOKFLOW_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = file.paths.home {
        resolve_path(&base_dir, home_path)
    } else {
        default_home
    };

    let workflows_dir = if let Some(env_dir) = env("HOOKFLOW_WORKFLOWS") {
        PathBuf::from(env_dir)
    } else if let Some(ref dir) = file.paths.workflows {
        resolve_path(&base_dir, dir)
    } else {
        home.join("workflows")
    };

    let runs_log = match file.paths.runs_log {
        Some(ref log) => resolve_path(&base_dir, log),
        None => home.join("runs.jsonl"),
    };

    let bind_str = env("HOOKFLOW_BIND")
        .or(file.server.bind)
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let bind: SocketAddr = bind_str
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind_str))?;

    let processors = match env("HOOKFLOW_PROCESSORS") {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("Invalid HOOKFLOW_PROCESSORS: {}", raw))?,
        None => file.worker.processors.unwrap_or(DEFAULT_PROCESSORS),
    };
    if processors == 0 {
        anyhow::bail!("At least one processor is required");
    }

    let http_timeout = match file.http.timeout_seconds {
        Some(secs) if secs > 0.0 && secs.is_finite() => Duration::from_secs_f64(secs),
        Some(secs) => anyhow::bail!("http.timeout_seconds must be positive, got {}", secs),
        None => Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
    };

    Ok(ResolvedConfig {
        home,
        workflows_dir,
        runs_log,
        bind,
        processors,
        record_unknown_workflows: file.worker.record_unknown_workflows.unwrap_or(false),
        http_timeout,
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_file = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file(&cwd));

    resolve(|key| std::env::var(key).ok(), config_file, default_home)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
