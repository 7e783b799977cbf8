//! Configuration for daybook.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DAYBOOK_HOME, credentials)
//! 2. Config file (.daybook/config.yaml)
//! 3. Defaults (~/.daybook)
//!
//! Config file discovery:
//! - Searches current directory and parents for .daybook/config.yaml
//! - `paths.home` is relative to the `.daybook/` directory, other paths to the
//!   project root (the directory holding `.daybook/`)

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::collect::DEFAULT_SOURCE_PATTERNS;
use crate::core::stage::StagePolicies;

/// Directory holding the config file
pub const CONFIG_DIR: &str = ".daybook";

/// Environment variable overriding the state directory
pub const HOME_ENV: &str = "DAYBOOK_HOME";

pub const DROPBOX_TOKEN_ENV: &str = "DROPBOX_ACCESS_TOKEN";
pub const GOOGLE_TOKEN_ENV: &str = "GOOGLE_ACCESS_TOKEN";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_SOURCE_FOLDER: &str = "/voice-memos";
const DEFAULT_AUDIO_EXTENSION: &str = "m4a";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_WHISPER_MODEL: &str = "base";
const DEFAULT_FFMPEG_TIMEOUT_SECS: u64 = 600;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub version: Option<String>,
    pub paths: PathsConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub openai: OpenAiConfig,
    pub google: GoogleConfig,
    pub transcription: TranscriptionConfig,
    pub ffmpeg: FfmpegConfig,
    pub stages: StagePolicies,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory: runs, locks (relative to .daybook/)
    pub home: Option<String>,
    /// Local download and merge directory (relative to project root)
    pub scratch: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// Folder in the source store holding new recordings
    pub folder: Option<String>,
    /// File-name globs to collect
    pub patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Extension of the merged recording
    pub audio_extension: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: Option<String>,
    pub transcription_model: Option<String>,
    pub chat_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleConfig {
    /// Override for the Drive/Docs endpoints (local emulators)
    pub base_url: Option<String>,
    /// Folder holding the year folders; the Drive root when unset
    pub root_folder_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptionConfig {
    pub backend: Option<TranscriptionBackend>,
    pub local_binary: Option<String>,
    pub local_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FfmpegConfig {
    pub binary: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Which speech-to-text backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionBackend {
    /// OpenAI audio transcription endpoint
    #[default]
    Openai,
    /// A local `whisper` binary
    Local,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// State directory (runs, locks)
    pub home: PathBuf,
    /// Local scratch directory, cleared at the start of each daily run
    pub scratch: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub source: SourceSettings,
    pub audio_extension: String,
    pub openai: OpenAiSettings,
    pub google: GoogleSettings,
    pub transcription: TranscriptionSettings,
    pub ffmpeg: FfmpegSettings,
    pub stages: StagePolicies,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSettings {
    pub folder: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleSettings {
    pub base_url: Option<String>,
    pub root_folder_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionSettings {
    pub backend: TranscriptionBackend,
    pub local_binary: PathBuf,
    pub local_model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FfmpegSettings {
    pub binary: String,
    pub timeout_seconds: u64,
}

impl FfmpegSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ResolvedConfig {
    /// Per-run journals ($DAYBOOK_HOME/runs)
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }

    /// Per-job lock files ($DAYBOOK_HOME/locks)
    pub fn locks_dir(&self) -> PathBuf {
        self.home.join("locks")
    }
}

/// API credentials, read from the environment only
#[derive(Clone)]
pub struct Credentials {
    pub dropbox_access_token: String,
    pub google_access_token: String,
    pub openai_api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("dropbox_access_token", &"<redacted>")
            .field("google_access_token", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{} is not set", name))
        };

        Ok(Self {
            dropbox_access_token: require(DROPBOX_TOKEN_ENV)?,
            google_access_token: require(GOOGLE_TOKEN_ENV)?,
            openai_api_key: require(OPENAI_KEY_ENV)?,
        })
    }
}

/// Find config file by searching `start` and its parents
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

/// Resolve a path that may be relative to `base`
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

/// Merge a parsed config file, env overrides and defaults
fn resolve(
    file: ConfigFile,
    config_path: Option<&Path>,
    env_home: Option<PathBuf>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let config_dir = config_path.and_then(Path::parent);
    let project_root = config_dir.and_then(Path::parent);

    let home = match (env_home, &file.paths.home, config_dir) {
        (Some(home), _, _) => home,
        (None, Some(home), Some(dir)) => resolve_path(dir, home),
        _ => default_home,
    };

    let scratch = match (&file.paths.scratch, project_root) {
        (Some(scratch), Some(root)) => resolve_path(root, scratch),
        (Some(scratch), None) => PathBuf::from(scratch),
        (None, _) => home.join("scratch"),
    };

    let local_binary = file
        .transcription
        .local_binary
        .as_deref()
        .map(|binary| match project_root {
            Some(root) if binary.contains('/') => resolve_path(root, binary),
            _ => PathBuf::from(binary),
        })
        .unwrap_or_else(|| PathBuf::from("whisper"));

    ResolvedConfig {
        home,
        scratch,
        config_file: config_path.map(Path::to_path_buf),
        source: SourceSettings {
            folder: file
                .source
                .folder
                .unwrap_or_else(|| DEFAULT_SOURCE_FOLDER.to_string()),
            patterns: file.source.patterns.unwrap_or_else(|| {
                DEFAULT_SOURCE_PATTERNS
                    .iter()
                    .map(|p| p.to_string())
                    .collect()
            }),
        },
        audio_extension: file
            .output
            .audio_extension
            .map(|ext| ext.trim_start_matches('.').to_string())
            .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string()),
        openai: OpenAiSettings {
            base_url: file
                .openai
                .base_url
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            transcription_model: file
                .openai
                .transcription_model
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            chat_model: file
                .openai
                .chat_model
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        },
        google: GoogleSettings {
            base_url: file.google.base_url,
            root_folder_id: file
                .google
                .root_folder_id
                .filter(|id| !id.trim().is_empty()),
        },
        transcription: TranscriptionSettings {
            backend: file.transcription.backend.unwrap_or_default(),
            local_binary,
            local_model: file
                .transcription
                .local_model
                .unwrap_or_else(|| DEFAULT_WHISPER_MODEL.to_string()),
        },
        ffmpeg: FfmpegSettings {
            binary: file.ffmpeg.binary.unwrap_or_else(|| "ffmpeg".to_string()),
            timeout_seconds: file
                .ffmpeg
                .timeout_seconds
                .unwrap_or(DEFAULT_FFMPEG_TIMEOUT_SECS),
        },
        stages: file.stages,
    }
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);
    let env_home = std::env::var(HOME_ENV).ok().map(PathBuf::from);

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let config_path = find_config_file(&cwd);

    let file = match config_path {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(file, config_path.as_deref(), env_home, default_home))
}
