use facewatch_capture::CameraSpec;
use facewatch_core::enroll::{DEFAULT_CAPACITY, DEFAULT_SIMILARITY_THRESHOLD};
use facewatch_core::gallery::DEFAULT_GALLERY_KEY;
use facewatch_core::matcher::DEFAULT_MATCH_THRESHOLD;
use facewatch_core::{EnrollOptions, IdPolicy, MatchPolicy};
use facewatch_remote::submit::DEFAULT_SUBMIT_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sqlite,
    File,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageKind::Sqlite),
            "file" | "json" => Ok(StorageKind::File),
            other => Err(format!("unknown storage '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceSourceKind {
    #[default]
    Onnx,
    Remote,
}

impl FromStr for FaceSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" | "local" => Ok(FaceSourceKind::Onnx),
            "remote" | "http" => Ok(FaceSourceKind::Remote),
            other => Err(format!("unknown face source '{other}'")),
        }
    }
}

/// Daemon configuration.
///
/// Resolved in three layers: built-in defaults, then the TOML file, then
/// `FACEWATCH_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Camera entries: image directories (`dir:` prefix optional) or snapshot URLs.
    /// Empty means `<data_dir>/frames`.
    pub cameras: Vec<String>,
    pub frame_interval_ms: u64,
    /// Euclidean distance under which a live face is labelled with a gallery name.
    pub match_threshold: f32,
    pub match_policy: MatchPolicy,
    /// Distance under which enrollment overwrites an existing record.
    pub similarity_threshold: f32,
    pub capacity: usize,
    pub id_policy: IdPolicy,
    pub data_dir: PathBuf,
    pub storage: StorageKind,
    pub gallery_key: String,
    pub face_source: FaceSourceKind,
    pub face_endpoint: Option<String>,
    pub object_endpoint: Option<String>,
    pub model_dir: PathBuf,
    pub submit_url: String,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facewatch");

        Self {
            cameras: Vec::new(),
            frame_interval_ms: 100,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            match_policy: MatchPolicy::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            capacity: DEFAULT_CAPACITY,
            id_policy: IdPolicy::default(),
            data_dir,
            storage: StorageKind::default(),
            gallery_key: DEFAULT_GALLERY_KEY.to_string(),
            face_source: FaceSourceKind::default(),
            face_endpoint: None,
            object_endpoint: None,
            model_dir: facewatch_core::default_model_dir(),
            submit_url: DEFAULT_SUBMIT_URL.to_string(),
            http_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    ///
    /// The file is `$FACEWATCH_CONFIG`, else `$XDG_CONFIG_HOME/facewatch/config.toml`.
    /// An explicitly named file must exist; the default one is optional.
    pub fn load() -> Result<Self, ConfigError> {
        let (path, explicit) = match std::env::var("FACEWATCH_CONFIG") {
            Ok(p) => (PathBuf::from(p), true),
            Err(_) => (default_config_path(), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::info!(path = %path.display(), "loading config file");
                Some(text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => None,
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Self::from_parts(text.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build a config from optional TOML text and an environment lookup.
    pub fn from_parts(
        toml_text: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: Config = match toml_text {
            Some(text) => toml::from_str(text)?,
            None => Config::default(),
        };
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("FACEWATCH_CAMERAS") {
            self.cameras = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        }
        env_parse(&env, "FACEWATCH_MATCH_THRESHOLD", &mut self.match_threshold);
        env_parse(&env, "FACEWATCH_SIMILARITY_THRESHOLD", &mut self.similarity_threshold);
        env_parse(&env, "FACEWATCH_CAPACITY", &mut self.capacity);
        env_parse(&env, "FACEWATCH_FRAME_INTERVAL_MS", &mut self.frame_interval_ms);
        env_parse(&env, "FACEWATCH_HTTP_TIMEOUT_SECS", &mut self.http_timeout_secs);
        env_parse(&env, "FACEWATCH_STORAGE", &mut self.storage);
        env_parse(&env, "FACEWATCH_FACE_SOURCE", &mut self.face_source);
        env_parse(&env, "FACEWATCH_MATCH_POLICY", &mut self.match_policy);
        env_parse(&env, "FACEWATCH_ID_POLICY", &mut self.id_policy);

        if let Some(v) = env("FACEWATCH_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FACEWATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FACEWATCH_FACE_ENDPOINT") {
            self.face_endpoint = non_empty(v);
        }
        if let Some(v) = env("FACEWATCH_OBJECT_ENDPOINT") {
            self.object_endpoint = non_empty(v);
        }
        if let Some(v) = env("FACEWATCH_SUBMIT_URL") {
            self.submit_url = v;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("match_threshold", self.match_threshold),
            ("similarity_threshold", self.similarity_threshold),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be a positive number, got {value}")));
            }
        }
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be at least 1".into()));
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid("frame_interval_ms must be at least 1".into()));
        }
        if self.face_source == FaceSourceKind::Remote && self.face_endpoint.is_none() {
            return Err(ConfigError::Invalid("face_source = \"remote\" needs face_endpoint".into()));
        }
        self.camera_specs()?;
        Ok(())
    }

    pub fn camera_specs(&self) -> Result<Vec<CameraSpec>, ConfigError> {
        if self.cameras.is_empty() {
            return Ok(vec![CameraSpec::Directory(self.data_dir.join("frames"))]);
        }
        self.cameras
            .iter()
            .map(|c| c.parse().map_err(ConfigError::Invalid))
            .collect()
    }

    pub fn enroll_options(&self) -> EnrollOptions {
        EnrollOptions {
            similarity_threshold: self.similarity_threshold,
            capacity: self.capacity,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn gallery_db_path(&self) -> PathBuf {
        self.data_dir.join("facewatch.db")
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            Path::new(&home).join(".config")
        })
        .join("facewatch/config.toml")
}

fn non_empty(v: String) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// Overwrite `target` with the parsed value of `key`, keeping the current value
/// when the variable is unset or unparsable.
fn env_parse<T>(env: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env(key) else { return };
    match raw.trim().parse() {
        Ok(v) => *target = v,
        Err(e) => tracing::warn!(key, value = %raw, error = %e, "ignoring unparsable environment override"),
    }
}
