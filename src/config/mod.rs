use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "OBS_REMOTE_";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub obs: ObsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObsConfig {
    pub host: String,
    pub port: u16,
    /// Full websocket url; wins over `host`/`port` when set.
    pub url: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub message_id_length: usize,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4444,
            url: None,
            password: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            message_id_length: 16,
        }
    }
}

impl ObsConfig {
    pub fn endpoint_url(&self) -> String {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("ws://{}:{}", self.host, self.port),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        let config_path = active_config_path();

        if let Ok(raw) = fs::read_to_string(&config_path) {
            match toml::from_str::<Config>(&raw) {
                Ok(file_config) => config = file_config,
                Err(err) => {
                    tracing::warn!(path = %config_path.display(), error = %err, "ignoring unreadable config file")
                }
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var(format!("{}OBS_HOST", ENV_PREFIX)) {
            self.obs.host = val;
        }
        if let Ok(val) = env::var(format!("{}OBS_PORT", ENV_PREFIX)) {
            if let Ok(port) = val.parse() {
                self.obs.port = port;
            }
        }
        if let Ok(val) = env::var(format!("{}OBS_URL", ENV_PREFIX)) {
            self.obs.url = Some(val);
        }
        if let Ok(val) = env::var(format!("{}OBS_PASSWORD", ENV_PREFIX)) {
            self.obs.password = Some(val);
        }
        if let Ok(val) = env::var(format!("{}CONNECT_TIMEOUT_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.obs.connect_timeout_ms = ms;
            }
        }
        if let Ok(val) = env::var(format!("{}REQUEST_TIMEOUT_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.obs.request_timeout_ms = ms;
            }
        }
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.obs.port == 0 {
            return Err("obs.port must be non-zero".into());
        }
        if self.obs.url.is_none() && self.obs.host.trim().is_empty() {
            return Err("obs.host must be set when obs.url is not".into());
        }
        let url = self.obs.endpoint_url();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(format!("obs.url must start with ws:// or wss://, got {url}").into());
        }
        if self.obs.connect_timeout_ms < 100 {
            return Err("obs.connect_timeout_ms must be >= 100".into());
        }
        if self.obs.request_timeout_ms < 100 {
            return Err("obs.request_timeout_ms must be >= 100".into());
        }
        if !(8..=64).contains(&self.obs.message_id_length) {
            return Err("obs.message_id_length must be between 8 and 64".into());
        }
        Ok(())
    }

    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            return Err("config.toml already exists".into());
        }
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = toml::to_string_pretty(&Config::default())?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        managed_config_path()
    }
}

fn managed_config_path() -> PathBuf {
    if let Ok(path) = env::var(format!("{}CONFIG_PATH", ENV_PREFIX)) {
        return PathBuf::from(path);
    }
    let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
    Path::new(&appdata).join("ObsRemote").join(CONFIG_FILE)
}

fn active_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        local
    } else {
        managed_config_path()
    }
}
