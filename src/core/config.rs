use crate::core::models::{DataPath, validate_domain};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// Application configuration stored in `config.toml` under the data path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            backend: BackendConfig::default(),
            scan: ScanConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

/// Connection settings for the hosted functions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub functions_url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            functions_url: String::new(),
            anon_key: String::new(),
            access_token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        !self.functions_url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }

    /// History is per-user, so saving needs a signed-in token.
    pub fn has_user_session(&self) -> bool {
        self.is_configured() && !self.access_token.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Simulated,
    RealModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub model_endpoint: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            frame_interval_ms: default_frame_interval_ms(),
            provider: ProviderKind::Simulated,
            model_endpoint: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_marketplace_domains")]
    pub marketplace_domains: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            marketplace_domains: default_marketplace_domains(),
        }
    }
}

fn default_version() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_frame_interval_ms() -> u64 {
    33
}
fn default_marketplace_domains() -> Vec<String> {
    vec!["amazon.com".to_string()]
}

pub const CONFIG_KEYS: [&str; 6] = [
    "functions_url",
    "anon_key",
    "access_token",
    "marketplace_domains",
    "provider",
    "model_endpoint",
];

pub struct ConfigService;

impl ConfigService {
    /// Load configuration, writing the defaults on first use
    pub fn load_config(data_path: &DataPath) -> io::Result<AppConfig> {
        let config_path = data_path.config_path();
        if !config_path.exists() {
            let config = AppConfig::default();
            fs::create_dir_all(&data_path.root)?;
            Self::save_config(&config, data_path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path)?;
        toml::from_str(&content).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid config format in {}: {e}", config_path.display()),
            )
        })
    }

    pub fn save_config(config: &AppConfig, data_path: &DataPath) -> io::Result<()> {
        let config_path = data_path.config_path();
        let toml_content = toml::to_string_pretty(config).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize config: {e}"),
            )
        })?;

        fs::write(&config_path, toml_content)?;
        log::info!("Saved configuration to {}", config_path.display());
        Ok(())
    }

    /// Render a single key for `config get`. Secrets are masked.
    pub fn get_value(config: &AppConfig, key: &str) -> io::Result<String> {
        let value = match key {
            "functions_url" => config.backend.functions_url.clone(),
            "anon_key" => mask_secret(&config.backend.anon_key),
            "access_token" => mask_secret(&config.backend.access_token),
            "marketplace_domains" => format!("{:?}", config.extraction.marketplace_domains),
            "provider" => match config.scan.provider {
                ProviderKind::Simulated => "simulated".to_string(),
                ProviderKind::RealModel => "real_model".to_string(),
            },
            "model_endpoint" => config.scan.model_endpoint.clone(),
            _ => return Err(unknown_key(key)),
        };
        Ok(value)
    }

    pub fn set_value(config: &mut AppConfig, key: &str, value: &str) -> io::Result<()> {
        match key {
            "functions_url" => {
                let value = value.trim();
                if !value.is_empty() {
                    validate_http_url(value)?;
                }
                config.backend.functions_url = value.trim_end_matches('/').to_string();
            }
            "anon_key" => config.backend.anon_key = value.trim().to_string(),
            "access_token" => config.backend.access_token = value.trim().to_string(),
            "marketplace_domains" => {
                let domains = value
                    .split(',')
                    .map(|s| {
                        let domain = s.trim().to_string();
                        validate_domain(&domain)?;
                        Ok(domain)
                    })
                    .collect::<io::Result<Vec<String>>>()?;
                config.extraction.marketplace_domains = domains;
            }
            "provider" => {
                config.scan.provider = match value.trim() {
                    "simulated" => ProviderKind::Simulated,
                    "real_model" => ProviderKind::RealModel,
                    other => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("Unknown provider '{other}' (expected simulated or real_model)"),
                        ));
                    }
                }
            }
            "model_endpoint" => {
                let value = value.trim();
                if !value.is_empty() {
                    validate_http_url(value)?;
                }
                config.scan.model_endpoint = value.to_string();
            }
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("Unknown key: {key} (known keys: {})", CONFIG_KEYS.join(", ")),
    )
}

fn validate_http_url(value: &str) -> io::Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid URL: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "URL must start with http:// or https://",
        ));
    }
    Ok(())
}

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}****")
}
