use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct DataPath {
    pub root: PathBuf,
}

impl DataPath {
    pub fn new(data_path: Option<PathBuf>) -> io::Result<Self> {
        let root = match data_path {
            Some(path) => path,
            None => dirs::home_dir()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        "Home directory not found. Please specify --data-path.",
                    )
                })?
                .join(".skinscan"),
        };

        Ok(Self { root })
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.root.join("error.log")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinType {
    Normal,
    Dry,
    Oily,
    Combination,
    Sensitive,
}

impl SkinType {
    pub const ALL: [SkinType; 5] = [
        SkinType::Normal,
        SkinType::Dry,
        SkinType::Oily,
        SkinType::Combination,
        SkinType::Sensitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkinType::Normal => "normal",
            SkinType::Dry => "dry",
            SkinType::Oily => "oily",
            SkinType::Combination => "combination",
            SkinType::Sensitive => "sensitive",
        }
    }
}

impl fmt::Display for SkinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkinType {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SkinType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Unknown skin type '{s}' (expected normal, dry, oily, combination or sensitive)"),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinConcern {
    Acne,
    Aging,
    Dryness,
    Redness,
    Hyperpigmentation,
    Sensitivity,
}

impl SkinConcern {
    pub const ALL: [SkinConcern; 6] = [
        SkinConcern::Acne,
        SkinConcern::Aging,
        SkinConcern::Dryness,
        SkinConcern::Redness,
        SkinConcern::Hyperpigmentation,
        SkinConcern::Sensitivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkinConcern::Acne => "acne",
            SkinConcern::Aging => "aging",
            SkinConcern::Dryness => "dryness",
            SkinConcern::Redness => "redness",
            SkinConcern::Hyperpigmentation => "hyperpigmentation",
            SkinConcern::Sensitivity => "sensitivity",
        }
    }
}

impl fmt::Display for SkinConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkinConcern {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SkinConcern::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Unknown skin concern '{s}'"),
                )
            })
    }
}

pub const SKIN_ISSUE_OPTIONS: [&str; 5] = [
    "Minor acne detected in T-zone",
    "Slight dryness detected in cheek area",
    "Some oil imbalance detected",
    "Areas of mild irritation detected",
    "No major issues detected",
];

pub const SUN_DAMAGE_OPTIONS: [&str; 4] = [
    "Minimal signs of UV exposure",
    "Light sun damage detected",
    "Moderate UV exposure signs",
    "None detected",
];

pub const SKIN_TONE_OPTIONS: [&str; 6] = ["Light", "Medium", "Dark", "Very Light", "Olive", "Deep"];

pub const UNIQUE_FEATURE_OPTIONS: [&str; 5] = [
    "Excellent hydration levels",
    "Strong skin barrier",
    "Good elasticity",
    "Even texture",
    "None detected",
];

/// Outcome of one skin scan, serialized the way the history function expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResults {
    pub skin_type: SkinType,
    pub skin_issues: String,
    pub sun_damage: String,
    pub unique_feature: String,
    pub skin_tone: String,
}

/// A product name mined from assistant text, with an optional shop link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedProduct {
    #[serde(rename = "product_name")]
    pub name: String,
    #[serde(rename = "product_link")]
    pub link: Option<String>,
    #[serde(rename = "product_description", default)]
    pub description: Option<String>,
}

impl ExtractedProduct {
    pub fn new(name: impl Into<String>, link: Option<String>) -> Self {
        Self {
            name: name.into(),
            link,
            description: None,
        }
    }
}

pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Rejects uploads that are not images or exceed `max_bytes`.
pub fn validate_image_upload(path: &Path, max_bytes: u64) -> io::Result<u64> {
    let is_image = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
        .unwrap_or(false);
    if !is_image {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Please select an image file",
        ));
    }

    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Image too large (max {}MB)", max_bytes / (1024 * 1024)),
        ));
    }

    Ok(size)
}

pub fn validate_domain(domain: &str) -> io::Result<()> {
    if domain.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Domain cannot be empty",
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Domain contains invalid characters",
        ));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
        || domain.contains("--")
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Domain format is invalid",
        ));
    }

    Ok(())
}
