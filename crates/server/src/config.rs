use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub slides: SlidesConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for uploaded files and converted slide images
    pub data_dir: String,
    /// Cap for general uploads (assignments, materials)
    #[serde(default = "default_upload_limit")]
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidesConfig {
    /// Cap for slide deck uploads
    #[serde(default = "default_deck_limit")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_max_slides")]
    pub max_slides: usize,
    /// Office-document to PDF converter binary
    #[serde(default = "default_soffice")]
    pub soffice_bin: String,
    /// PDF page rasterizer binary
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm_bin: String,
    #[serde(default = "default_convert_timeout")]
    pub convert_timeout_secs: u64,
    /// Auto-bookmark a slide once this many students report trouble
    #[serde(default = "default_flag_count")]
    pub flag_threshold_count: i64,
    /// Auto-bookmark a slide once this share of reactors report trouble
    #[serde(default = "default_flag_rate")]
    pub flag_threshold_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub base_url: String,
    /// Overridden by CLASSLINE_AI_API_KEY when set
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_ai_max_slides")]
    pub max_slides: usize,
}

fn default_upload_limit() -> u64 {
    100 * 1024 * 1024
}
fn default_deck_limit() -> u64 {
    50 * 1024 * 1024
}
fn default_max_slides() -> usize {
    100
}
fn default_soffice() -> String {
    "libreoffice".to_string()
}
fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}
fn default_convert_timeout() -> u64 {
    120
}
fn default_flag_count() -> i64 {
    3
}
fn default_flag_rate() -> f64 {
    0.5
}
fn default_ai_max_slides() -> usize {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            max_upload_bytes: default_upload_limit(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            max_slides: default_ai_max_slides(),
        }
    }
}

impl Default for SlidesConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_deck_limit(),
            max_slides: default_max_slides(),
            soffice_bin: default_soffice(),
            pdftoppm_bin: default_pdftoppm(),
            convert_timeout_secs: default_convert_timeout(),
            flag_threshold_count: default_flag_count(),
            flag_threshold_rate: default_flag_rate(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                path: "./data/classline.db".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production".to_string(),
                token_expiry_hours: 24,
            },
            storage: StorageConfig::default(),
            slides: SlidesConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Try to load from environment variable
        if let Ok(path) = std::env::var("CLASSLINE_CONFIG") {
            return Self::load_from_path(&PathBuf::from(path)).map(Self::apply_env);
        }

        // Try to load from default locations
        let default_paths = vec![
            PathBuf::from("classline-server.toml"),
            PathBuf::from("config/classline-server.toml"),
            PathBuf::from("/etc/classline/server.toml"),
        ];

        for path in default_paths {
            if path.exists() {
                return Self::load_from_path(&path).map(Self::apply_env);
            }
        }

        // Return default config if no file found
        tracing::warn!("No config file found, using defaults");
        Ok(Self::apply_env(Self::default()))
    }

    fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Secrets come from the environment when present
    fn apply_env(mut self) -> Self {
        if let Ok(secret) = std::env::var("CLASSLINE_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(url) = std::env::var("CLASSLINE_AI_BASE_URL") {
            self.ai.base_url = url;
        }
        if let Ok(key) = std::env::var("CLASSLINE_AI_API_KEY") {
            self.ai.api_key = key;
        }
        if let Ok(path) = std::env::var("CLASSLINE_DATABASE_PATH") {
            self.database.path = path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = Config::default();
        assert_eq!(config.slides.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.storage.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.slides.max_slides, 100);
        assert_eq!(config.slides.flag_threshold_count, 3);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [database]
            path = "/tmp/test.db"

            [auth]
            jwt_secret = "secret"
            token_expiry_hours = 2
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.slides.soffice_bin, "libreoffice");
        assert_eq!(config.slides.pdftoppm_bin, "pdftoppm");
        assert!((config.slides.flag_threshold_rate - 0.5).abs() < f64::EPSILON);
    }
}
