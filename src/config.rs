use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Default upload ceiling: "PNG, JPG up to 10MB".
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "pixelpals", about = "A small social photo-sharing server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub likes: LikesConfig,
    /// Absent means no identity provider is configured.
    pub identity: Option<IdentityConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackKind {
    #[default]
    File,
    Memory,
    None,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LikesConfig {
    pub fallback: FallbackKind,
    /// Surface backend save failures to callers instead of absorbing them.
    pub strict_saves: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IdentityConfig {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("pixelpals.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".pixelpals")
        })
    }

    /// Database file, if one has been resolved by [`Config::load`].
    pub fn db_path(&self) -> Option<&PathBuf> {
        self.database.path.as_ref()
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploads"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_for(data_dir: &std::path::Path) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(data_dir.to_path_buf()),
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert!(config.database.enabled);
        assert_eq!(config.storage.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.likes.fallback, FallbackKind::File);
        assert!(!config.likes.strict_saves);
        assert!(config.identity.is_none());
    }

    #[test]
    fn data_dir_defaults_to_home_dot_pixelpals() {
        let cli = Cli {
            config: None,
            host: None,
            port: None,
            data_dir: None,
        };
        assert!(Config::data_dir(&cli).ends_with(".pixelpals"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli_for(tmp.path())).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.db_path(), Some(&tmp.path().join("pixelpals.db")));
        assert_eq!(config.uploads_path(), tmp.path().join("uploads"));
    }

    #[test]
    fn load_reads_identity_and_likes_sections() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            r#"
[likes]
fallback = "memory"
strict_saves = true

[identity]
uid = "u-1"
display_name = "Jordan Lee"
email = "jordan@example.com"
"#,
        )
        .unwrap();

        let config = Config::load(&cli_for(tmp.path())).unwrap();
        assert_eq!(config.likes.fallback, FallbackKind::Memory);
        assert!(config.likes.strict_saves);
        let identity = config.identity.unwrap();
        assert_eq!(identity.uid, "u-1");
        assert_eq!(identity.display_name, "Jordan Lee");
        assert!(identity.avatar_url.is_none());
        assert!(!identity.disabled);
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("custom.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000

[database]
enabled = false
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            data_dir: Some(tmp.path().to_path_buf()),
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert!(!config.database.enabled);
    }
}
