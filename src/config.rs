use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cached image blobs and persisted page lists.
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Root directory of downloaded chapter archives.
    pub root: String,
}

impl ReaderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ReaderConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            http: HttpConfig {
                timeout_secs: 30,
                connect_timeout_secs: 10,
                user_agent: None,
            },
            cache: CacheConfig {
                dir: "./cache/pages".to_string(),
            },
            archive: ArchiveConfig {
                root: "./downloads".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_round_trips_through_toml() {
        let config = ReaderConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: ReaderConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.http.timeout_secs, 30);
        assert_eq!(parsed.cache.dir, "./cache/pages");
    }
}
