use crate::error::Result;
use crate::models::PageDescriptor;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Disk-backed key/blob store shared by the loading strategies. The cache
/// is the single source of truth for "are this page's bytes available";
/// the queue and worker never hold bytes themselves.
#[async_trait::async_trait]
pub trait PageCache: Send + Sync {
    async fn exists(&self, key: &str) -> bool;
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()>;
    async fn get_page_list(&self, chapter_id: &str) -> Result<Option<Vec<PageDescriptor>>>;
    async fn put_page_list(&self, chapter_id: &str, pages: &[PageDescriptor]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

pub struct DiskPageCache {
    base_path: PathBuf,
}

impl DiskPageCache {
    pub async fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(base_path.join("pagelists")).await?;
        Ok(Self { base_path })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.bin", sha256_hex(key)))
    }

    fn page_list_path(&self, chapter_id: &str) -> PathBuf {
        self.base_path
            .join("pagelists")
            .join(format!("{}.json", sanitize_filename(chapter_id)))
    }
}

#[async_trait::async_trait]
impl PageCache for DiskPageCache {
    async fn exists(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.blob_path(key))
            .await
            .unwrap_or(false)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.blob_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        let path = self.blob_path(key);
        // Write through a temp file so a torn write never looks like a hit.
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Cached {} bytes for key: {}", bytes.len(), key);
        Ok(())
    }

    async fn get_page_list(&self, chapter_id: &str) -> Result<Option<Vec<PageDescriptor>>> {
        let path = self.page_list_path(chapter_id);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                let pages: Vec<PageDescriptor> = serde_json::from_slice(&data)?;
                Ok(Some(pages))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_page_list(&self, chapter_id: &str, pages: &[PageDescriptor]) -> Result<()> {
        let path = self.page_list_path(chapter_id);
        let data = serde_json::to_vec(pages)?;
        tokio::fs::write(&path, data).await?;
        debug!(
            "Persisted page list for chapter {} ({} pages)",
            chapter_id,
            pages.len()
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        info!("Clearing page cache at {:?}", self.base_path);
        tokio::fs::remove_dir_all(&self.base_path).await?;
        tokio::fs::create_dir_all(self.base_path.join("pagelists")).await?;
        Ok(())
    }
}

/// In-memory cache for tests and embedded setups.
#[derive(Default)]
pub struct MemoryPageCache {
    blobs: Mutex<HashMap<String, Bytes>>,
    page_lists: Mutex<HashMap<String, Vec<PageDescriptor>>>,
}

impl MemoryPageCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PageCache for MemoryPageCache {
    async fn exists(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(key)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.blobs.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_page_list(&self, chapter_id: &str) -> Result<Option<Vec<PageDescriptor>>> {
        Ok(self.page_lists.lock().unwrap().get(chapter_id).cloned())
    }

    async fn put_page_list(&self, chapter_id: &str, pages: &[PageDescriptor]) -> Result<()> {
        self.page_lists
            .lock()
            .unwrap()
            .insert(chapter_id.to_string(), pages.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.blobs.lock().unwrap().clear();
        self.page_lists.lock().unwrap().clear();
        Ok(())
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .trim_matches(' ')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_cache_round_trips_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskPageCache::new(dir.path()).await.unwrap();

        assert!(!cache.exists("https://img.example/1.jpg").await);
        cache
            .put("https://img.example/1.jpg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        assert!(cache.exists("https://img.example/1.jpg").await);
        let bytes = cache.get("https://img.example/1.jpg").await.unwrap();
        assert_eq!(bytes, Some(Bytes::from_static(b"jpeg")));
    }

    #[tokio::test]
    async fn disk_cache_round_trips_page_lists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskPageCache::new(dir.path()).await.unwrap();

        assert!(cache.get_page_list("ch-1").await.unwrap().is_none());
        let pages = vec![
            PageDescriptor::new(0, "a"),
            PageDescriptor::new(1, "b").with_image_url("https://img.example/b.png"),
        ];
        cache.put_page_list("ch-1", &pages).await.unwrap();
        assert_eq!(cache.get_page_list("ch-1").await.unwrap(), Some(pages));
    }

    #[tokio::test]
    async fn clear_empties_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskPageCache::new(dir.path()).await.unwrap();

        cache.put("k", Bytes::from_static(b"v")).await.unwrap();
        cache
            .put_page_list("ch", &[PageDescriptor::new(0, "a")])
            .await
            .unwrap();
        cache.clear().await.unwrap();
        assert!(!cache.exists("k").await);
        assert!(cache.get_page_list("ch").await.unwrap().is_none());
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize_filename("a/b\\c:d"), "a_b_c_d");
    }
}
