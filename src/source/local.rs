use crate::cache::sanitize_filename;
use crate::error::{ReaderError, Result};
use crate::models::{Chapter, PageDescriptor};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Read-only view over the downloaded-archive directory layout:
/// `{root}/{manga}/{scanlator}_{chapter}` holding one image file per page.
pub struct LocalArchiveSource {
    root: PathBuf,
}

impl LocalArchiveSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn chapter_dir(&self, manga_title: &str, chapter_name: &str, scanlator: Option<&str>) -> PathBuf {
        let dir_name = match scanlator {
            Some(group) => format!("{}_{}", group, chapter_name),
            None => chapter_name.to_string(),
        };
        self.root
            .join(sanitize_filename(manga_title))
            .join(sanitize_filename(&dir_name))
    }

    /// Whether a chapter archive exists on disk for this manga/chapter/group.
    pub async fn is_downloaded(
        &self,
        manga_title: &str,
        chapter_name: &str,
        scanlator: Option<&str>,
    ) -> bool {
        let dir = self.chapter_dir(manga_title, chapter_name, scanlator);
        tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Lists the archived page files for a chapter, sorted by file name,
    /// as `file://` descriptors.
    pub async fn list_local_pages(
        &self,
        manga_title: &str,
        chapter: &Chapter,
    ) -> Result<Vec<PageDescriptor>> {
        let dir = self.chapter_dir(manga_title, &chapter.name, chapter.scanlator.as_deref());
        debug!("Listing local pages in {:?}", dir);

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if entry.file_type().await?.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();

        files
            .into_iter()
            .enumerate()
            .map(|(index, path)| {
                let uri = Url::from_file_path(&path).map_err(|_| {
                    ReaderError::page_resolution(format!("non-absolute archive path: {:?}", path))
                })?;
                Ok(PageDescriptor::new(index, uri.as_str()).with_image_url(uri.as_str()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter_with_group(name: &str, scanlator: Option<&str>) -> Chapter {
        let mut chapter = Chapter::new(
            "ch-1".to_string(),
            "manga-1".to_string(),
            name.to_string(),
            1.0,
        );
        chapter.scanlator = scanlator.map(|s| s.to_string());
        chapter
    }

    #[tokio::test]
    async fn detects_downloaded_chapter_by_group_and_titles() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("My Manga").join("Group_Chapter 1");
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let source = LocalArchiveSource::new(root.path());
        assert!(
            source
                .is_downloaded("My Manga", "Chapter 1", Some("Group"))
                .await
        );
        assert!(!source.is_downloaded("My Manga", "Chapter 2", Some("Group")).await);
        assert!(!source.is_downloaded("My Manga", "Chapter 1", None).await);
    }

    #[tokio::test]
    async fn lists_image_files_sorted_with_file_uris() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("My Manga").join("Chapter 1");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        for name in ["002.png", "001.jpg", "notes.txt"] {
            tokio::fs::write(dir.join(name), b"x").await.unwrap();
        }

        let source = LocalArchiveSource::new(root.path());
        let pages = source
            .list_local_pages("My Manga", &chapter_with_group("Chapter 1", None))
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].index, 0);
        assert!(pages[0].url.ends_with("001.jpg"));
        assert!(pages[1].url.ends_with("002.png"));
        assert!(pages[0].url.starts_with("file://"));
        assert_eq!(pages[0].image_url.as_deref(), Some(pages[0].url.as_str()));
    }
}
