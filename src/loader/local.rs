use crate::error::{ReaderError, Result};
use crate::loader::strategy::PageLoader;
use crate::models::Chapter;
use crate::reader::page::{PageStatus, ReaderPage};
use crate::source::local::LocalArchiveSource;
use futures::FutureExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Loading strategy for chapters present in the downloaded archive.
/// Everything is already on disk, so there is no queue and no worker;
/// pages come back `Ready` with file-backed byte accessors.
pub struct LocalPageLoader {
    source: Arc<LocalArchiveSource>,
    manga_title: String,
    chapter: Chapter,
}

impl LocalPageLoader {
    pub fn new(source: Arc<LocalArchiveSource>, manga_title: impl Into<String>, chapter: Chapter) -> Self {
        Self {
            source,
            manga_title: manga_title.into(),
            chapter,
        }
    }
}

#[async_trait::async_trait]
impl PageLoader for LocalPageLoader {
    fn is_local(&self) -> bool {
        true
    }

    async fn get_pages(&self) -> Result<Vec<Arc<ReaderPage>>> {
        let descriptors = self
            .source
            .list_local_pages(&self.manga_title, &self.chapter)
            .await?;
        debug!(
            "Chapter {} served from local archive ({} pages)",
            self.chapter.id,
            descriptors.len()
        );

        descriptors
            .into_iter()
            .enumerate()
            .map(|(index, d)| {
                let path = file_uri_to_path(&d.url)?;
                let page = ReaderPage::new(index, d.url, d.image_url);
                page.set_bytes_source(Arc::new(move || {
                    let path = path.clone();
                    async move {
                        let data = tokio::fs::read(&path).await?;
                        Ok(bytes::Bytes::from(data))
                    }
                    .boxed()
                }));
                page.set_status(PageStatus::Ready);
                Ok(Arc::new(page))
            })
            .collect()
    }

    /// Bytes are always already local; nothing to materialize.
    async fn load_page(&self, _page: Arc<ReaderPage>) -> Result<()> {
        Ok(())
    }

    fn retry_page(&self, _page: Arc<ReaderPage>) {}

    fn recycle(&self) {}
}

fn file_uri_to_path(uri: &str) -> Result<PathBuf> {
    let url = Url::parse(uri)?;
    url.to_file_path()
        .map_err(|_| ReaderError::page_resolution(format!("not a file URI: {}", uri)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(name: &str) -> Chapter {
        Chapter::new(
            "ch-1".to_string(),
            "manga-1".to_string(),
            name.to_string(),
            1.0,
        )
    }

    #[tokio::test]
    async fn pages_come_back_ready_with_readable_bytes() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("My Manga").join("Chapter 1");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("001.jpg"), b"local-bytes")
            .await
            .unwrap();

        let loader = LocalPageLoader::new(
            Arc::new(LocalArchiveSource::new(root.path())),
            "My Manga",
            chapter("Chapter 1"),
        );
        assert!(loader.is_local());

        let pages = loader.get_pages().await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].status(), PageStatus::Ready);
        assert_eq!(
            pages[0].open().await.unwrap(),
            bytes::Bytes::from_static(b"local-bytes")
        );

        // load_page never moves a local page away from Ready.
        loader.load_page(pages[0].clone()).await.unwrap();
        assert_eq!(pages[0].status(), PageStatus::Ready);
    }
}
