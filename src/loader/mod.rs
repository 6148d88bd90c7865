pub mod local;
pub mod queue;
pub mod remote;
pub mod strategy;

use crate::cache::PageCache;
use crate::error::{ReaderError, Result};
use crate::models::Manga;
use crate::reader::chapter::{ChapterState, ReaderChapter};
use crate::source::local::LocalArchiveSource;
use crate::source::remote::PageListSource;
use local::LocalPageLoader;
use remote::RemotePageLoader;
use std::sync::Arc;
use strategy::PageLoader;
use tracing::{debug, info};

/// Owns strategy selection and the idempotent "ensure this chapter is
/// loaded" operation for one manga.
pub struct ChapterLoader {
    manga: Manga,
    source: Arc<dyn PageListSource>,
    local: Arc<LocalArchiveSource>,
    cache: Arc<dyn PageCache>,
}

impl ChapterLoader {
    pub fn new(
        manga: Manga,
        source: Arc<dyn PageListSource>,
        local: Arc<LocalArchiveSource>,
        cache: Arc<dyn PageCache>,
    ) -> Self {
        Self {
            manga,
            source,
            local,
            cache,
        }
    }

    /// Loads a chapter's page list and assigns its strategy. Idempotent:
    /// an already-loaded chapter with an assigned strategy returns
    /// immediately, and concurrent calls for the same chapter perform
    /// the fetch at most once.
    pub async fn load_chapter(&self, chapter: &Arc<ReaderChapter>) -> Result<()> {
        let _guard = chapter.load_lock().lock().await;

        if chapter.state().is_loaded() && chapter.loader().is_some() {
            debug!("Chapter {} already loaded", chapter.chapter().id);
            return Ok(());
        }

        info!(
            "Loading chapter {} ({})",
            chapter.chapter().id,
            chapter.chapter().name
        );
        chapter.set_state(ChapterState::Loading);

        match self.load_inner(chapter).await {
            Ok(()) => Ok(()),
            Err(e) => {
                chapter.set_state(ChapterState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn load_inner(&self, chapter: &Arc<ReaderChapter>) -> Result<()> {
        let meta = chapter.chapter();

        let downloaded = self
            .local
            .is_downloaded(&self.manga.title, &meta.name, meta.scanlator.as_deref())
            .await;
        let loader: Arc<dyn PageLoader> = if downloaded {
            debug!("Chapter {} found in local archive", meta.id);
            Arc::new(LocalPageLoader::new(
                self.local.clone(),
                self.manga.title.clone(),
                meta.clone(),
            ))
        } else {
            Arc::new(RemotePageLoader::new(
                meta.id.clone(),
                self.source.clone(),
                self.cache.clone(),
            ))
        };
        chapter.set_loader(loader.clone());

        let pages = loader
            .get_pages()
            .await
            .map_err(|e| match e {
                e @ ReaderError::EmptyPageList(_) => e,
                e => ReaderError::chapter_load(meta.id.clone(), e.to_string()),
            })?;
        if pages.is_empty() {
            return Err(ReaderError::empty_page_list(meta.id.clone()));
        }

        for page in &pages {
            page.set_chapter(Arc::downgrade(chapter));
        }
        if !meta.read {
            chapter.set_requested_page(meta.last_page_read);
        }

        chapter.set_state(ChapterState::Loaded(pages));
        Ok(())
    }
}
