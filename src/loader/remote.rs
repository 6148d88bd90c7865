use crate::cache::PageCache;
use crate::error::{ReaderError, Result};
use crate::loader::queue::{PageQueue, PRIORITY_PRELOAD, PRIORITY_REQUESTED, PRIORITY_RETRY};
use crate::loader::strategy::PageLoader;
use crate::reader::page::{PageStatus, ReaderPage};
use crate::source::remote::PageListSource;
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How many pages past the requested one are enqueued opportunistically.
const PRELOAD_AHEAD: usize = 4;

struct Inner {
    chapter_id: String,
    source: Arc<dyn PageListSource>,
    cache: Arc<dyn PageCache>,
    queue: PageQueue,
    pages: Mutex<Vec<Arc<ReaderPage>>>,
}

/// Queue-driven loading strategy for remote chapters. One background
/// worker per instance drains the shared priority queue in strict
/// priority order, so at most one transfer is in flight at a time.
pub struct RemotePageLoader {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RemotePageLoader {
    pub fn new(
        chapter_id: impl Into<String>,
        source: Arc<dyn PageListSource>,
        cache: Arc<dyn PageCache>,
    ) -> Self {
        let inner = Arc::new(Inner {
            chapter_id: chapter_id.into(),
            source,
            cache,
            queue: PageQueue::new(),
            pages: Mutex::new(Vec::new()),
        });
        let worker = tokio::spawn(worker_loop(inner.clone()));
        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn abort_worker(&self) {
        if let Some(worker) = self.worker.lock().unwrap().take() {
            worker.abort();
        }
    }
}

// A strategy can be replaced without ever being recycled, e.g. when a
// failed load is retried; the worker must not outlive it.
impl Drop for RemotePageLoader {
    fn drop(&mut self) {
        self.abort_worker();
    }
}

async fn worker_loop(inner: Arc<Inner>) {
    loop {
        let page = inner.queue.take().await;
        // A page may have been materialized by an earlier duplicate
        // entry, or reset while waiting; only queued pages are acted on.
        if page.status() != PageStatus::Queued {
            continue;
        }
        if let Err(e) = materialize(&inner, &page).await {
            // Page-local failures never fail the chapter; the viewer
            // observes the status and may retry.
            warn!(
                "Failed to load page {} of chapter {}: {}",
                page.index(),
                inner.chapter_id,
                e
            );
            page.set_status(PageStatus::Error);
        }
    }
}

async fn materialize(inner: &Arc<Inner>, page: &Arc<ReaderPage>) -> Result<()> {
    let image_url = match page.image_url() {
        Some(url) => url,
        None => {
            page.set_status(PageStatus::ResolvingUrl);
            let url = inner
                .source
                .resolve_image_url(page.url())
                .await
                .map_err(|e| ReaderError::page_resolution(e.to_string()))?;
            page.set_image_url(url.clone());
            url
        }
    };

    if !inner.cache.exists(&image_url).await {
        page.set_status(PageStatus::Downloading);
        let bytes = inner
            .source
            .fetch_bytes(&image_url)
            .await
            .map_err(|e| ReaderError::download(e.to_string()))?;
        inner.cache.put(&image_url, bytes).await?;
    }

    let cache = inner.cache.clone();
    let key = image_url.clone();
    page.set_bytes_source(Arc::new(move || {
        let cache = cache.clone();
        let key = key.clone();
        async move {
            cache
                .get(&key)
                .await?
                .ok_or_else(|| ReaderError::download(format!("cache entry missing: {}", key)))
        }
        .boxed()
    }));
    page.set_status(PageStatus::Ready);
    debug!("Page {} of chapter {} ready", page.index(), inner.chapter_id);
    Ok(())
}

/// Withdraws the entries one `load_page` call enqueued when that call is
/// dropped, so an abandoned page never blocks later ones.
struct EnqueueGuard {
    inner: Arc<Inner>,
    seqs: Vec<u64>,
}

impl EnqueueGuard {
    fn push(&mut self, page: Arc<ReaderPage>, priority: u8) {
        self.seqs.push(self.inner.queue.push(page, priority));
    }
}

impl Drop for EnqueueGuard {
    fn drop(&mut self) {
        self.inner.queue.remove(&self.seqs);
    }
}

#[async_trait::async_trait]
impl PageLoader for RemotePageLoader {
    async fn get_pages(&self) -> Result<Vec<Arc<ReaderPage>>> {
        let descriptors = match self.inner.cache.get_page_list(&self.inner.chapter_id).await {
            Ok(Some(cached)) if !cached.is_empty() => {
                debug!("Using cached page list for chapter {}", self.inner.chapter_id);
                cached
            }
            _ => self.inner.source.list_pages(&self.inner.chapter_id).await?,
        };

        // Remote indices are never trusted; pages are re-indexed in the
        // order the source reported them.
        let pages: Vec<Arc<ReaderPage>> = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, d)| Arc::new(ReaderPage::new(index, d.url, d.image_url)))
            .collect();

        *self.inner.pages.lock().unwrap() = pages.clone();
        Ok(pages)
    }

    async fn load_page(&self, page: Arc<ReaderPage>) -> Result<()> {
        let mut guard = EnqueueGuard {
            inner: self.inner.clone(),
            seqs: Vec::new(),
        };

        // A ready page whose bytes were evicted from the cache goes
        // through materialization again.
        if page.status() == PageStatus::Ready {
            let evicted = match page.image_url() {
                Some(url) => !self.inner.cache.exists(&url).await,
                None => true,
            };
            if evicted {
                page.set_status(PageStatus::Queued);
            }
        }
        if page.status() == PageStatus::Error {
            page.set_status(PageStatus::Queued);
        }
        if page.status() == PageStatus::Queued {
            guard.push(page.clone(), PRIORITY_REQUESTED);
        }

        // Opportunistic preload of the next few pages.
        if let Some(chapter) = page.chapter() {
            if let Some(pages) = chapter.pages() {
                for next in pages.iter().skip(page.index() + 1).take(PRELOAD_AHEAD) {
                    if next.status() == PageStatus::Queued
                        && !self.inner.queue.contains_page(next.index())
                    {
                        guard.push(next.clone(), PRIORITY_PRELOAD);
                    }
                }
            }
        }

        // The caller holds this as a long-lived subscription and reads
        // progress off the page's status channel; dropping it runs the
        // guard and withdraws whatever is still pending.
        futures::future::pending::<()>().await;
        Ok(())
    }

    fn retry_page(&self, page: Arc<ReaderPage>) {
        if page.status() == PageStatus::Error {
            page.set_status(PageStatus::Queued);
            self.inner.queue.push(page, PRIORITY_RETRY);
        }
    }

    fn recycle(&self) {
        self.abort_worker();
        self.inner.queue.clear();

        let pages = self.inner.pages.lock().unwrap().clone();
        if pages.is_empty() {
            return;
        }
        let inner = self.inner.clone();
        // Best effort, fire and forget: the persist task outlives this
        // strategy instance so reopening the chapter stays fast.
        tokio::spawn(async move {
            let descriptors: Vec<_> = pages
                .iter()
                .map(|p| {
                    let mut d = crate::models::PageDescriptor::new(p.index(), p.url());
                    d.image_url = p.image_url();
                    d
                })
                .collect();
            if let Err(e) = inner.cache.put_page_list(&inner.chapter_id, &descriptors).await {
                warn!(
                    "Failed to persist page list for chapter {}: {}",
                    inner.chapter_id, e
                );
            } else {
                info!("Persisted page list for chapter {}", inner.chapter_id);
            }
        });
    }
}
