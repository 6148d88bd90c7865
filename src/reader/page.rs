use crate::error::{ReaderError, Result};
use crate::reader::chapter::ReaderChapter;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::{RwLock, Weak};
use tokio::sync::watch;

/// Status of one page, observable by the UI through a watch channel.
///
/// Transitions only move forward, with two explicit exceptions:
/// `Error -> Queued` on retry and `Ready -> Queued` when a re-requested
/// page's bytes have been evicted from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Queued,
    ResolvingUrl,
    Downloading,
    Ready,
    Error,
}

/// Deferred byte accessor, assigned once a page's bytes are available.
pub type PageBytesFn = std::sync::Arc<dyn Fn() -> BoxFuture<'static, Result<Bytes>> + Send + Sync>;

/// Runtime state of one page while its chapter is open in the reader.
pub struct ReaderPage {
    index: usize,
    url: String,
    image_url: RwLock<Option<String>>,
    status_tx: watch::Sender<PageStatus>,
    chapter: RwLock<Weak<ReaderChapter>>,
    bytes_fn: RwLock<Option<PageBytesFn>>,
}

impl ReaderPage {
    pub fn new(index: usize, url: impl Into<String>, image_url: Option<String>) -> Self {
        let (status_tx, _) = watch::channel(PageStatus::Queued);
        Self {
            index,
            url: url.into(),
            image_url: RwLock::new(image_url),
            status_tx,
            chapter: RwLock::new(Weak::new()),
            bytes_fn: RwLock::new(None),
        }
    }

    /// Zero-based position within the owning chapter.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Opaque source reference for this page, possibly carrying an
    /// image-host token triple.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn image_url(&self) -> Option<String> {
        self.image_url.read().unwrap().clone()
    }

    pub fn set_image_url(&self, url: impl Into<String>) {
        *self.image_url.write().unwrap() = Some(url.into());
    }

    pub fn status(&self) -> PageStatus {
        *self.status_tx.borrow()
    }

    pub fn set_status(&self, status: PageStatus) {
        self.status_tx.send_replace(status);
    }

    /// UI binding point: a receiver that yields every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<PageStatus> {
        self.status_tx.subscribe()
    }

    pub fn chapter(&self) -> Option<std::sync::Arc<ReaderChapter>> {
        self.chapter.read().unwrap().upgrade()
    }

    pub fn set_chapter(&self, chapter: Weak<ReaderChapter>) {
        *self.chapter.write().unwrap() = chapter;
    }

    pub fn set_bytes_source(&self, f: PageBytesFn) {
        *self.bytes_fn.write().unwrap() = Some(f);
    }

    /// Reads this page's bytes through the assigned accessor. Fails with
    /// `PageNotReady` until materialization has assigned one.
    pub async fn open(&self) -> Result<Bytes> {
        let f = self
            .bytes_fn
            .read()
            .unwrap()
            .clone()
            .ok_or(ReaderError::PageNotReady(self.index))?;
        f().await
    }
}
