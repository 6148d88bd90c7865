use crate::error::Result;
use crate::reader::page::ReaderPage;
use std::sync::Arc;

/// A chapter-scoped loading strategy, selected once by the chapter
/// loader: remote chapters get the queue-driven HTTP strategy, locally
/// archived chapters get the direct file-backed one.
#[async_trait::async_trait]
pub trait PageLoader: Send + Sync {
    /// Whether pages are served from local files. Local pages need no
    /// progressive loading or placeholder UI.
    fn is_local(&self) -> bool {
        false
    }

    /// Produces the chapter's ordered page list.
    async fn get_pages(&self) -> Result<Vec<Arc<ReaderPage>>>;

    /// Ensures one page's bytes become available. For remote chapters
    /// this is a long-lived subscription: it enqueues work and then
    /// suspends until the caller drops it; progress is observed through
    /// the page's status. Dropping the call withdraws its still-pending
    /// queue entries.
    async fn load_page(&self, page: Arc<ReaderPage>) -> Result<()>;

    /// User-triggered retry of a failed page. Fire-and-forget.
    fn retry_page(&self, page: Arc<ReaderPage>);

    /// Releases the strategy's resources once no consumer references
    /// its chapter.
    fn recycle(&self);
}
