use crate::loader::strategy::PageLoader;
use crate::models::Chapter;
use crate::reader::page::ReaderPage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

/// State machine of an open chapter.
///
/// `Wait -> Loading -> Loaded | Error`; the realized page list is only
/// reachable through `Loaded`. Dropping the last reference resets the
/// chapter back to `Wait`.
#[derive(Clone)]
pub enum ChapterState {
    Wait,
    Loading,
    Loaded(Vec<Arc<ReaderPage>>),
    Error(String),
}

impl ChapterState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ChapterState::Loaded(_))
    }
}

impl std::fmt::Debug for ChapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChapterState::Wait => write!(f, "Wait"),
            ChapterState::Loading => write!(f, "Loading"),
            ChapterState::Loaded(pages) => write!(f, "Loaded({} pages)", pages.len()),
            ChapterState::Error(e) => write!(f, "Error({})", e),
        }
    }
}

/// Runtime wrapper around one chapter for the duration it is being read.
///
/// Shared as `Arc` between the viewer and the prefetcher of neighboring
/// chapters; each concurrent consumer holds one logical reference via
/// `ref_inc`/`ref_dec`, and the 1 -> 0 transition recycles the assigned
/// loading strategy exactly once.
pub struct ReaderChapter {
    chapter: Chapter,
    state_tx: watch::Sender<ChapterState>,
    loader: RwLock<Option<Arc<dyn PageLoader>>>,
    requested_page: AtomicUsize,
    references: Mutex<usize>,
    load_lock: tokio::sync::Mutex<()>,
}

impl ReaderChapter {
    pub fn new(chapter: Chapter) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ChapterState::Wait);
        Arc::new(Self {
            chapter,
            state_tx,
            loader: RwLock::new(None),
            requested_page: AtomicUsize::new(0),
            references: Mutex::new(0),
            load_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn chapter(&self) -> &Chapter {
        &self.chapter
    }

    pub fn state(&self) -> ChapterState {
        self.state_tx.borrow().clone()
    }

    pub fn set_state(&self, state: ChapterState) {
        debug!("Chapter {} -> {:?}", self.chapter.id, state);
        self.state_tx.send_replace(state);
    }

    /// UI binding point: a receiver that yields every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ChapterState> {
        self.state_tx.subscribe()
    }

    /// The realized page list, only while the chapter is `Loaded`.
    pub fn pages(&self) -> Option<Vec<Arc<ReaderPage>>> {
        match &*self.state_tx.borrow() {
            ChapterState::Loaded(pages) => Some(pages.clone()),
            _ => None,
        }
    }

    pub fn loader(&self) -> Option<Arc<dyn PageLoader>> {
        self.loader.read().unwrap().clone()
    }

    pub fn set_loader(&self, loader: Arc<dyn PageLoader>) {
        *self.loader.write().unwrap() = Some(loader);
    }

    pub fn requested_page(&self) -> usize {
        self.requested_page.load(Ordering::Acquire)
    }

    pub fn set_requested_page(&self, index: usize) {
        self.requested_page.store(index, Ordering::Release);
    }

    /// Serializes `load_chapter` calls for this chapter.
    pub(crate) fn load_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.load_lock
    }

    pub fn ref_count(&self) -> usize {
        *self.references.lock().unwrap()
    }

    /// Registers one more concurrent consumer of this chapter.
    pub fn ref_inc(&self) {
        let mut refs = self.references.lock().unwrap();
        *refs += 1;
    }

    /// Drops one consumer. The transition to zero releases the assigned
    /// strategy and resets the chapter to `Wait`; the decision is taken
    /// under the reference lock so concurrent callers recycle once.
    pub fn ref_dec(&self) {
        let released = {
            let mut refs = self.references.lock().unwrap();
            if *refs == 0 {
                return;
            }
            *refs -= 1;
            if *refs == 0 {
                self.loader.write().unwrap().take()
            } else {
                None
            }
        };

        if let Some(loader) = released {
            debug!("Chapter {} unreferenced, recycling loader", self.chapter.id);
            loader.recycle();
            self.set_state(ChapterState::Wait);
        }
    }
}

/// Boundary between two chapters, surfaced to the viewer when it reaches
/// a chapter edge. Equality ignores direction so the viewer can detect a
/// passed boundary regardless of scroll direction.
#[derive(Clone)]
pub enum ChapterTransition {
    Prev {
        from: Arc<ReaderChapter>,
        to: Option<Arc<ReaderChapter>>,
    },
    Next {
        from: Arc<ReaderChapter>,
        to: Option<Arc<ReaderChapter>>,
    },
}

impl ChapterTransition {
    pub fn from(&self) -> &Arc<ReaderChapter> {
        match self {
            ChapterTransition::Prev { from, .. } | ChapterTransition::Next { from, .. } => from,
        }
    }

    pub fn to(&self) -> Option<&Arc<ReaderChapter>> {
        match self {
            ChapterTransition::Prev { to, .. } | ChapterTransition::Next { to, .. } => to.as_ref(),
        }
    }
}

impl std::fmt::Debug for ChapterTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (direction, from, to) = match self {
            ChapterTransition::Prev { from, to } => ("Prev", from, to),
            ChapterTransition::Next { from, to } => ("Next", from, to),
        };
        write!(
            f,
            "{}({} -> {})",
            direction,
            from.chapter().id,
            to.as_ref().map(|c| c.chapter().id.as_str()).unwrap_or("-")
        )
    }
}

impl PartialEq for ChapterTransition {
    fn eq(&self, other: &Self) -> bool {
        fn ends(t: &ChapterTransition) -> (&str, Option<&str>) {
            (
                t.from().chapter().id.as_str(),
                t.to().map(|c| c.chapter().id.as_str()),
            )
        }

        let (a_from, a_to) = ends(self);
        let (b_from, b_to) = ends(other);
        (a_from == b_from && a_to == b_to) || (Some(a_from) == b_to && a_to == Some(b_from))
    }
}
