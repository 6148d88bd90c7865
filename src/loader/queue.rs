use crate::reader::page::ReaderPage;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Opportunistic preload of pages the user has not reached yet.
pub const PRIORITY_PRELOAD: u8 = 0;
/// The page the viewer is currently asking for.
pub const PRIORITY_REQUESTED: u8 = 1;
/// Explicit user-triggered retry, processed ahead of everything else.
pub const PRIORITY_RETRY: u8 = 2;

struct Entry {
    priority: u8,
    seq: u64,
    page: Arc<ReaderPage>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap pops the maximum: the highest priority band wins, with
    // the lower sequence number breaking ties (FIFO within a band).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Entry>,
    // page index -> live entry count, for the preload dedup check
    pending: HashMap<usize, usize>,
    next_seq: u64,
}

impl QueueState {
    fn dec_pending(&mut self, index: usize) {
        if let Some(count) = self.pending.get_mut(&index) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(&index);
            }
        }
    }
}

/// Thread-safe priority queue shared between `load_page` callers and the
/// single background worker draining it. Entries are removable by the
/// sequence number `push` hands back, so a cancelled caller can withdraw
/// exactly the entries it enqueued.
pub struct PageQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Default for PageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PageQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueues a page and returns the entry's sequence number.
    pub fn push(&self, page: Arc<ReaderPage>, priority: u8) -> u64 {
        let seq = {
            let mut state = self.state.lock().unwrap();
            let seq = state.next_seq;
            state.next_seq += 1;
            *state.pending.entry(page.index()).or_insert(0) += 1;
            state.heap.push(Entry {
                priority,
                seq,
                page,
            });
            seq
        };
        self.notify.notify_one();
        seq
    }

    /// Whether any live entry references the given page index.
    pub fn contains_page(&self, index: usize) -> bool {
        self.state.lock().unwrap().pending.contains_key(&index)
    }

    /// Withdraws the entries with the given sequence numbers, if still
    /// pending. Entries already taken by the worker are unaffected.
    pub fn remove(&self, seqs: &[u64]) {
        if seqs.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        let entries = std::mem::take(&mut state.heap);
        for entry in entries {
            if seqs.contains(&entry.seq) {
                state.dec_pending(entry.page.index());
            } else {
                state.heap.push(entry);
            }
        }
    }

    /// Takes the best entry, waiting while the queue is empty.
    pub async fn take(&self) -> Arc<ReaderPage> {
        loop {
            let notified = self.notify.notified();
            if let Some(page) = self.try_take() {
                return page;
            }
            notified.await;
        }
    }

    fn try_take(&self) -> Option<Arc<ReaderPage>> {
        let mut state = self.state.lock().unwrap();
        let entry = state.heap.pop()?;
        state.dec_pending(entry.page.index());
        Some(entry.page)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.heap.clear();
        state.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
