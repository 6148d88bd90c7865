//! Chapter page-loading and prefetch pipeline for a manga reader.
//!
//! Turns a chapter identifier into a readable, locally cached sequence
//! of page images, sourced from a downloaded archive or a remote image
//! host. Remote chapters are drained by a single background worker off
//! a priority queue, with bounded look-ahead prefetch, a time-limited
//! host-token exchange, per-page retry, and reference-counted cleanup.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod loader;
pub mod models;
pub mod reader;
pub mod source;

pub use cache::{DiskPageCache, MemoryPageCache, PageCache};
pub use config::ReaderConfig;
pub use error::{ReaderError, Result};
pub use http::HttpClient;
pub use loader::strategy::PageLoader;
pub use loader::ChapterLoader;
pub use models::{Chapter, DownloadStatus, Manga, PageDescriptor};
pub use reader::chapter::{ChapterState, ChapterTransition, ReaderChapter};
pub use reader::page::{PageStatus, ReaderPage};
pub use source::local::LocalArchiveSource;
pub use source::remote::{HttpPageListSource, PageListSource};
