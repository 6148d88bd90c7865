use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Chapter resolved to an empty page list: {0}")]
    EmptyPageList(String),

    #[error("Failed to resolve page image URL: {0}")]
    PageResolutionFailed(String),

    #[error("Failed to download page image: {0}")]
    DownloadFailed(String),

    #[error("Token exchange with image host failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Failed to load chapter {chapter_id}: {message}")]
    ChapterLoadFailed { chapter_id: String, message: String },

    #[error("Page bytes are not available yet: page {0}")]
    PageNotReady(usize),
}

impl ReaderError {
    pub fn empty_page_list(chapter_id: impl Into<String>) -> Self {
        Self::EmptyPageList(chapter_id.into())
    }

    pub fn page_resolution(msg: impl Into<String>) -> Self {
        Self::PageResolutionFailed(msg.into())
    }

    pub fn download(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn token_exchange(msg: impl Into<String>) -> Self {
        Self::TokenExchangeFailed(msg.into())
    }

    pub fn chapter_load(chapter_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChapterLoadFailed {
            chapter_id: chapter_id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;
