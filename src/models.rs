use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A manga as known to the persistence layer. The pipeline only reads it,
/// and only for download-presence lookup and titling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manga {
    pub id: String,
    pub title: String,
    pub source: String,
}

/// One readable chapter of a manga. Owned by the persistence layer;
/// the pipeline treats it as read-only input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    pub id: String,
    pub manga_id: String,
    pub name: String,
    pub volume: Option<f64>,
    pub number: f64,
    pub scanlator: Option<String>,
    pub read: bool,
    pub bookmarked: bool,
    pub last_page_read: usize,
    pub download_status: DownloadStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    NotDownloaded,
    Downloading,
    Downloaded,
}

/// The persisted/wire shape of one page before it is materialized:
/// an index, an opaque source reference, and the resolved direct image
/// URL once known. This is what the page cache stores per chapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageDescriptor {
    pub index: usize,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl PageDescriptor {
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
            image_url: None,
        }
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

impl Chapter {
    pub fn new(id: String, manga_id: String, name: String, number: f64) -> Self {
        Self {
            id,
            manga_id,
            name,
            volume: None,
            number,
            scanlator: None,
            read: false,
            bookmarked: false,
            last_page_read: 0,
            download_status: DownloadStatus::NotDownloaded,
            updated_at: Utc::now(),
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.download_status == DownloadStatus::Downloaded
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::NotDownloaded => write!(f, "Not downloaded"),
            DownloadStatus::Downloading => write!(f, "Downloading"),
            DownloadStatus::Downloaded => write!(f, "Downloaded"),
        }
    }
}
