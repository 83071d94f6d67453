//! Library item snapshots handed to the scheduler.

use serde::{Deserialize, Serialize};

/// Kind of library entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Book,
    Folder,
}

/// Immutable snapshot of a library item at the time a job was scheduled.
///
/// `relative_path` is the item's identity inside the library tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableItem {
    pub relative_path: String,
    pub original_file_name: String,
    pub title: String,
    pub details: String,
    /// Playback position in seconds
    pub current_time: f64,
    /// Total duration in seconds
    pub duration: f64,
    pub percent_completed: f64,
    pub is_finished: bool,
    pub order_rank: i64,
    pub item_type: ItemType,
    /// Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_play_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl SyncableItem {
    /// A book with empty metadata, positioned at the start
    pub fn book(relative_path: impl Into<String>, title: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let original_file_name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            relative_path,
            original_file_name,
            title: title.into(),
            details: String::new(),
            current_time: 0.0,
            duration: 0.0,
            percent_completed: 0.0,
            is_finished: false,
            order_rank: 0,
            item_type: ItemType::Book,
            last_play_date: None,
            speed: None,
        }
    }
}

/// Partial metadata change pushed by an `update` job.
///
/// Absent fields are left untouched on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_completed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_finished: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_rank: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_play_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl MetadataUpdate {
    /// Every syncable field of `item`
    pub fn from_item(item: &SyncableItem) -> Self {
        Self {
            title: Some(item.title.clone()),
            details: Some(item.details.clone()),
            current_time: Some(item.current_time),
            duration: Some(item.duration),
            percent_completed: Some(item.percent_completed),
            is_finished: Some(item.is_finished),
            order_rank: Some(item.order_rank),
            last_play_date: item.last_play_date,
            speed: item.speed,
        }
    }

    /// Progress-only change, the most common update while listening
    pub fn progress(current_time: f64, percent_completed: f64) -> Self {
        Self {
            current_time: Some(current_time),
            percent_completed: Some(percent_completed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
