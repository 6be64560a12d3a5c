// Posting Port
// External distribution channel (Discord or other). The core calls back into
// the ledger only after a successful post.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ChannelKind, JobPosting};

/// One posting destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
}

impl ChannelTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

/// Successful post result
#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub message_id: String,
    pub thread_id: Option<String>,
}

/// Posting errors
#[derive(Error, Debug)]
pub enum PostError {
    /// Channel is at platform capacity. Operational condition: the pipeline
    /// stops early instead of failing job after job.
    #[error("Channel at capacity: {channel}")]
    ChannelFull { channel: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Posting service trait
#[async_trait]
pub trait Poster: Send + Sync {
    /// Post one job to one channel
    async fn post(
        &self,
        job: &JobPosting,
        channel: &ChannelTarget,
    ) -> std::result::Result<PostOutcome, PostError>;
}

pub mod mocks {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Poster that records every call and fabricates message ids.
    /// Also used by the CLI's dry-run mode.
    #[derive(Default)]
    pub struct RecordingPoster {
        posts: Mutex<Vec<(String, String)>>,
        full_channels: HashSet<String>,
        next_id: AtomicU64,
    }

    impl RecordingPoster {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulate channels that are at platform capacity
        pub fn with_full_channels(channels: impl IntoIterator<Item = String>) -> Self {
            Self {
                full_channels: channels.into_iter().collect(),
                ..Self::default()
            }
        }

        /// (job title, channel id) pairs, in posting order
        pub fn posts(&self) -> Vec<(String, String)> {
            self.posts.lock().expect("poster mutex").clone()
        }
    }

    #[async_trait]
    impl Poster for RecordingPoster {
        async fn post(
            &self,
            job: &JobPosting,
            channel: &ChannelTarget,
        ) -> std::result::Result<PostOutcome, PostError> {
            if self.full_channels.contains(&channel.id) {
                return Err(PostError::ChannelFull {
                    channel: channel.id.clone(),
                });
            }
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.posts
                .lock()
                .expect("poster mutex")
                .push((job.title.clone(), channel.id.clone()));
            Ok(PostOutcome {
                message_id: format!("msg-{n}"),
                thread_id: Some(format!("thread-{n}")),
            })
        }
    }
}
