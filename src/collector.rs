//! Thread-safe NZB metadata aggregation
//!
//! Every connection task records the fragments of each article it posted;
//! the final state is read once, after all pipelines join, to assemble the
//! NZB document.
//!
//! File-level metadata is last-writer-wins (benign: every server posts
//! identical file-level data) and segments are appended with no server
//! discriminator, so posting one file to several servers yields duplicate
//! segment entries. That mirrors the original behavior and is kept
//! deliberately rather than de-duplicated here.

use crate::article::Article;
use crate::nzb::{Nzb, NzbFileEntry, NzbMeta};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-file NZB descriptor
#[derive(Clone, Debug)]
pub struct FileMeta {
    /// The posting `From` address
    pub poster: String,
    /// Unix timestamp of the post
    pub date: i64,
    /// Full composed subject of the file's articles
    pub subject: String,
    /// Newsgroups the file was posted to
    pub groups: Vec<String>,
}

/// Per-segment NZB descriptor
#[derive(Clone, Debug)]
pub struct SegmentMeta {
    /// Encoded article length in bytes
    pub bytes: u64,
    /// 1-based part number
    pub number: u64,
    /// Generated message-id (without angle brackets)
    pub message_id: String,
}

#[derive(Default)]
struct Inner {
    files: HashMap<String, FileMeta>,
    segments: HashMap<String, Vec<SegmentMeta>>,
}

/// Mutex-guarded accumulation of posted-article metadata
#[derive(Default)]
pub struct NzbCollector {
    inner: Mutex<Inner>,
}

impl NzbCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully posted article
    pub fn record(&self, article: Article) {
        let Article {
            file_name,
            file_meta,
            segment,
            ..
        } = article;
        let mut inner = self.inner.lock().expect("collector poisoned");
        inner.files.insert(file_name.clone(), file_meta);
        inner.segments.entry(file_name).or_default().push(segment);
    }

    /// Assemble the final NZB document from the accumulated state.
    ///
    /// File entries are sorted by subject and each file's segments by part
    /// number, regardless of post-completion order.
    pub fn build_nzb(&self, head: Vec<NzbMeta>) -> Nzb {
        let inner = self.inner.lock().expect("collector poisoned");
        let mut files: Vec<NzbFileEntry> = inner
            .files
            .iter()
            .map(|(name, meta)| {
                let mut segments = inner.segments.get(name).cloned().unwrap_or_default();
                segments.sort_by_key(|segment| segment.number);
                NzbFileEntry {
                    poster: meta.poster.clone(),
                    date: meta.date,
                    subject: meta.subject.clone(),
                    groups: meta.groups.clone(),
                    segments,
                }
            })
            .collect();
        files.sort_by(|a, b| a.subject.cmp(&b.subject));
        Nzb { head, files }
    }
}
