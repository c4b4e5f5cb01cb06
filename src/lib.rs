//! # usenet-post
//!
//! Concurrent yEnc/NNTP binary poster with NZB index generation.
//!
//! Splits each input file into numbered articles bounded by the configured
//! article size, frames them with NNTP headers and yEnc encoding, posts them
//! concurrently across configured servers (each with its own connection
//! count) and writes an NZB index of everything posted.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use usenet_post::{Config, PostOptions, SubjectMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(std::path::Path::new("usenet-post.json"))?;
//!     let options = PostOptions {
//!         subject: SubjectMode::Literal("My Upload".to_string()),
//!         groups: None,
//!         prefix: None,
//!         from: None,
//!         host: "example-host".to_string(),
//!         output: None,
//!         meta_password: None,
//!         server: None,
//!     };
//!     let index = usenet_post::run(&config, &options, &[PathBuf::from("./files")]).await?;
//!     println!("index written to {}", index.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Article framing (headers, yEnc markers, NZB fragments)
pub mod article;
/// Input discovery and chunk planning
pub mod chunker;
/// Thread-safe NZB metadata aggregation
pub mod collector;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Refcounted shared read-only file mappings
pub mod mmap_cache;
/// Minimal NNTP posting session
pub mod nntp;
/// NZB document assembly and output
pub mod nzb;
/// Posting pipelines and the top-level run
pub mod poster;
/// Throughput sampling and the progress line
pub mod status;
/// yEnc transfer encoding
pub mod yenc;

// Re-export commonly used types
pub use article::{Article, ArticleOptions, build_article};
pub use chunker::{ChunkSpec, FileTask, SubjectMode, safe_file_name};
pub use collector::NzbCollector;
pub use config::{Config, ServerConfig};
pub use error::{Error, Result};
pub use mmap_cache::{MappedFile, MmapCache};
pub use nntp::NntpSession;
pub use nzb::{Nzb, NzbFileEntry, NzbMeta};
pub use poster::{PostOptions, run};
