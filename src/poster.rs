//! Concurrent posting pipelines and the top-level run
//!
//! One pipeline per selected server: a producer task walks the files in
//! discovery order and turns every chunk into an article, N connection tasks
//! drain the shared bounded queue and post, and the pipeline summarizes its
//! throughput once all connections finish. The bounded queue is the system's
//! backpressure: producers throttle to the network post rate.
//!
//! Encoding is deliberately duplicated per server: every producer re-encodes
//! the same raw bytes with its own message-ids and timestamps. Only the raw
//! file bytes are shared, through the mmap cache.

use crate::article::{self, Article, ArticleOptions};
use crate::chunker::{self, FileTask, SubjectMode};
use crate::collector::NzbCollector;
use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};
use crate::mmap_cache::MmapCache;
use crate::nntp::NntpSession;
use crate::nzb::{self, NzbMeta};
use crate::status::{self, TimeData, pretty_size};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedSender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Per-run options resolved from the CLI, layered over the configuration
#[derive(Clone, Debug)]
pub struct PostOptions {
    /// How subjects are derived for each file
    pub subject: SubjectMode,
    /// Newsgroup override (`-g`)
    pub groups: Option<Vec<String>>,
    /// Subject prefix override (`--prefix`)
    pub prefix: Option<String>,
    /// `From` address override (`--from`)
    pub from: Option<String>,
    /// Host token used in generated message-ids
    pub host: String,
    /// Output path override for the NZB index (`-o`)
    pub output: Option<PathBuf>,
    /// Archive password recorded as NZB head metadata (`--password`)
    pub meta_password: Option<String>,
    /// Post only to this named server (`--server`)
    pub server: Option<String>,
}

/// Wall-clock sample of one connection's work
#[derive(Clone, Copy, Debug)]
struct ConnTotals {
    start: Instant,
    end: Instant,
    bytes: u64,
}

/// Post all inputs and write the NZB index; returns the index path.
///
/// This is the single point every fatal condition propagates to: input
/// validation, mapping failures and protocol errors all surface here as the
/// first `Err`, and a failing pipeline aborts its siblings.
pub async fn run(config: &Config, options: &PostOptions, inputs: &[PathBuf]) -> Result<PathBuf> {
    validate_inputs(&options.subject, inputs)?;

    let files = chunker::collect_files(inputs)?;
    let total_bytes: u64 = files.iter().map(|file| file.size).sum();
    tracing::info!(
        "found {} file(s) totalling {:.1}MiB",
        files.len(),
        total_bytes as f64 / 1024.0 / 1024.0
    );

    let servers = config.select_servers(options.server.as_deref())?;
    let output_token = files
        .first()
        .map(|file| chunker::safe_file_name(&chunker::subject_for(file, &options.subject)))
        .unwrap_or_default();

    let article_options = Arc::new(ArticleOptions::resolve(config, options));
    let files = Arc::new(files);
    let cache = Arc::new(MmapCache::new());
    let collector = Arc::new(NzbCollector::new());

    let (sample_tx, sample_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let sampler = tokio::spawn(status::run_sampler(sample_rx, cancel.clone()));

    let mut pipelines = JoinSet::new();
    for (name, server) in servers.iter().cloned() {
        let pipeline = ServerPipeline {
            name,
            server,
            files: Arc::clone(&files),
            server_count: servers.len(),
            article_size: config.article_size,
            chunk_size: config.chunk_size,
            article_options: Arc::clone(&article_options),
            subject_mode: options.subject.clone(),
            cache: Arc::clone(&cache),
            collector: Arc::clone(&collector),
            samples: sample_tx.clone(),
        };
        pipelines.spawn(pipeline.run());
    }
    drop(sample_tx);

    let mut failure: Option<Error> = None;
    while let Some(joined) = pipelines.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                failure = Some(error);
                break;
            }
            Err(error) => {
                failure = Some(Error::Task(format!("server pipeline failed: {error}")));
                break;
            }
        }
    }
    // Dropping the set aborts any pipelines still running after a failure;
    // no further work happens past a fatal condition.
    drop(pipelines);
    cancel.cancel();
    let _ = sampler.await;
    if let Some(error) = failure {
        return Err(error);
    }

    let mut head = Vec::new();
    if let Some(password) = &options.meta_password {
        head.push(NzbMeta {
            kind: "password".to_string(),
            value: password.clone(),
        });
    }
    let document = collector.build_nzb(head);
    let requested = options
        .output
        .clone()
        .or_else(|| config.default_output.clone());
    let path = nzb::resolve_output_path(requested.as_deref(), &output_token);
    nzb::write_nzb(&path, &document)?;
    tracing::info!(files = document.files.len(), "generated NZB index: {}", path.display());
    Ok(path)
}

/// Check inputs before any network activity
fn validate_inputs(mode: &SubjectMode, inputs: &[PathBuf]) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::Input("no input paths provided".to_string()));
    }
    for path in inputs {
        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::Input(format!("stat {}: {e}", path.display())))?;
        if matches!(mode, SubjectMode::DirectoryNames) && !metadata.is_dir() {
            return Err(Error::Input(format!(
                "directory-subject mode requires directories, but {} is not one",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Everything one server's pipeline needs
struct ServerPipeline {
    name: String,
    server: ServerConfig,
    files: Arc<Vec<FileTask>>,
    server_count: usize,
    article_size: u64,
    chunk_size: u64,
    article_options: Arc<ArticleOptions>,
    subject_mode: SubjectMode,
    cache: Arc<MmapCache>,
    collector: Arc<NzbCollector>,
    samples: UnboundedSender<TimeData>,
}

impl ServerPipeline {
    /// Producer, connections and the final throughput summary for one server
    async fn run(self) -> Result<()> {
        tracing::info!(
            server = %self.name,
            connections = self.server.connections,
            "starting connections"
        );

        let (tx, rx) = mpsc::channel::<Article>(self.server.connections);
        let rx = Arc::new(Mutex::new(rx));

        let producer = tokio::spawn(produce_articles(ProducerTask {
            name: self.name.clone(),
            files: Arc::clone(&self.files),
            server_count: self.server_count,
            article_size: self.article_size,
            article_options: Arc::clone(&self.article_options),
            subject_mode: self.subject_mode.clone(),
            cache: Arc::clone(&self.cache),
            tx,
        }));

        let mut connections = JoinSet::new();
        for conn_id in 1..=self.server.connections {
            connections.spawn(run_connection(ConnectionTask {
                name: self.name.clone(),
                conn_id,
                server: self.server.clone(),
                chunk_size: self.chunk_size,
                queue: Arc::clone(&rx),
                collector: Arc::clone(&self.collector),
                samples: self.samples.clone(),
            }));
        }
        drop(rx);

        let mut totals = Vec::with_capacity(self.server.connections);
        while let Some(joined) = connections.join_next().await {
            match joined {
                Ok(Ok(connection_totals)) => totals.push(connection_totals),
                Ok(Err(error)) => {
                    producer.abort();
                    return Err(error);
                }
                Err(error) => {
                    producer.abort();
                    return Err(Error::Task(format!("connection task failed: {error}")));
                }
            }
        }

        match producer.await {
            Ok(result) => result?,
            Err(error) => return Err(Error::Task(format!("producer task failed: {error}"))),
        }

        if let Some((bytes, elapsed)) = aggregate_totals(&totals) {
            let secs = elapsed.as_secs_f64();
            let rate = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
            let (rate, unit) = pretty_size(rate);
            tracing::info!(
                server = %self.name,
                "posted {:.1}MiB in {:.1}s at {:.1}{}/s",
                bytes as f64 / 1024.0 / 1024.0,
                secs,
                rate,
                unit
            );
        }
        Ok(())
    }
}

/// Aggregate a server's connection samples: total bytes and max end − min start
fn aggregate_totals(totals: &[ConnTotals]) -> Option<(u64, Duration)> {
    let min_start = totals.iter().map(|t| t.start).min()?;
    let max_end = totals.iter().map(|t| t.end).max()?;
    let bytes = totals.iter().map(|t| t.bytes).sum();
    Some((bytes, max_end.duration_since(min_start)))
}

struct ProducerTask {
    name: String,
    files: Arc<Vec<FileTask>>,
    server_count: usize,
    article_size: u64,
    article_options: Arc<ArticleOptions>,
    subject_mode: SubjectMode,
    cache: Arc<MmapCache>,
    tx: Sender<Article>,
}

/// Generate every article for one server, in file order then part order.
///
/// Each file is mapped once per run (shared across servers), its chunks are
/// encoded and queued, and the mapping is released as soon as this server's
/// articles for it have all been emitted.
async fn produce_articles(task: ProducerTask) -> Result<()> {
    tracing::debug!(server = %task.name, "article producer started");
    let file_total = task.files.len();

    for (index, file) in task.files.iter().enumerate() {
        let mapped = task.cache.acquire(&file.path, task.server_count)?;
        let subject = chunker::subject_for(file, &task.subject_mode);

        for chunk in chunker::plan_chunks(index + 1, file_total, file, task.article_size) {
            let payload = &mapped.data()[chunk.begin as usize..chunk.end as usize];
            let article = article::build_article(payload, &chunk, &subject, &task.article_options);
            if task.tx.send(article).await.is_err() {
                // Connections are gone; their failure is the one that matters.
                return Ok(());
            }
        }

        if task.cache.release(mapped) {
            tracing::debug!(server = %task.name, "closed file {}", file.path.display());
        }
    }
    Ok(())
}

struct ConnectionTask {
    name: String,
    conn_id: usize,
    server: ServerConfig,
    chunk_size: u64,
    queue: Arc<Mutex<Receiver<Article>>>,
    collector: Arc<NzbCollector>,
    samples: UnboundedSender<TimeData>,
}

/// One connection: session setup, then post until the queue drains.
async fn run_connection(task: ConnectionTask) -> Result<ConnTotals> {
    tracing::debug!(server = %task.name, connection = task.conn_id, "connecting");
    let mut session = NntpSession::connect(
        &task.server.host,
        task.server.port,
        task.server.tls,
        task.server.allow_insecure_tls,
    )
    .await
    .inspect_err(|error| {
        tracing::error!(
            server = %task.name,
            connection = task.conn_id,
            %error,
            "error while connecting"
        );
    })?;
    tracing::debug!(server = %task.name, connection = task.conn_id, "connected");

    if let Some(username) = &task.server.username {
        session
            .authenticate(username, task.server.password.as_deref().unwrap_or(""))
            .await
            .inspect_err(|error| {
                tracing::error!(
                    server = %task.name,
                    connection = task.conn_id,
                    %error,
                    "error while authenticating"
                );
            })?;
        tracing::debug!(server = %task.name, connection = task.conn_id, "authenticated");
    }

    let start = Instant::now();
    let mut bytes: u64 = 0;
    loop {
        let article = { task.queue.lock().await.recv().await };
        let Some(article) = article else { break };

        session
            .post(&article.body, task.chunk_size)
            .await
            .inspect_err(|error| {
                tracing::error!(
                    server = %task.name,
                    connection = task.conn_id,
                    %error,
                    "post error"
                );
            })?;

        let posted = article.body.len() as u64;
        bytes += posted;
        task.collector.record(article);
        let _ = task.samples.send(TimeData::now(posted));
    }
    let end = Instant::now();

    tracing::debug!(server = %task.name, connection = task.conn_id, "closing connection");
    if let Err(error) = session.quit().await {
        tracing::warn!(
            server = %task.name,
            connection = task.conn_id,
            %error,
            "error while closing connection"
        );
    }

    Ok(ConnTotals { start, end, bytes })
}
