//! Article framing
//!
//! Pure construction of one postable article from a raw byte range: NNTP
//! header block, yEnc begin/part markers, encoded payload and the end marker
//! carrying a CRC-32 of the raw bytes. Also produces the per-file and
//! per-segment NZB fragments the collector aggregates after a successful
//! post.
//!
//! Message-id uniqueness relies solely on sub-second wall-clock resolution
//! plus the configured host token; there is no collision detection.

use crate::chunker::ChunkSpec;
use crate::collector::{FileMeta, SegmentMeta};
use crate::config::Config;
use crate::poster::PostOptions;
use crate::yenc;
use chrono::Utc;
use crc::{CRC_32_ISO_HDLC, Crc};

/// CRC-32 with the IEEE polynomial, as used by yEnc `pcrc32`
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Agent tag placed on every posted article
const NEWSPOSTER: &str = concat!("usenet-post/", env!("CARGO_PKG_VERSION"));

/// Header values shared by every article of a run
///
/// Resolved once from the configuration plus CLI overrides, then passed into
/// [`build_article`] for every chunk.
#[derive(Clone, Debug)]
pub struct ArticleOptions {
    /// The `From` address
    pub from: String,
    /// Newsgroups the article is posted to
    pub groups: Vec<String>,
    /// Optional subject-line prefix (a space is added after it)
    pub prefix: Option<String>,
    /// Host token used in generated message-ids
    pub host: String,
}

impl ArticleOptions {
    /// Apply CLI overrides on top of configuration defaults
    pub fn resolve(config: &Config, options: &PostOptions) -> Self {
        let prefix = options
            .prefix
            .clone()
            .or_else(|| (!config.subject_prefix.is_empty()).then(|| config.subject_prefix.clone()));
        Self {
            from: options.from.clone().unwrap_or_else(|| config.from.clone()),
            groups: options
                .groups
                .clone()
                .unwrap_or_else(|| config.default_groups.clone()),
            prefix,
            host: options.host.clone(),
        }
    }
}

/// One network-postable unit plus the NZB fragments describing it
#[derive(Clone, Debug)]
pub struct Article {
    /// Full article bytes: headers, markers and encoded payload
    pub body: Vec<u8>,
    /// Base name of the source file, the collector's key
    pub file_name: String,
    /// Per-file NZB descriptor
    pub file_meta: FileMeta,
    /// Per-segment NZB descriptor
    pub segment: SegmentMeta,
}

/// Build one article from a raw byte range.
///
/// `payload` must be exactly the bytes of `chunk`'s range. The subject is
/// composed as `{prefix }{subject} [fnum/ftotal] - "name" yEnc (pnum/ptotal)`
/// and the `=yend` trailer carries the CRC-32 of the raw pre-encoding bytes
/// as 8 uppercase hex digits.
pub fn build_article(
    payload: &[u8],
    chunk: &ChunkSpec,
    subject: &str,
    options: &ArticleOptions,
) -> Article {
    debug_assert_eq!(payload.len() as u64, chunk.size());

    let now = Utc::now();
    let message_id = format!(
        "{}.{:05}$up@{}",
        now.timestamp(),
        now.timestamp_subsec_micros() / 10,
        options.host
    );

    let subject = match &options.prefix {
        Some(prefix) => format!("{prefix} {subject}"),
        None => subject.to_string(),
    };
    let subject = format!(
        "{subject} [{}/{}] - \"{}\" yEnc ({}/{})",
        chunk.file_num, chunk.file_total, chunk.file_name, chunk.part, chunk.part_total
    );

    let mut head = String::new();
    head.push_str(&format!("From: {}\r\n", options.from));
    head.push_str(&format!("Newsgroups: {}\r\n", options.groups.join(",")));
    head.push_str(&format!("Message-ID: <{message_id}>\r\n"));
    head.push_str(&format!("X-Newsposter: {NEWSPOSTER}\r\n"));
    head.push_str(&format!("Subject: {subject}\r\n\r\n"));
    head.push_str(&format!(
        "=ybegin part={} total={} line={} size={} name={}\r\n",
        chunk.part,
        chunk.part_total,
        yenc::LINE_LENGTH,
        chunk.file_size,
        chunk.file_name
    ));
    head.push_str(&format!(
        "=ypart begin={} end={}\r\n",
        chunk.begin + 1,
        chunk.end
    ));

    let mut body = head.into_bytes();
    body.reserve(payload.len() + payload.len() / 32 + 64);
    yenc::encode(payload, &mut body);
    body.extend_from_slice(
        format!(
            "=yend size={} part={} pcrc32={:08X}\r\n",
            chunk.size(),
            chunk.part,
            CRC32.checksum(payload)
        )
        .as_bytes(),
    );

    let segment = SegmentMeta {
        bytes: body.len() as u64,
        number: chunk.part,
        message_id,
    };
    let file_meta = FileMeta {
        poster: options.from.clone(),
        date: now.timestamp(),
        subject,
        groups: options.groups.clone(),
    };

    Article {
        body,
        file_name: chunk.file_name.clone(),
        file_meta,
        segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ArticleOptions {
        ArticleOptions {
            from: "poster <poster@example.com>".to_string(),
            groups: vec!["alt.binaries.test".to_string(), "alt.binaries.misc".to_string()],
            prefix: Some("[req]".to_string()),
            host: "example-host".to_string(),
        }
    }

    fn chunk() -> ChunkSpec {
        ChunkSpec {
            part: 2,
            part_total: 3,
            begin: 128_000,
            end: 256_000,
            file_num: 1,
            file_total: 1,
            file_size: 300_000,
            file_name: "episode.mkv".to_string(),
        }
    }

    fn body_text(article: &Article) -> String {
        String::from_utf8_lossy(&article.body).into_owned()
    }

    #[test]
    fn subject_embeds_file_and_part_counters() {
        let payload = vec![0u8; 128_000];
        let article = build_article(&payload, &chunk(), "My Show", &options());
        let text = body_text(&article);
        assert!(text.contains("Subject: [req] My Show [1/1] - \"episode.mkv\" yEnc (2/3)\r\n"));
        assert!(text.contains("From: poster <poster@example.com>\r\n"));
        assert!(text.contains("Newsgroups: alt.binaries.test,alt.binaries.misc\r\n"));
        assert!(text.contains("$up@example-host>\r\n"));
    }

    #[test]
    fn markers_carry_one_based_inclusive_range() {
        let payload = vec![7u8; 128_000];
        let article = build_article(&payload, &chunk(), "s", &options());
        let text = body_text(&article);
        assert!(text.contains("=ybegin part=2 total=3 line=128 size=300000 name=episode.mkv\r\n"));
        assert!(text.contains("=ypart begin=128001 end=256000\r\n"));
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn end_marker_crc_matches_independent_checksum() {
        let payload: Vec<u8> = (0..90_000u32).map(|i| (i % 251) as u8).collect();
        let mut spec = chunk();
        spec.begin = 0;
        spec.end = payload.len() as u64;
        spec.part = 1;
        spec.part_total = 1;
        let article = build_article(&payload, &spec, "s", &options());

        let expected = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&payload);
        let text = body_text(&article);
        assert!(
            text.contains(&format!("pcrc32={expected:08X}\r\n")),
            "yend trailer must embed the raw-byte CRC"
        );
        assert!(text.contains(&format!("=yend size={} part=1", payload.len())));
    }

    #[test]
    fn segment_reports_encoded_length() {
        let payload = vec![1u8; 1000];
        let mut spec = chunk();
        spec.begin = 0;
        spec.end = 1000;
        let article = build_article(&payload, &spec, "s", &options());
        assert_eq!(article.segment.bytes, article.body.len() as u64);
        assert_eq!(article.segment.number, 2);
        assert!(article.segment.bytes > 1000, "encoded body includes headers");
    }

    #[test]
    fn file_meta_mirrors_options() {
        let payload = vec![1u8; 10];
        let mut spec = chunk();
        spec.begin = 0;
        spec.end = 10;
        let article = build_article(&payload, &spec, "My Show", &options());
        assert_eq!(article.file_meta.poster, options().from);
        assert_eq!(article.file_meta.groups.len(), 2);
        assert_eq!(article.file_name, "episode.mkv");
    }

    #[test]
    fn options_resolve_layers_overrides_over_config() {
        use crate::chunker::SubjectMode;
        use crate::poster::PostOptions;

        let config: crate::config::Config = serde_json::from_str(
            r#"{
                "from": "config <c@example.com>",
                "default_groups": ["alt.binaries.test"],
                "subject_prefix": "[cfg]",
                "servers": { "main": { "host": "news.example.com", "port": 119 } }
            }"#,
        )
        .unwrap();
        let mut post_options = PostOptions {
            subject: SubjectMode::Literal("s".to_string()),
            groups: None,
            prefix: None,
            from: None,
            host: "h".to_string(),
            output: None,
            meta_password: None,
            server: None,
        };

        let resolved = ArticleOptions::resolve(&config, &post_options);
        assert_eq!(resolved.from, "config <c@example.com>");
        assert_eq!(resolved.prefix.as_deref(), Some("[cfg]"));
        assert_eq!(resolved.groups, vec!["alt.binaries.test"]);

        post_options.from = Some("cli <x@example.com>".to_string());
        post_options.groups = Some(vec!["alt.binaries.other".to_string()]);
        post_options.prefix = Some("[cli]".to_string());
        let resolved = ArticleOptions::resolve(&config, &post_options);
        assert_eq!(resolved.from, "cli <x@example.com>");
        assert_eq!(resolved.prefix.as_deref(), Some("[cli]"));
        assert_eq!(resolved.groups, vec!["alt.binaries.other"]);
    }

    #[test]
    fn prefix_is_optional() {
        let mut opts = options();
        opts.prefix = None;
        let payload = vec![1u8; 10];
        let mut spec = chunk();
        spec.begin = 0;
        spec.end = 10;
        let article = build_article(&payload, &spec, "Plain", &opts);
        assert!(body_text(&article).contains("Subject: Plain [1/1]"));
    }
}
