//! NZB index document assembly and output
//!
//! Renders the collector's final state to the NZB 1.1 XML schema and writes
//! it to disk. An existing file at the chosen path is never overwritten; the
//! writer falls back to a generated timestamped name instead.

use crate::collector::SegmentMeta;
use crate::error::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const NZB_DOCTYPE: &str = "<!DOCTYPE nzb PUBLIC \"-//newzBin//DTD NZB 1.1//EN\" \"http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd\">\n";
const NZB_XMLNS: &str = "http://www.newzbin.com/DTD/2003/nzb";

/// Optional `<head>` metadata entry, e.g. an archive password
#[derive(Clone, Debug)]
pub struct NzbMeta {
    /// The `type` attribute (e.g. "password")
    pub kind: String,
    /// The entry's text content
    pub value: String,
}

/// One `<file>` entry of the index
#[derive(Clone, Debug)]
pub struct NzbFileEntry {
    /// The posting `From` address
    pub poster: String,
    /// Unix timestamp of the post
    pub date: i64,
    /// Full composed subject
    pub subject: String,
    /// Newsgroups the file was posted to
    pub groups: Vec<String>,
    /// Segment list, sorted by part number at build time
    pub segments: Vec<SegmentMeta>,
}

/// The complete index document, built once and immutable thereafter
#[derive(Clone, Debug)]
pub struct Nzb {
    /// Optional metadata entries
    pub head: Vec<NzbMeta>,
    /// File entries, sorted by subject at build time
    pub files: Vec<NzbFileEntry>,
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl Nzb {
    /// Serialize to the NZB 1.1 XML document
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(XML_HEADER);
        out.push_str(NZB_DOCTYPE);
        out.push_str(&format!("<nzb xmlns=\"{NZB_XMLNS}\">\n"));

        if !self.head.is_empty() {
            out.push_str("    <head>\n");
            for meta in &self.head {
                out.push_str(&format!(
                    "        <meta type=\"{}\">{}</meta>\n",
                    xml_escape(&meta.kind),
                    xml_escape(&meta.value)
                ));
            }
            out.push_str("    </head>\n");
        }

        for file in &self.files {
            out.push_str(&format!(
                "    <file poster=\"{}\" date=\"{}\" subject=\"{}\">\n",
                xml_escape(&file.poster),
                file.date,
                xml_escape(&file.subject)
            ));
            out.push_str("        <groups>\n");
            for group in &file.groups {
                out.push_str(&format!(
                    "            <group>{}</group>\n",
                    xml_escape(group)
                ));
            }
            out.push_str("        </groups>\n");
            out.push_str("        <segments>\n");
            for segment in &file.segments {
                out.push_str(&format!(
                    "            <segment bytes=\"{}\" number=\"{}\">{}</segment>\n",
                    segment.bytes,
                    segment.number,
                    xml_escape(&segment.message_id)
                ));
            }
            out.push_str("        </segments>\n");
            out.push_str("    </file>\n");
        }

        out.push_str("</nzb>\n");
        out
    }
}

/// Generated fallback name: `post-{unix_ts}_{token}.nzb`
fn generated_name(token: &str) -> PathBuf {
    PathBuf::from(format!("post-{}_{token}.nzb", Utc::now().timestamp()))
}

/// Pick the path the index is written to.
///
/// Uses the requested path when given, otherwise a generated timestamped
/// name. If the chosen path already exists it is left untouched and a
/// generated name is used instead.
pub fn resolve_output_path(requested: Option<&Path>, token: &str) -> PathBuf {
    let path = match requested {
        Some(path) => path.to_path_buf(),
        None => generated_name(token),
    };
    if path.exists() {
        let alternate = generated_name(token);
        tracing::warn!(
            path = %path.display(),
            alternate = %alternate.display(),
            "index file already exists, using alternative name"
        );
        return alternate;
    }
    path
}

/// Render and write the index document
pub fn write_nzb(path: &Path, nzb: &Nzb) -> Result<()> {
    std::fs::write(path, nzb.render())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> Nzb {
        Nzb {
            head: vec![NzbMeta {
                kind: "password".to_string(),
                value: "s3&cret".to_string(),
            }],
            files: vec![NzbFileEntry {
                poster: "poster <p@example.com>".to_string(),
                date: 1_700_000_000,
                subject: "subj [1/1] - \"a<b>.bin\" yEnc (1/1)".to_string(),
                groups: vec!["alt.binaries.test".to_string()],
                segments: vec![
                    SegmentMeta {
                        bytes: 128_500,
                        number: 1,
                        message_id: "1700000000.12345$up@host".to_string(),
                    },
                    SegmentMeta {
                        bytes: 45_000,
                        number: 2,
                        message_id: "1700000000.12399$up@host".to_string(),
                    },
                ],
            }],
        }
    }

    #[test]
    fn render_emits_header_doctype_and_root() {
        let text = sample().render();
        assert!(text.starts_with(XML_HEADER));
        assert!(text.contains("<!DOCTYPE nzb PUBLIC"));
        assert!(text.contains("<nzb xmlns=\"http://www.newzbin.com/DTD/2003/nzb\">"));
        assert!(text.trim_end().ends_with("</nzb>"));
    }

    #[test]
    fn render_escapes_attribute_and_text_values() {
        let text = sample().render();
        assert!(text.contains("subject=\"subj [1/1] - &quot;a&lt;b&gt;.bin&quot; yEnc (1/1)\""));
        assert!(text.contains("<meta type=\"password\">s3&amp;cret</meta>"));
    }

    #[test]
    fn render_lists_segments_with_sizes_and_numbers() {
        let text = sample().render();
        assert!(
            text.contains("<segment bytes=\"128500\" number=\"1\">1700000000.12345$up@host</segment>")
        );
        assert!(text.contains("<segment bytes=\"45000\" number=\"2\">"));
    }

    #[test]
    fn render_omits_head_when_empty() {
        let mut nzb = sample();
        nzb.head.clear();
        assert!(!nzb.render().contains("<head>"));
    }

    #[test]
    fn resolve_keeps_nonexistent_requested_path() {
        let dir = TempDir::new().unwrap();
        let wanted = dir.path().join("out.nzb");
        let resolved = resolve_output_path(Some(&wanted), "token");
        assert_eq!(resolved, wanted);
    }

    #[test]
    fn resolve_renames_instead_of_overwriting() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("out.nzb");
        fs::write(&existing, b"precious").unwrap();

        let resolved = resolve_output_path(Some(&existing), "token");
        assert_ne!(resolved, existing);

        // Write the document under the alternate name; the original is untouched.
        let alternate = dir.path().join(resolved.file_name().unwrap());
        write_nzb(&alternate, &sample()).unwrap();
        assert_eq!(fs::read(&existing).unwrap(), b"precious");
        assert!(fs::read_to_string(&alternate).unwrap().contains("<nzb"));
    }

    #[test]
    fn generated_name_uses_safe_token() {
        let path = resolve_output_path(None, "my-show");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("post-"));
        assert!(name.ends_with("_my-show.nzb"));
    }
}
