//! document.rs
//!
//! Content document model and front matter parsing.
//!
//! A document is a markdown file prefixed with a metadata block, either YAML
//! fenced by `---` lines or TOML fenced by `+++` lines:
//!
//! ```text
//! ---
//! title: "About me"
//! date: 2021-03-14
//! draft: false
//! ---
//! Body text…
//! ```

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::errors::{PipelineError, Result};

/// A single page or post.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Unique site path, e.g. `about` or `posts/lambda-glue-pipeline`.
    pub path: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub draft: bool,
    pub tags: Vec<String>,
    pub description: Option<String>,
    /// Body split into blocks (paragraphs, headings, fenced code).
    pub body: Vec<String>,
}

/// Raw metadata as it appears in the file; unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct FrontMatter {
    title: Option<String>,
    date: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    tags: Vec<String>,
    description: Option<String>,
}

/// Offset-less timestamps, read as UTC.
const LOCAL_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Accepts RFC 3339 timestamps, offset-less `YYYY-MM-DD[T ]HH:MM:SS`
/// timestamps (UTC) or bare `YYYY-MM-DD` dates (midnight UTC).
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

enum Fence {
    Yaml,
    Toml,
}

/// Split `text` into (fence kind, front matter, body).
fn split_front_matter(text: &str) -> Option<(Fence, &str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let first_line_end = text.find('\n')?;
    let fence = match text[..first_line_end].trim_end() {
        "---" => Fence::Yaml,
        "+++" => Fence::Toml,
        _ => return None,
    };
    let marker = match fence {
        Fence::Yaml => "---",
        Fence::Toml => "+++",
    };

    let rest = &text[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == marker {
            let meta = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((fence, meta, body));
        }
        offset += line.len();
    }
    None
}

/// Split a markdown body into blocks separated by blank lines. Fenced code
/// blocks stay whole, blank lines included.
pub fn split_blocks(body: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut open_fence: Option<&str> = None;

    for line in body.lines() {
        let trimmed = line.trim_start();
        match open_fence {
            Some(fence) => {
                current.push(line);
                // A closing fence carries no info string.
                if trimmed.trim_end().starts_with(fence)
                    && trimmed.trim_end().trim_start_matches(&fence[..1]).is_empty()
                {
                    open_fence = None;
                }
            }
            None if trimmed.starts_with("```") || trimmed.starts_with("~~~") => {
                open_fence = Some(&trimmed[..3]);
                current.push(line);
            }
            None if trimmed.is_empty() => {
                if !current.is_empty() {
                    blocks.push(current.join("\n"));
                    current.clear();
                }
            }
            None => current.push(line),
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

/// Parse a document's text. `path` is the document's site path; `source`
/// is the file it came from, used only in error messages.
pub fn parse_document(path: &str, source: &Path, text: &str) -> Result<Document> {
    let invalid = |reason: String| PipelineError::FrontMatter {
        path: source.to_path_buf(),
        reason,
    };

    let (fence, meta, body) =
        split_front_matter(text).ok_or_else(|| invalid("missing front matter block".into()))?;

    let fm: FrontMatter = match fence {
        Fence::Yaml => serde_yaml::from_str(meta).map_err(|e| invalid(e.to_string()))?,
        Fence::Toml => {
            // TOML has a native datetime type; flatten it to text so both
            // formats share one date parser.
            let mut table: toml::Table =
                toml::from_str(meta).map_err(|e| invalid(e.to_string()))?;
            if let Some(toml::Value::Datetime(dt)) = table.get("date") {
                let text = dt.to_string();
                table.insert("date".into(), toml::Value::String(text));
            }
            toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| invalid(e.to_string()))?
        }
    };

    let title = fm
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| invalid("missing title".into()))?;

    let date = fm
        .date
        .as_deref()
        .ok_or_else(|| invalid("missing date".into()))
        .and_then(|raw| parse_date(raw).ok_or_else(|| invalid("unparseable date".into())))?;

    Ok(Document {
        path: path.to_string(),
        title,
        date,
        draft: fm.draft,
        tags: fm.tags,
        description: fm.description,
        body: split_blocks(body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn src() -> &'static Path {
        Path::new("content/test.md")
    }

    #[test]
    fn parses_yaml_front_matter() {
        let text = "---\ntitle: \"About me\"\ndate: 2021-03-14\ntags: [bio]\n---\nHello.\n\nSecond paragraph.\n";
        let doc = parse_document("about", src(), text).unwrap();
        assert_eq!(doc.title, "About me");
        assert_eq!(doc.date, Utc.with_ymd_and_hms(2021, 3, 14, 0, 0, 0).unwrap());
        assert!(!doc.draft);
        assert_eq!(doc.tags, vec!["bio".to_string()]);
        assert_eq!(doc.body, vec!["Hello.", "Second paragraph."]);
    }

    #[test]
    fn parses_toml_front_matter_with_native_datetime() {
        let text = "+++\ntitle = \"Lambda and Glue\"\ndate = 2022-06-01T08:30:00Z\ndraft = true\n+++\nBody\n";
        let doc = parse_document("posts/lambda", src(), text).unwrap();
        assert_eq!(doc.title, "Lambda and Glue");
        assert_eq!(doc.date, Utc.with_ymd_and_hms(2022, 6, 1, 8, 30, 0).unwrap());
        assert!(doc.draft);
    }

    #[test]
    fn rfc3339_offsets_are_normalised_to_utc() {
        let text = "---\ntitle: T\ndate: \"2022-06-01T10:00:00+02:00\"\n---\n";
        let doc = parse_document("t", src(), text).unwrap();
        assert_eq!(doc.date, Utc.with_ymd_and_hms(2022, 6, 1, 8, 0, 0).unwrap());
        assert!(doc.body.is_empty());
    }

    #[test]
    fn missing_title_or_date_is_rejected() {
        let no_title = "---\ndate: 2021-01-01\n---\nbody\n";
        assert!(matches!(
            parse_document("x", src(), no_title),
            Err(PipelineError::FrontMatter { .. })
        ));

        let blank_title = "---\ntitle: \"  \"\ndate: 2021-01-01\n---\n";
        assert!(parse_document("x", src(), blank_title).is_err());

        let bad_date = "---\ntitle: X\ndate: yesterday\n---\n";
        assert!(parse_document("x", src(), bad_date).is_err());
    }

    #[test]
    fn unterminated_or_absent_front_matter_is_rejected() {
        assert!(parse_document("x", src(), "# Just markdown\n").is_err());
        assert!(parse_document("x", src(), "---\ntitle: X\ndate: 2021-01-01\n").is_err());
    }

    #[test]
    fn offset_less_timestamps_are_read_as_utc() {
        let expected = Utc.with_ymd_and_hms(2021, 3, 14, 10, 0, 0).unwrap();

        let toml_local = "+++\ntitle = \"T\"\ndate = 2021-03-14T10:00:00\n+++\n";
        assert_eq!(parse_document("t", src(), toml_local).unwrap().date, expected);

        let yaml_spaced = "---\ntitle: T\ndate: 2021-03-14 10:00:00\n---\n";
        assert_eq!(parse_document("t", src(), yaml_spaced).unwrap().date, expected);
    }

    #[test]
    fn an_info_string_line_does_not_close_a_fence() {
        let blocks = split_blocks("```\na\n```python\nb\n```\n\nafter");
        assert_eq!(blocks, vec!["```\na\n```python\nb\n```", "after"]);

        let blocks = split_blocks("~~~\nx\n~~~~\n\nafter");
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn fenced_code_blocks_stay_whole() {
        let body = "Intro.\n\n```python\nimport boto3\n\nclient = boto3.client('glue')\n```\n\nOutro.";
        let blocks = split_blocks(body);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[1].starts_with("```python"));
        assert!(blocks[1].contains("\n\nclient"));
        assert_eq!(blocks[2], "Outro.");
    }
}
