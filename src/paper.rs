use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::enrich::{jel, language, template_kind, year, JelTable};
use crate::errors::{IngestError, IngestResult};
use crate::redif::{collect, Record, Template};
use crate::sanitize::{clean_field, sanitize, sanitize_email};

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub name: String,
    pub email: Option<String>,
}

/// A paper row with its child rows, ready to be written.
#[derive(Debug, Clone)]
pub struct PaperEntry {
    pub handle: String,
    pub url: String,
    pub template: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub year: Option<i32>,
    pub language: Option<String>,
    /// zlib-compressed JSON of the template pairs.
    pub redif: Vec<u8>,
    pub authors: Vec<Author>,
    pub jel: Vec<String>,
}

/// Collect, sanitize and enrich one template.
pub fn build_entry(
    template: &Template,
    url: &str,
    jel_table: &JelTable,
) -> IngestResult<PaperEntry> {
    let record = collect(template);
    let handle = record
        .first("handle")
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| IngestError::Parse("handle is missing".into()))?
        .to_string();

    let title = record.first("title").and_then(sanitize);
    let abstract_text = record.first("abstract").and_then(sanitize);
    let language = language::resolve(
        title.as_deref(),
        abstract_text.as_deref(),
        language::declared(&record),
    );

    Ok(PaperEntry {
        handle,
        url: url.to_string(),
        template: record.first("template-type").and_then(template_kind),
        journal: record.first("journal").and_then(sanitize),
        volume: record.first("volume").and_then(clean_field),
        issue: record.first("issue").and_then(clean_field),
        pages: record.first("pages").and_then(clean_field),
        year: year::resolve_year(&record),
        language,
        redif: compress(template)?,
        authors: authors(&record),
        jel: classification(&record, jel_table),
        title,
        abstract_text,
    })
}

fn authors(record: &Record) -> Vec<Author> {
    record
        .compounds("author")
        .filter_map(|cluster| {
            let name = cluster.get("name")?.first().and_then(|n| sanitize(n))?;
            let email = cluster
                .get("email")
                .and_then(|e| e.first())
                .and_then(|e| sanitize_email(e));
            Some(Author { name, email })
        })
        .collect()
}

fn classification(record: &Record, table: &JelTable) -> Vec<String> {
    let raw: Vec<&str> = record.scalars("classification-jel").collect();
    if raw.is_empty() {
        return Vec::new();
    }
    jel::normalize(&raw.join(" "), table)
}

pub fn compress(template: &Template) -> IngestResult<Vec<u8>> {
    let json = serde_json::to_vec(template)
        .map_err(|e| IngestError::Parse(format!("cannot serialize template: {}", e)))?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

pub fn decompress(blob: &[u8]) -> IngestResult<Template> {
    let mut json = Vec::new();
    ZlibDecoder::new(blob).read_to_end(&mut json)?;
    serde_json::from_slice(&json)
        .map_err(|e| IngestError::Parse(format!("stored template is corrupt: {}", e)))
}
