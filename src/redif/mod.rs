pub mod collect;
pub mod decode;
pub mod parse;

pub use collect::{collect, Record};
pub use parse::Template;

use tracing::debug;

use crate::errors::{IngestError, IngestResult};

const MANDATORY: &[&str] = &[parse::TEMPLATE_TYPE, "handle"];

/// A fetched document, before decoding.
pub struct RawDocument {
    pub url: String,
    pub bytes: Vec<u8>,
    pub encoding: Option<String>,
}

/// Two-pass reader: bytes → text → templates. Fails as a whole if any
/// template lacks a mandatory field.
pub fn read_document(doc: &RawDocument) -> IngestResult<Vec<Template>> {
    let text = decode::decode(&doc.bytes, doc.encoding.as_deref())?;
    let templates = parse::parse(&text)?;
    for template in &templates {
        if let Some(field) = MANDATORY.iter().find(|f| !template.has_field(f)) {
            return Err(IngestError::Parse(format!("{} is missing", field)));
        }
    }
    debug!("{}: {} templates", doc.url, templates.len());
    Ok(templates)
}
