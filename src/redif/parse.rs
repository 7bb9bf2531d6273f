use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{IngestError, IngestResult};

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#.*\n?").unwrap());
static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[A-Za-z0-9-]+:\s*").unwrap());

pub const TEMPLATE_TYPE: &str = "template-type";

/// One ReDIF record: lowercase field names with raw values, in document order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Template {
    pub pairs: Vec<(String, String)>,
}

impl Template {
    /// Whether `name` occurs with a non-empty value.
    pub fn has_field(&self, name: &str) -> bool {
        self.pairs.iter().any(|(k, v)| k == name && !v.is_empty())
    }

    /// Render as `name: value` lines. Parsing the result gives back the same pairs.
    pub fn to_redif(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}: {}\n", k, v))
            .collect()
    }
}

/// Split a decoded ReDIF document into templates.
pub fn parse(text: &str) -> IngestResult<Vec<Template>> {
    let text = repair_line_endings(text);
    let text = COMMENT_RE.replace_all(&text, "");
    let pairs = split_fields(&text);
    let templates = split_templates(pairs);
    if templates.is_empty() {
        return Err(IngestError::Parse("no templates in document".into()));
    }
    Ok(templates)
}

/// A lone CR (old Mac line ending) becomes CRLF.
fn repair_line_endings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\r' && chars.peek() != Some(&'\n') {
            out.push('\n');
        }
    }
    out
}

fn split_fields(text: &str) -> Vec<(String, String)> {
    let markers: Vec<_> = FIELD_RE.find_iter(text).collect();
    markers
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let end = markers.get(i + 1).map_or(text.len(), |next| next.start());
            let name = m.as_str().trim().trim_end_matches(':').to_lowercase();
            let value = text[m.end()..end].trim().to_string();
            (name, value)
        })
        .collect()
}

/// Start a new template at every `template-type`; anything before the first is dropped.
fn split_templates(pairs: Vec<(String, String)>) -> Vec<Template> {
    let mut templates: Vec<Template> = Vec::new();
    for pair in pairs {
        if pair.0 == TEMPLATE_TYPE {
            templates.push(Template::default());
        }
        if let Some(current) = templates.last_mut() {
            current.pairs.push(pair);
        }
    }
    templates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn single_template() {
        let t = parse("Template-Type: ReDIF-Paper 1.0\nHandle: RePEc:abc:wpaper:1\nTitle: On Things\n")
            .unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(
            t[0].pairs,
            vec![
                pair("template-type", "ReDIF-Paper 1.0"),
                pair("handle", "RePEc:abc:wpaper:1"),
                pair("title", "On Things"),
            ]
        );
    }

    #[test]
    fn zero_templates_is_error() {
        let err = parse("Handle: RePEc:abc:wpaper:1\nTitle: Orphan\n").unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
        assert!(parse("").is_err());
    }

    #[test]
    fn preamble_dropped() {
        let t = parse("Title: Preamble\nTemplate-Type: ReDIF-Paper 1.0\nHandle: h\n").unwrap();
        assert_eq!(t[0].pairs[0], pair("template-type", "ReDIF-Paper 1.0"));
        assert_eq!(t[0].pairs.len(), 2);
    }

    #[test]
    fn multiple_templates() {
        let doc = "Template-Type: ReDIF-Paper 1.0\nHandle: a\n\nTemplate-Type: ReDIF-Paper 1.0\nHandle: b\n";
        let t = parse(doc).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[1].pairs[1], pair("handle", "b"));
    }

    #[test]
    fn multiline_value() {
        let doc = "Template-Type: ReDIF-Paper 1.0\nAbstract: first line\n  second line\nHandle: h\n";
        let t = parse(doc).unwrap();
        assert_eq!(t[0].pairs[1], pair("abstract", "first line\n  second line"));
    }

    #[test]
    fn comments_dropped() {
        let doc = "# generated file\nTemplate-Type: ReDIF-Paper 1.0\n#Title: hidden\nHandle: h\n";
        let t = parse(doc).unwrap();
        assert!(!t[0].has_field("title"));
        assert_eq!(t[0].pairs.len(), 2);
    }

    #[test]
    fn lone_carriage_returns() {
        let doc = "Template-Type: ReDIF-Paper 1.0\rHandle: h\rTitle: Mac\r";
        let t = parse(doc).unwrap();
        assert_eq!(t[0].pairs.len(), 3);
        assert_eq!(t[0].pairs[2], pair("title", "Mac"));
    }

    #[test]
    fn crlf_values_trimmed() {
        let doc = "Template-Type: ReDIF-Paper 1.0\r\nHandle: h\r\n";
        let t = parse(doc).unwrap();
        assert_eq!(t[0].pairs[1], pair("handle", "h"));
    }

    #[test]
    fn field_names_lowercased() {
        let t = parse("TEMPLATE-TYPE: ReDIF-Paper 1.0\nAuthor-Name: Smith\n").unwrap();
        assert_eq!(t[0].pairs[1].0, "author-name");
    }

    #[test]
    fn colon_inside_value_is_not_a_field() {
        let doc = "Template-Type: ReDIF-Paper 1.0\nTitle: Growth: A Survey\n";
        let t = parse(doc).unwrap();
        assert_eq!(t[0].pairs[1], pair("title", "Growth: A Survey"));
    }

    #[test]
    fn rendering_reparses() {
        let doc = "# header\r\nTemplate-Type: ReDIF-Article 1.0\r\nTitle: A\r\n  B\rHandle: x\n";
        let t = parse(doc).unwrap();
        let again = parse(&t[0].to_redif()).unwrap();
        assert_eq!(again, t);
    }

    #[test]
    fn fixture_series() {
        let bytes = std::fs::read("tests/fixtures/series.rdf").unwrap();
        let text = crate::redif::decode::decode(&bytes, None).unwrap();
        let t = parse(&text).unwrap();
        assert_eq!(t.len(), 3);
        assert!(t.iter().all(|t| t.has_field("handle")));
    }
}
