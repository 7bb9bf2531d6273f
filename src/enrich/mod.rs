pub mod jel;
pub mod language;
pub mod year;

use std::sync::LazyLock;

use regex::Regex;

pub use jel::JelTable;

static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)edif-([a-z]+)").unwrap());

/// Template kind from a `template-type` value: "ReDIF-Article 1.0" → "article".
/// Tolerates a mangled prefix ("Redif-paper", "EDIF-Book").
pub fn template_kind(template_type: &str) -> Option<String> {
    TEMPLATE_RE
        .captures(template_type)
        .map(|caps| caps[1].to_lowercase())
}
