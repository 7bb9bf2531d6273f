use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

static SEPARATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z])[-., ]+([0-9])").unwrap());
static SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Z0-9]+").unwrap());
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][0-9]+$").unwrap());

/// Copied verbatim from the ReDIF documentation example by many archives.
const BOILERPLATE: &[&str] = &["R00", "Z0"];

/// The official JEL codes a paper may be tagged with.
#[derive(Debug, Clone, Default)]
pub struct JelTable {
    codes: HashSet<String>,
}

impl JelTable {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        JelTable {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Exact code, else its two-character parent, else nothing.
    fn resolve(&self, code: &str) -> Option<String> {
        if self.codes.contains(code) {
            return Some(code.to_string());
        }
        let parent = code.get(..2)?;
        self.codes.contains(parent).then(|| parent.to_string())
    }
}

/// Normalize a free-form `classification-jel` value into sorted official codes.
pub fn normalize(raw: &str, table: &JelTable) -> Vec<String> {
    let upper = raw.to_uppercase();
    let joined = SEPARATED_RE.replace_all(&upper, "$1$2");
    let codes: BTreeSet<String> = SPLIT_RE
        .split(&joined)
        .filter(|token| CODE_RE.is_match(token))
        .filter_map(|token| table.resolve(token.get(..3).unwrap_or(token)))
        .collect();
    let codes: Vec<String> = codes.into_iter().collect();
    if codes == BOILERPLATE {
        return Vec::new();
    }
    codes
}
