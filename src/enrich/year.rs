use std::sync::LazyLock;

use regex::Regex;

use crate::redif::Record;

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]{4,}").unwrap());

/// Fields consulted for the publication year, most authoritative first.
const YEAR_FIELDS: &[&str] = &["year", "creation-date", "revision-date"];

/// First four digits of the first run of at least four digits.
/// `"0000"` and values without such a run give nothing.
pub fn parse_year(date: &str) -> Option<i32> {
    let run = DIGITS_RE.find(date)?.as_str();
    let year = &run[..4];
    if year == "0000" {
        return None;
    }
    year.parse().ok()
}

/// Earliest year in the first field that has any parsable one.
pub fn resolve_year(record: &Record) -> Option<i32> {
    YEAR_FIELDS
        .iter()
        .find_map(|field| record.scalars(field).filter_map(parse_year).min())
}
