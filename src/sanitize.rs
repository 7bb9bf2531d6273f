//! Cleanup of free-text ReDIF values: control characters, broken entities,
//! abstract markup, and placeholder values such as "N/A".

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

const BLOCK_TAGS: &[&str] = &["div", "p", "br", "li", "h1", "h2", "h3", "h4", "h5", "h6"];

static CONTROL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f\x80-\x9f]").unwrap());
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&#x?[0-9a-f\s]+;").unwrap());
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&#?x?[0-9a-z]+;").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W").unwrap());
static NO_ALPHA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\W0-9]*$").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.[a-z]+").unwrap());

/// Passes over escaped markup before giving up on a fixed point.
const MAX_PASSES: usize = 4;

/// Clean a free-text value. `None` for placeholders and values without letters.
///
/// Repeats until the text stops changing, so escaped markup such as
/// `&lt;p&gt;` is flattened too and the result sanitizes to itself.
pub fn sanitize(text: &str) -> Option<String> {
    let mut current = clean_once(text)?;
    for _ in 1..MAX_PASSES {
        let next = clean_once(&current)?;
        if next == current {
            break;
        }
        current = next;
    }
    Some(current)
}

fn clean_once(text: &str) -> Option<String> {
    let text = CONTROL_RE.replace_all(text, "");
    let text = NUMERIC_ENTITY_RE.replace_all(&text, |caps: &regex::Captures| {
        WS_RE.replace_all(&caps[0], "").into_owned()
    });
    let text = if is_markup(&text) {
        markup_to_text(&text)
    } else {
        collapse_whitespace(&text)
    };
    if is_na(&text) || NO_ALPHA_RE.is_match(&text) {
        return None;
    }
    Some(text)
}

/// First plausible address in a sanitized value.
pub fn sanitize_email(text: &str) -> Option<String> {
    let text = sanitize(text)?.to_lowercase();
    EMAIL_RE.find(&text).map(|m| m.as_str().to_string())
}

/// Light cleanup for short fields (volume, issue, pages) that may be purely numeric.
pub fn clean_field(text: &str) -> Option<String> {
    let text = collapse_whitespace(&CONTROL_RE.replace_all(text, ""));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn is_markup(text: &str) -> bool {
    let lower = text.to_lowercase();
    BLOCK_TAGS.iter().any(|t| lower.contains(&format!("<{}>", t)))
        || lower.contains("</")
        || lower.contains("/>")
        || ENTITY_RE.is_match(&lower)
}

/// Flatten markup to text. Block elements are padded with spaces so that
/// `<p>A</p><p>B</p>` reads "A B" rather than "AB".
fn markup_to_text(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let mut out = String::with_capacity(markup.len());
    flatten(fragment.root_element(), &mut out);
    // Numeric references such as `&#1;` decode to control characters.
    collapse_whitespace(&CONTROL_RE.replace_all(&out, ""))
}

fn flatten(element: ElementRef<'_>, out: &mut String) {
    let block = BLOCK_TAGS.contains(&element.value().name());
    if block {
        let leading_text = element
            .first_child()
            .and_then(|n| n.value().as_text().map(|t| !t.is_empty()))
            .unwrap_or(false);
        if leading_text {
            out.push(' ');
        }
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            flatten(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
    if block {
        out.push(' ');
    }
}

fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text.trim(), " ").into_owned()
}

fn is_na(text: &str) -> bool {
    NON_WORD_RE.replace_all(text, "").to_lowercase() == "na"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_whitespace() {
        assert_eq!(sanitize("  Growth\n  and\tTrade "), Some("Growth and Trade".into()));
    }

    #[test]
    fn control_characters_removed() {
        assert_eq!(sanitize("Tax\u{0}es\u{85}"), Some("Taxes".into()));
    }

    #[test]
    fn placeholders_rejected() {
        assert_eq!(sanitize("N/A"), None);
        assert_eq!(sanitize("n.a."), None);
        assert_eq!(sanitize(" na "), None);
        assert_eq!(sanitize("123"), None);
        assert_eq!(sanitize("--- 2019 ---"), None);
        assert_eq!(sanitize(""), None);
    }

    #[test]
    fn words_containing_na_survive() {
        assert_eq!(sanitize("Nash"), Some("Nash".into()));
    }

    #[test]
    fn paragraphs_keep_a_break() {
        assert_eq!(sanitize("<p>A</p><p>B</p>"), Some("A B".into()));
    }

    #[test]
    fn line_breaks_keep_a_break() {
        assert_eq!(sanitize("first line<br/>second line"), Some("first line second line".into()));
    }

    #[test]
    fn inline_tags_do_not_split_words() {
        assert_eq!(sanitize("<p>The <i>ex ante</i> view</p>"), Some("The ex ante view".into()));
        assert_eq!(sanitize("<p>Co<b>int</b>egration</p>"), Some("Cointegration".into()));
    }

    #[test]
    fn list_items() {
        assert_eq!(
            sanitize("<ul><li>one</li><li>two</li></ul>"),
            Some("one two".into())
        );
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(sanitize("Fish &amp; Chips"), Some("Fish & Chips".into()));
        assert_eq!(sanitize("caf&#233;"), Some("café".into()));
    }

    #[test]
    fn escaped_markup_flattened() {
        assert_eq!(sanitize("Fish &amp;amp; Chips"), Some("Fish & Chips".into()));
        assert_eq!(sanitize("a &lt;p&gt;b&lt;/p&gt;"), Some("a b".into()));
    }

    #[test]
    fn control_references_removed() {
        assert_eq!(sanitize("A&#1;B"), Some("AB".into()));
        assert_eq!(sanitize("<p>A&#x7f;B</p>"), Some("AB".into()));
    }

    #[test]
    fn broken_numeric_entity_repaired() {
        assert_eq!(sanitize("caf&#x E 9;"), Some("café".into()));
    }

    #[test]
    fn markup_only_placeholder_rejected() {
        assert_eq!(sanitize("<p>N/A</p>"), None);
    }

    #[test]
    fn less_than_without_markup_kept() {
        assert_eq!(sanitize("p < 0.05 in all cases"), Some("p < 0.05 in all cases".into()));
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "  Growth\n and Trade ",
            "<p>A</p><p>B</p>",
            "<div><h2>Intro</h2>We show <i>that</i> x.</div>",
            "caf&#x E 9; au lait",
            "first<br/>second",
            "N/A",
            "plain",
            "Fish &amp;amp; Chips",
            "a &lt;p&gt;b&lt;/p&gt;",
            "A&#1;B",
        ];
        for x in inputs {
            let once = sanitize(x);
            let twice = once.as_deref().and_then(sanitize);
            assert_eq!(twice, once, "input {:?}", x);
        }
    }

    #[test]
    fn emails() {
        assert_eq!(
            sanitize_email("John.Doe@Example.ORG"),
            Some("john.doe@example.org".into())
        );
        assert_eq!(
            sanitize_email("mailto: jd@uni-x.de (office)"),
            Some("jd@uni-x.de".into())
        );
        assert_eq!(sanitize_email("not an address"), None);
        assert_eq!(sanitize_email("N/A"), None);
    }

    #[test]
    fn numeric_fields_survive_clean_field() {
        assert_eq!(clean_field(" 12 "), Some("12".into()));
        assert_eq!(clean_field("101 -\n 120"), Some("101 - 120".into()));
        assert_eq!(clean_field("  "), None);
    }
}
