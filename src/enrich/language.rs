use std::collections::HashSet;

use crate::redif::Record;

/// Most likely language of `text` as an ISO 639-1 code.
///
/// Short texts such as titles rarely reach whatlang's reliability bar, so the
/// top candidate is taken as is. `None` when nothing is detected or the
/// language has no two-letter code.
pub fn detect(text: &str) -> Option<&'static str> {
    let info = whatlang::detect(text)?;
    iso639_1(info.lang().code())
}

/// Declared `language` field, if it is a two-letter code.
pub fn declared(record: &Record) -> Option<String> {
    let lang = record.first("language")?.trim().to_lowercase();
    (lang.len() == 2 && lang.chars().all(|c| c.is_ascii_lowercase())).then_some(lang)
}

/// Common language of title and abstract, falling back to the declared one.
///
/// Each non-empty text is detected separately; the detection wins only when
/// all of them agree on one known language.
pub fn resolve(
    title: Option<&str>,
    abstract_text: Option<&str>,
    declared: Option<String>,
) -> Option<String> {
    let detected: HashSet<Option<&str>> = [title, abstract_text]
        .into_iter()
        .flatten()
        .filter(|t| !t.is_empty())
        .map(detect)
        .collect();
    match detected.into_iter().collect::<Vec<_>>().as_slice() {
        [Some(lang)] => Some(lang.to_string()),
        _ => declared,
    }
}

fn iso639_1(code: &str) -> Option<&'static str> {
    let two = match code {
        "afr" => "af",
        "aka" => "ak",
        "amh" => "am",
        "ara" => "ar",
        "aze" => "az",
        "bel" => "be",
        "ben" => "bn",
        "bul" => "bg",
        "cat" => "ca",
        "ces" => "cs",
        "cmn" => "zh",
        "dan" => "da",
        "deu" => "de",
        "ell" => "el",
        "eng" => "en",
        "epo" => "eo",
        "est" => "et",
        "fin" => "fi",
        "fra" => "fr",
        "guj" => "gu",
        "heb" => "he",
        "hin" => "hi",
        "hrv" => "hr",
        "hun" => "hu",
        "hye" => "hy",
        "ind" => "id",
        "ita" => "it",
        "jav" => "jv",
        "jpn" => "ja",
        "kan" => "kn",
        "kat" => "ka",
        "khm" => "km",
        "kor" => "ko",
        "lat" => "la",
        "lav" => "lv",
        "lit" => "lt",
        "mal" => "ml",
        "mar" => "mr",
        "mkd" => "mk",
        "mya" => "my",
        "nep" => "ne",
        "nld" => "nl",
        "nob" => "nb",
        "ori" => "or",
        "pan" => "pa",
        "pes" => "fa",
        "pol" => "pl",
        "por" => "pt",
        "ron" => "ro",
        "rus" => "ru",
        "sin" => "si",
        "slk" => "sk",
        "slv" => "sl",
        "sna" => "sn",
        "spa" => "es",
        "srp" => "sr",
        "swe" => "sv",
        "tam" => "ta",
        "tel" => "te",
        "tgl" => "tl",
        "tha" => "th",
        "tuk" => "tk",
        "tur" => "tr",
        "ukr" => "uk",
        "urd" => "ur",
        "uzb" => "uz",
        "vie" => "vi",
        "yid" => "yi",
        "zul" => "zu",
        _ => return None,
    };
    Some(two)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redif::{collect, Template};

    const EN_TITLE: &str = "The effect of monetary policy on the consumption and the savings \
        of households: evidence from the housing market in the United States";
    const EN_ABSTRACT: &str = "We study how changes in interest rates affect the spending \
        decisions of households, using a large panel of survey data collected over twenty years.";
    const DE_TITLE: &str = "Die Auswirkungen der Geldpolitik auf den privaten Konsum und die Ersparnisse der Haushalte";

    fn with_language(value: &str) -> Record {
        collect(&Template {
            pairs: vec![("language".into(), value.into())],
        })
    }

    #[test]
    fn detects_english() {
        assert_eq!(detect(EN_ABSTRACT), Some("en"));
    }

    #[test]
    fn short_title_detected() {
        assert_eq!(detect("Monetary policy and inflation expectations"), Some("en"));
        assert_eq!(
            resolve(Some("Monetary policy and inflation expectations"), None, None).as_deref(),
            Some("en")
        );
    }

    #[test]
    fn agreement_wins_over_declaration() {
        let lang = resolve(Some(EN_TITLE), Some(EN_ABSTRACT), Some("fr".into()));
        assert_eq!(lang.as_deref(), Some("en"));
    }

    #[test]
    fn disagreement_falls_back_to_declared() {
        let lang = resolve(Some(DE_TITLE), Some(EN_ABSTRACT), Some("de".into()));
        assert_eq!(lang.as_deref(), Some("de"));
    }

    #[test]
    fn nothing_to_detect() {
        assert_eq!(resolve(None, None, None), None);
        assert_eq!(resolve(None, Some(""), Some("nl".into())).as_deref(), Some("nl"));
    }

    #[test]
    fn declared_language_validation() {
        assert_eq!(declared(&with_language("EN")).as_deref(), Some("en"));
        assert_eq!(declared(&with_language("english")), None);
        assert_eq!(declared(&with_language("e1")), None);
        assert_eq!(declared(&Record::default()), None);
    }
}
