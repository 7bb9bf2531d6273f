use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use tracing::debug;

use crate::errors::{IngestError, IngestResult};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const MARKER: &str = "template-type";

/// Bytes that windows-1252 leaves undefined.
const CP1252_UNDEFINED: &[u8] = &[0x81, 0x8D, 0x8F, 0x90, 0x9D];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Candidate {
    Utf8Bom,
    Hinted(&'static Encoding),
    Windows1252,
    Utf8,
    Utf16,
    Latin1,
}

const FIXED_ORDER: &[Candidate] = &[
    Candidate::Windows1252,
    Candidate::Utf8,
    Candidate::Utf16,
    Candidate::Latin1,
];

/// Decode a ReDIF document, guessing its encoding.
///
/// A candidate wins only if it decodes cleanly *and* the result mentions
/// `template-type`; windows-1252 accepts nearly any byte string, so a clean
/// decode alone proves nothing. The transport hint is tried early but is
/// validated like every other candidate.
pub fn decode(bytes: &[u8], hint: Option<&str>) -> IngestResult<String> {
    for candidate in candidates(bytes, hint) {
        let Some(text) = try_decode(bytes, candidate) else {
            continue;
        };
        if text.to_lowercase().contains(MARKER) {
            debug!(?candidate, "decoded document");
            return Ok(text.into_owned());
        }
    }
    Err(IngestError::Decoding)
}

fn candidates(bytes: &[u8], hint: Option<&str>) -> Vec<Candidate> {
    let mut order = Vec::with_capacity(FIXED_ORDER.len() + 2);
    if bytes.starts_with(UTF8_BOM) {
        order.push(Candidate::Utf8Bom);
    }
    if let Some(enc) = hint.and_then(|h| Encoding::for_label(h.trim().as_bytes())) {
        order.push(Candidate::Hinted(enc));
    }
    order.extend_from_slice(FIXED_ORDER);
    order
}

fn try_decode(bytes: &[u8], candidate: Candidate) -> Option<Cow<'_, str>> {
    match candidate {
        Candidate::Utf8Bom => {
            UTF_8.decode_without_bom_handling_and_without_replacement(&bytes[UTF8_BOM.len()..])
        }
        Candidate::Hinted(enc) if enc == WINDOWS_1252 => try_decode(bytes, Candidate::Windows1252),
        Candidate::Hinted(enc) if enc == UTF_16LE || enc == UTF_16BE => {
            try_decode(bytes, Candidate::Utf16)
        }
        Candidate::Hinted(enc) => enc.decode_without_bom_handling_and_without_replacement(bytes),
        Candidate::Windows1252 => {
            if bytes.iter().any(|b| CP1252_UNDEFINED.contains(b)) {
                return None;
            }
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            Some(text)
        }
        Candidate::Utf8 => UTF_8.decode_without_bom_handling_and_without_replacement(bytes),
        Candidate::Utf16 => {
            let (enc, body) = match bytes {
                [0xFF, 0xFE, rest @ ..] => (UTF_16LE, rest),
                [0xFE, 0xFF, rest @ ..] => (UTF_16BE, rest),
                _ => (UTF_16LE, bytes),
            };
            if body.len() % 2 != 0 {
                return None;
            }
            enc.decode_without_bom_handling_and_without_replacement(body)
        }
        Candidate::Latin1 => Some(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())),
    }
}
