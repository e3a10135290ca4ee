//! Header value decoding: RFC 2047 encoded words and RFC 2231 extended
//! parameter values.

use std::fmt;
use std::sync::OnceLock;

use base64::Engine as _;
use encoding_rs::Encoding;
use regex::Regex;

use super::parser::BASE64;

fn encoded_word() -> &'static Regex {
    static ENCODED_WORD: OnceLock<Regex> = OnceLock::new();
    ENCODED_WORD.get_or_init(|| {
        Regex::new(r"=\?([^?\s]+)\?([bBqQ])\?([^?\s]*)\?=").expect("encoded-word pattern is valid")
    })
}

/// An encoded word named a charset we cannot convert from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCharset(pub String);

impl fmt::Display for UnknownCharset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unhandled charset {:?}", self.0)
    }
}

impl std::error::Error for UnknownCharset {}

/// Decode every RFC 2047 encoded word in an unstructured header value.
///
/// Whitespace between two adjacent encoded words is dropped. Words that are
/// malformed (bad base64, unknown transfer encoding) are kept literally; only
/// a charset we have no converter for is an error.
pub fn decode_header(value: &str) -> Result<String, UnknownCharset> {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    let mut after_word = false;

    for caps in encoded_word().captures_iter(value) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &value[last..whole.start()];

        match decode_word(&caps[1], &caps[2], &caps[3])? {
            Some(decoded) => {
                if !(after_word && gap.chars().all(char::is_whitespace)) {
                    out.push_str(gap);
                }
                out.push_str(&decoded);
                after_word = true;
            }
            None => {
                out.push_str(gap);
                out.push_str(whole.as_str());
                after_word = false;
            }
        }

        last = whole.end();
    }

    out.push_str(&value[last..]);
    Ok(out)
}

fn decode_word(charset: &str, encoding: &str, text: &str) -> Result<Option<String>, UnknownCharset> {
    let bytes = if encoding.eq_ignore_ascii_case("b") {
        match BASE64.decode(text) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        }
    } else {
        q_decode(text)
    };

    // RFC 2231 allows a language suffix: =?utf-8*en?Q?...?=
    let charset = charset.split('*').next().unwrap_or(charset);

    decode_charset(charset, &bytes)
        .map(Some)
        .ok_or_else(|| UnknownCharset(charset.to_string()))
}

/// The "Q" encoding: quoted-printable where `_` stands for a space.
fn q_decode(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => match bytes.get(i + 1..i + 3).and_then(|pair| hex_pair(pair[0], pair[1])) {
                Some(byte) => {
                    out.push(byte);
                    i += 2;
                }
                None => out.push(b'='),
            },
            b => out.push(b),
        }
        i += 1;
    }

    out
}

pub(crate) fn hex_pair(high: u8, low: u8) -> Option<u8> {
    let high = (high as char).to_digit(16)?;
    let low = (low as char).to_digit(16)?;
    Some((high * 16 + low) as u8)
}

/// Convert `bytes` from the named charset to UTF-8.
///
/// Returns `None` when the label is not a charset `encoding_rs` knows.
pub fn decode_charset(label: &str, bytes: &[u8]) -> Option<String> {
    let encoding = Encoding::for_label_no_replacement(label.trim().as_bytes())?;
    Some(encoding.decode_without_bom_handling(bytes).0.into_owned())
}

/// Decode an RFC 2231 extended value (`utf-8'en'%D0%A4%D0%B0%D0%B9%D0%BB`).
///
/// Unknown charsets fall back to lossy UTF-8.
pub fn decode_extended_value(value: &str) -> String {
    let mut fields = value.splitn(3, '\'');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(charset), Some(_language), Some(encoded)) => {
            decode_extended_bytes(charset, &percent_decode(encoded))
        }
        _ => String::from_utf8_lossy(&percent_decode(value)).into_owned(),
    }
}

pub(crate) fn decode_extended_bytes(charset: &str, bytes: &[u8]) -> String {
    if charset.is_empty() {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    decode_charset(charset, bytes).unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

pub(crate) fn percent_decode(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(byte) = bytes.get(i + 1..i + 3).and_then(|pair| hex_pair(pair[0], pair[1])) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(decode_header("hello world").unwrap(), "hello world");
        assert_eq!(decode_header("").unwrap(), "");
    }

    #[test]
    fn test_rfc2047_examples() {
        assert_eq!(decode_header("=?US-ASCII?Q?Keith_Moore?=").unwrap(), "Keith Moore");
        assert_eq!(
            decode_header("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?=").unwrap(),
            "Keld Jørn Simonsen"
        );
        assert_eq!(decode_header("=?ISO-8859-1?Q?Andr=E9?= Pirard").unwrap(), "André Pirard");
        assert_eq!(
            decode_header("=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=").unwrap(),
            "If you can read this yo"
        );
    }

    #[test]
    fn test_whitespace_between_encoded_words_is_dropped() {
        assert_eq!(decode_header("(=?ISO-8859-1?Q?a?= =?ISO-8859-1?Q?b?=)").unwrap(), "(ab)");
        assert_eq!(
            decode_header("(=?ISO-8859-1?Q?a?=  \r\n    =?ISO-8859-1?Q?b?=)").unwrap(),
            "(ab)"
        );
        assert_eq!(decode_header("(=?ISO-8859-1?Q?a?= b)").unwrap(), "(a b)");
        assert_eq!(decode_header("(a =?ISO-8859-1?Q?b?=)").unwrap(), "(a b)");
    }

    #[test]
    fn test_utf8_base64_round_trip() {
        let original = "Привет, мир! Отчёт за октябрь";
        let encoded = format!("=?UTF-8?B?{}?=", BASE64.encode(original.as_bytes()));
        assert_eq!(decode_header(&encoded).unwrap(), original);
    }

    #[test]
    fn test_word_split_mid_character_degrades() {
        // Mailers split long subjects into several words, possibly mid-character.
        let original = "Счёт №42";
        let bytes = original.as_bytes();
        let (first, second) = bytes.split_at(3);
        let encoded = format!(
            "=?utf-8?B?{}?=\r\n =?utf-8?B?{}?=",
            BASE64.encode(first),
            BASE64.encode(second)
        );
        // Each word is converted on its own, so a split character degrades to
        // replacement characters rather than failing.
        let decoded = decode_header(&encoded).unwrap();
        assert!(decoded.ends_with("ёт №42"));
    }

    #[test]
    fn test_koi8r_subject() {
        // "Тест" in KOI8-R
        let encoded = "=?koi8-r?B?9MXT1A==?=";
        assert_eq!(decode_header(encoded).unwrap(), "Тест");
    }

    #[test]
    fn test_language_suffix() {
        assert_eq!(decode_header("=?US-ASCII*EN?Q?Keith_Moore?=").unwrap(), "Keith Moore");
    }

    #[test]
    fn test_unknown_charset_is_error() {
        let err = decode_header("=?x-no-such-charset?B?aGk=?=").unwrap_err();
        assert_eq!(err, UnknownCharset("x-no-such-charset".to_string()));
    }

    #[test]
    fn test_malformed_base64_is_kept_literally() {
        assert_eq!(decode_header("=?utf-8?B?***?=").unwrap(), "=?utf-8?B?***?=");
    }

    #[test]
    fn test_q_decode_invalid_escape_kept() {
        assert_eq!(q_decode("a=ZZb"), b"a=ZZb");
        assert_eq!(q_decode("a=3"), b"a=3");
        assert_eq!(q_decode("a=3Db"), b"a=b");
    }

    #[test]
    fn test_extended_value() {
        assert_eq!(
            decode_extended_value("utf-8''%D0%BE%D1%82%D1%87%D1%91%D1%82.pdf"),
            "отчёт.pdf"
        );
        assert_eq!(decode_extended_value("iso-8859-1'en'%A3%20rates"), "£ rates");
        assert_eq!(decode_extended_value("plain%20name"), "plain name");
    }
}
