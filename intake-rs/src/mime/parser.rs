use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use std::collections::HashMap;

use super::encoded_word::{
    decode_charset, decode_extended_bytes, decode_extended_value, decode_header, hex_pair,
    percent_decode,
};
use super::types::{MimePart, ParsedEmail};
use crate::error::{IntakeError, Result};
use tracing::warn;

/// Base64 as found in mail: padding optional, trailing bits tolerated.
pub(crate) const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Deepest multipart nesting we are willing to walk
const MAX_DEPTH: usize = 16;

/// Most RFC 2231 continuation sections joined for one parameter
const MAX_PARAMETER_SECTIONS: usize = 64;

/// MIME message parser
pub struct MimeParser;

impl MimeParser {
    /// Split a message into its top-level header fields and body.
    ///
    /// The header block must be well formed. It ends at the first empty line,
    /// or at the end of input when the message has no body. Input ending
    /// inside a header line is an error.
    pub fn split_message(message: &[u8]) -> Result<(HashMap<String, String>, &[u8])> {
        let mut offset = 0;

        for line in message.split_inclusive(|&b| b == b'\n') {
            if !line.ends_with(b"\n") {
                return Err(IntakeError::ProtocolParse(
                    "message ends inside the header block".to_string(),
                ));
            }

            if line == b"\r\n" || line == b"\n" {
                let block = String::from_utf8_lossy(&message[..offset]);
                let headers = Self::parse_headers(&block, true)
                    .map_err(IntakeError::ProtocolParse)?;
                return Ok((headers, &message[offset + line.len()..]));
            }

            offset += line.len();
        }

        if offset == 0 {
            return Err(IntakeError::ProtocolParse("empty message".to_string()));
        }

        let block = String::from_utf8_lossy(message);
        let headers = Self::parse_headers(&block, true).map_err(IntakeError::ProtocolParse)?;
        Ok((headers, &message[offset..]))
    }

    /// Walk the MIME structure below already parsed top-level headers.
    pub fn parse_body(headers: &HashMap<String, String>, body: &[u8]) -> Result<ParsedEmail> {
        let mut parsed = ParsedEmail::default();

        Self::walk(headers, body, 0, &mut parsed)?;

        Ok(parsed)
    }

    fn walk(
        headers: &HashMap<String, String>,
        body: &[u8],
        depth: usize,
        parsed: &mut ParsedEmail,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(IntakeError::BodyDecode(format!(
                "multipart nesting deeper than {}",
                MAX_DEPTH
            )));
        }

        let (content_type, params) = headers
            .get("content-type")
            .map(|value| Self::parse_header_params(value))
            .unwrap_or_default();
        let content_type = if content_type.is_empty() {
            "text/plain".to_string()
        } else {
            content_type
        };

        if content_type.starts_with("multipart/") {
            let boundary = Self::parameter(&params, "boundary")
                .filter(|b| !b.is_empty())
                .ok_or_else(|| {
                    IntakeError::BodyDecode(format!("{} without boundary", content_type))
                })?;

            for section in Self::parse_multipart(&boundary, body)? {
                let (part_headers, part_body) = Self::split_part(section);
                Self::walk(&part_headers, part_body, depth + 1, parsed)?;
            }

            return Ok(());
        }

        let part = Self::leaf_part(headers, content_type, &params, body);
        Self::categorize_part(parsed, part);
        Ok(())
    }

    /// Split a multipart section into headers and body. Sections are parsed
    /// leniently: malformed header lines are skipped.
    fn split_part(section: &[u8]) -> (HashMap<String, String>, &[u8]) {
        let mut offset = 0;

        for line in section.split_inclusive(|&b| b == b'\n') {
            if line == b"\r\n" || line == b"\n" {
                let block = String::from_utf8_lossy(&section[..offset]);
                let headers = Self::parse_headers(&block, false).unwrap_or_default();
                return (headers, &section[offset + line.len()..]);
            }
            offset += line.len();
        }

        // No body separator found, treat entire section as headers
        let block = String::from_utf8_lossy(section);
        (Self::parse_headers(&block, false).unwrap_or_default(), &[])
    }

    /// Parse email headers into HashMap, unfolding continuation lines.
    ///
    /// In strict mode any malformed line is an error.
    fn parse_headers(
        headers_str: &str,
        strict: bool,
    ) -> std::result::Result<HashMap<String, String>, String> {
        let mut headers = HashMap::new();
        let mut current_header: Option<(String, String)> = None;

        for line in headers_str.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation of previous header (folded header)
                match current_header {
                    Some((_, ref mut value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None if strict => {
                        return Err(format!("continuation line before any header: {:?}", line));
                    }
                    None => {}
                }
                continue;
            }

            if let Some((name, value)) = current_header.take() {
                headers.entry(name).or_insert(value);
            }

            match line.split_once(':') {
                Some((name, value)) if Self::is_field_name(name) => {
                    current_header = Some((name.to_ascii_lowercase(), value.trim().to_string()));
                }
                _ if strict => return Err(format!("malformed header line: {:?}", line)),
                _ => {}
            }
        }

        // Save last header
        if let Some((name, value)) = current_header {
            headers.entry(name).or_insert(value);
        }

        Ok(headers)
    }

    fn is_field_name(name: &str) -> bool {
        !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b))
    }

    /// Split a header value into its lowercased main value and parameters.
    ///
    /// `attachment; filename="a;b.pdf"` gives `("attachment", [("filename", "a;b.pdf")])`.
    fn parse_header_params(value: &str) -> (String, Vec<(String, String)>) {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut escaped = false;

        for ch in value.chars() {
            if escaped {
                current.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '\\' if in_quotes => escaped = true,
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
                _ => current.push(ch),
            }
        }
        segments.push(current);

        let mut segments = segments.into_iter();
        let main = segments
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let params = segments
            .filter_map(|segment| {
                let (name, value) = segment.split_once('=')?;
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                Some((name.trim().to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        (main, params)
    }

    /// Resolve a parameter, honouring RFC 2231 extended values and
    /// continuations and RFC 2047 encoded words in plain values.
    fn parameter(params: &[(String, String)], name: &str) -> Option<String> {
        let lookup = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        if let Some(value) = lookup(&format!("{}*", name)) {
            return Some(decode_extended_value(value));
        }

        // name*0, name*1*, ...
        let mut sections = Vec::new();
        for index in 0..MAX_PARAMETER_SECTIONS {
            if let Some(value) = lookup(&format!("{}*{}*", name, index)) {
                sections.push((true, value));
            } else if let Some(value) = lookup(&format!("{}*{}", name, index)) {
                sections.push((false, value));
            } else {
                break;
            }
        }

        if !sections.is_empty() {
            return Some(Self::join_sections(&sections));
        }

        lookup(name).map(|value| decode_header(value).unwrap_or_else(|_| value.to_string()))
    }

    fn join_sections(sections: &[(bool, &str)]) -> String {
        if !sections.iter().any(|(extended, _)| *extended) {
            return sections.iter().map(|(_, value)| *value).collect();
        }

        let mut charset = "";
        let mut bytes = Vec::new();
        for (index, (extended, value)) in sections.iter().enumerate() {
            if !extended {
                bytes.extend_from_slice(value.as_bytes());
                continue;
            }

            let mut encoded = *value;
            if index == 0 {
                let mut fields = value.splitn(3, '\'');
                if let (Some(cs), Some(_language), Some(rest)) =
                    (fields.next(), fields.next(), fields.next())
                {
                    charset = cs;
                    encoded = rest;
                }
            }
            bytes.extend(percent_decode(encoded));
        }

        decode_extended_bytes(charset, &bytes)
    }

    /// Split a multipart body into its sections.
    ///
    /// Delimiters are only recognised at the start of a line. The line break
    /// before a delimiter belongs to the delimiter. A missing close delimiter
    /// is tolerated.
    fn parse_multipart<'a>(boundary: &str, body: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        let boundary_marker = format!("--{}", boundary);
        let mut parts = Vec::new();
        let mut part_start: Option<usize> = None;
        let mut seen_delimiter = false;
        let mut offset = 0;

        for line in body.split_inclusive(|&b| b == b'\n') {
            let line_start = offset;
            offset += line.len();

            let Some(rest) = line.strip_prefix(boundary_marker.as_bytes()) else {
                continue;
            };
            let (is_close, rest) = match rest.strip_prefix(b"--") {
                Some(rest) => (true, rest),
                None => (false, rest),
            };
            if !rest.iter().all(|b| b.is_ascii_whitespace()) {
                // Longer boundary that merely shares our prefix
                continue;
            }

            seen_delimiter = true;
            if let Some(start) = part_start.take() {
                parts.push(Self::strip_line_break(&body[start..line_start]));
            }
            if is_close {
                return Ok(parts);
            }
            part_start = Some(offset);
        }

        if !seen_delimiter {
            return Err(IntakeError::BodyDecode(format!(
                "multipart boundary {:?} not found",
                boundary
            )));
        }

        if let Some(start) = part_start {
            parts.push(&body[start..]);
        }

        Ok(parts)
    }

    fn strip_line_break(section: &[u8]) -> &[u8] {
        section
            .strip_suffix(b"\r\n")
            .or_else(|| section.strip_suffix(b"\n"))
            .unwrap_or(section)
    }

    fn leaf_part(
        headers: &HashMap<String, String>,
        content_type: String,
        params: &[(String, String)],
        body: &[u8],
    ) -> MimePart {
        let (disposition, disposition_params) = headers
            .get("content-disposition")
            .map(|value| Self::parse_header_params(value))
            .unwrap_or_default();

        let encoding = headers
            .get("content-transfer-encoding")
            .map(|e| e.trim().to_ascii_lowercase());

        let filename = Self::parameter(&disposition_params, "filename")
            .or_else(|| Self::parameter(params, "name"));

        let is_text_body = content_type == "text/plain" || content_type == "text/html";
        let is_attachment = match disposition.as_str() {
            "attachment" => true,
            "inline" => false,
            _ => !is_text_body,
        };

        let body = Self::decode_body(encoding.as_deref(), body);

        MimePart {
            charset: Self::parameter(params, "charset"),
            content_type,
            filename,
            body,
            is_attachment,
        }
    }

    /// Categorize MIME part into text/HTML/attachment
    fn categorize_part(parsed: &mut ParsedEmail, part: MimePart) {
        if part.is_attachment {
            parsed.attachments.push(part);
        } else if part.content_type == "text/plain" {
            if parsed.text_body.is_none() {
                parsed.text_body = Some(Self::part_text(&part));
            }
        } else if part.content_type == "text/html" {
            if parsed.html_body.is_none() {
                parsed.html_body = Some(Self::part_text(&part));
            }
        }
        // Anything else is an inline resource (e.g. an embedded image)
    }

    /// Convert a text part to UTF-8; unknown charsets degrade to lossy UTF-8.
    fn part_text(part: &MimePart) -> String {
        part.charset
            .as_deref()
            .and_then(|charset| decode_charset(charset, &part.body))
            .unwrap_or_else(|| String::from_utf8_lossy(&part.body).into_owned())
    }

    /// Decode message body based on Content-Transfer-Encoding
    fn decode_body(encoding: Option<&str>, body: &[u8]) -> Vec<u8> {
        match encoding {
            Some(e) if e.contains("base64") => Self::decode_base64(body),
            Some(e) if e.contains("quoted-printable") => Self::decode_quoted_printable(body),
            // 7bit, 8bit, binary - no decoding needed
            _ => body.to_vec(),
        }
    }

    /// Decode base64 content. Bytes outside the alphabet are dropped with a
    /// warning; a dangling final character carries no data and is dropped too.
    fn decode_base64(content: &[u8]) -> Vec<u8> {
        let mut cleaned: Vec<u8> = content
            .iter()
            .filter(|&&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
            .copied()
            .collect();

        let dropped = content
            .iter()
            .filter(|&&b| !b.is_ascii_whitespace() && b != b'=')
            .count()
            - cleaned.len();
        if dropped > 0 {
            warn!(dropped, "Invalid bytes in base64 content ignored");
        }

        if cleaned.len() % 4 == 1 {
            cleaned.pop();
        }

        BASE64.decode(&cleaned).unwrap_or_else(|e| {
            warn!(error = %e, "Undecodable base64 content kept empty");
            Vec::new()
        })
    }

    /// Decode quoted-printable content
    fn decode_quoted_printable(content: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(content.len());
        let mut i = 0;

        while i < content.len() {
            if content[i] == b'=' {
                // Soft line break, possibly with trailing whitespace
                let mut j = i + 1;
                while j < content.len() && (content[j] == b' ' || content[j] == b'\t') {
                    j += 1;
                }
                if content[j..].starts_with(b"\r\n") {
                    i = j + 2;
                    continue;
                }
                if content[j..].starts_with(b"\n") || j == content.len() {
                    i = j + 1;
                    continue;
                }

                // Hex-encoded byte
                if let Some(byte) = content
                    .get(i + 1..i + 3)
                    .and_then(|pair| hex_pair(pair[0], pair[1]))
                {
                    result.push(byte);
                    i += 3;
                    continue;
                }
            }

            // Invalid encoding, keep as-is
            result.push(content[i]);
            i += 1;
        }

        result
    }
}
