use crate::error::{IntakeError, Result};
use crate::mime::decode_header;

const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_ADDRESS_LEN: usize = 254;

/// An RFC 5322 mailbox: optional display name plus `local@domain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub local_part: String,
    pub domain: String,
}

impl Mailbox {
    /// The bare `local@domain` form
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }
}

/// Parse a single mailbox.
///
/// Accepted forms: `"Display Name" <local@domain>`, `Name <local@domain>`,
/// `<local@domain>` and bare `local@domain`. Display names may carry
/// RFC 2047 encoded words.
pub fn parse_mailbox(input: &str) -> Result<Mailbox> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IntakeError::address(input, "empty address"));
    }

    let (name, addr_spec) = match trimmed.strip_suffix('>') {
        Some(rest) => {
            let open = rest
                .rfind('<')
                .ok_or_else(|| IntakeError::address(input, "unbalanced angle brackets"))?;
            (display_name(&rest[..open]), rest[open + 1..].trim())
        }
        None if trimmed.contains(['<', '>']) => {
            return Err(IntakeError::address(input, "unbalanced angle brackets"));
        }
        None => (None, trimmed),
    };

    let addr_spec = strip_source_route(addr_spec);
    if addr_spec.is_empty() {
        return Err(IntakeError::address(input, "null address"));
    }
    if addr_spec.len() > MAX_ADDRESS_LEN {
        return Err(IntakeError::address(input, "address too long"));
    }

    // The local part may be quoted and contain '@', the domain never does
    let at = addr_spec
        .rfind('@')
        .ok_or_else(|| IntakeError::address(input, "missing @"))?;
    let (local_part, domain) = (&addr_spec[..at], &addr_spec[at + 1..]);

    validate_local_part(local_part).map_err(|reason| IntakeError::address(input, reason))?;
    validate_domain(domain).map_err(|reason| IntakeError::address(input, reason))?;

    Ok(Mailbox {
        name,
        local_part: local_part.to_string(),
        domain: domain.to_string(),
    })
}

fn display_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let unquoted = match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(inner) => unescape_quoted(inner),
        None => raw.to_string(),
    };

    let decoded = decode_header(&unquoted).unwrap_or(unquoted);
    let decoded = decoded.trim();
    (!decoded.is_empty()).then(|| decoded.to_string())
}

/// `<@relay1,@relay2:user@host>` is still accepted by some clients in MAIL FROM
fn strip_source_route(addr_spec: &str) -> &str {
    if addr_spec.starts_with('@') {
        if let Some((_, rest)) = addr_spec.split_once(':') {
            return rest;
        }
    }
    addr_spec
}

fn unescape_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(ch) || !ch.is_ascii()
}

fn validate_dot_atom(text: &str, what: &str) -> std::result::Result<(), String> {
    if text.is_empty() {
        return Err(format!("empty {}", what));
    }
    for atom in text.split('.') {
        if atom.is_empty() {
            return Err(format!("{} has an empty label", what));
        }
        if let Some(bad) = atom.chars().find(|c| !is_atext(*c)) {
            return Err(format!("invalid character {:?} in {}", bad, what));
        }
    }
    Ok(())
}

fn validate_local_part(local: &str) -> std::result::Result<(), String> {
    if local.len() > MAX_LOCAL_PART_LEN {
        return Err("local part too long".to_string());
    }

    if let Some(inner) = local.strip_prefix('"') {
        let inner = inner
            .strip_suffix('"')
            .ok_or_else(|| "unterminated quoted local part".to_string())?;

        let mut escaped = false;
        for ch in inner.chars() {
            if ch == '\r' || ch == '\n' {
                return Err("line break in quoted local part".to_string());
            }
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                return Err("unescaped quote in local part".to_string());
            }
        }
        return if escaped {
            Err("dangling escape in local part".to_string())
        } else {
            Ok(())
        };
    }

    validate_dot_atom(local, "local part")
}

fn validate_domain(domain: &str) -> std::result::Result<(), String> {
    if let Some(literal) = domain.strip_prefix('[') {
        let literal = literal
            .strip_suffix(']')
            .ok_or_else(|| "unterminated domain literal".to_string())?;
        if literal.is_empty() || literal.contains(['[', ']', '\\']) || literal.contains(char::is_whitespace) {
            return Err("invalid domain literal".to_string());
        }
        return Ok(());
    }

    validate_dot_atom(domain, "domain")
}
