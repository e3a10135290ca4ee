/// A leaf MIME part (text, HTML, inline resource or attachment)
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Lowercased media type without parameters (e.g. "text/plain")
    pub content_type: String,
    /// `charset` parameter of the Content-Type header
    pub charset: Option<String>,
    /// Decoded filename from Content-Disposition or Content-Type
    pub filename: Option<String>,
    /// Body with the transfer encoding removed
    pub body: Vec<u8>,
    /// Whether this part is an attachment
    pub is_attachment: bool,
}

/// Parsed email body with separated parts
#[derive(Debug, Clone, Default)]
pub struct ParsedEmail {
    /// Plain text body (if present)
    pub text_body: Option<String>,
    /// HTML body (if present)
    pub html_body: Option<String>,
    /// Attachments in the order they appear in the message
    pub attachments: Vec<MimePart>,
}

impl ParsedEmail {
    /// Best human-readable body: the plain text part, else the HTML part
    /// with markup removed. Trailing whitespace is trimmed.
    pub fn text(&self) -> String {
        if let Some(text) = self.text_body.as_deref() {
            if !text.trim().is_empty() {
                return text.replace("\r\n", "\n").trim_end().to_string();
            }
        }

        self.html_body
            .as_deref()
            .map(strip_html)
            .unwrap_or_default()
    }
}

/// Elements whose content is never readable text
const HIDDEN_ELEMENTS: [&str; 2] = ["script", "style"];

/// Strip HTML tags from content (basic). The contents of `<script>` and
/// `<style>` elements are dropped as well.
pub fn strip_html(html: &str) -> String {
    let visible = remove_hidden_elements(html);

    let mut result = String::new();
    let mut in_tag = false;
    for ch in visible.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    let result = result
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut every hidden element, start tag through end tag. An unclosed element
/// hides the rest of the document.
fn remove_hidden_elements(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets valid for `html`
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some((start, name)) = next_hidden_start(&lower, pos) {
        out.push_str(&html[pos..start]);

        let close = format!("</{}", name);
        pos = match lower[start..].find(&close) {
            Some(offset) => {
                let close_start = start + offset;
                match lower[close_start..].find('>') {
                    Some(end) => close_start + end + 1,
                    None => html.len(),
                }
            }
            None => html.len(),
        };
    }

    out.push_str(&html[pos..]);
    out
}

fn next_hidden_start(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    HIDDEN_ELEMENTS
        .iter()
        .filter_map(|name| {
            let open = format!("<{}", name);
            let mut search = from;
            while let Some(offset) = lower[search..].find(&open) {
                let start = search + offset;
                let after = lower[start + open.len()..].chars().next();
                let at_boundary = match after {
                    None | Some('>') | Some('/') => true,
                    Some(ch) => ch.is_whitespace(),
                };
                if at_boundary {
                    return Some((start, *name));
                }
                search = start + open.len();
            }
            None
        })
        .min_by_key(|(start, _)| *start)
}
