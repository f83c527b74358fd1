//! Text extraction from Gmail-style MIME payload trees.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;

use crate::error::ChannelError;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Tags that break a line of visible text.
const BLOCK_TAGS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "tr", "td", "th", "table", "h1", "h2", "h3", "h4", "h5",
    "h6", "hr", "title", "blockquote", "section", "article", "header", "footer",
];

/// A node of a message payload, as returned by `messages.get?format=full`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl MessagePart {
    fn data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .filter(|d| !d.is_empty())
    }

    fn is(&self, mime: &str) -> bool {
        self.mime_type
            .split(';')
            .next()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(mime))
    }

    /// Depth-first, pre-order search for the first part of `mime` with data.
    fn find(&self, mime: &str) -> Option<&str> {
        if self.is(mime)
            && let Some(data) = self.data()
        {
            return Some(data);
        }
        self.parts.iter().find_map(|p| p.find(mime))
    }
}

/// Readable text of a payload: the first `text/plain` part, else the first
/// `text/html` part stripped to visible text, else `None`.
pub fn extract_text(payload: &MessagePart) -> Result<Option<String>, ChannelError> {
    if let Some(data) = payload.find("text/plain") {
        return decode_body(data).map(Some);
    }
    if let Some(data) = payload.find("text/html") {
        return decode_body(data).map(|html| Some(strip_html(&html)));
    }
    Ok(None)
}

/// Decode a base64 body, URL-safe alphabet first, standard as fallback.
pub fn decode_body(data: &str) -> Result<String, ChannelError> {
    let data: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = URL_SAFE_LENIENT
        .decode(&data)
        .or_else(|_| STANDARD_LENIENT.decode(&data))
        .map_err(|e| ChannelError::Decode(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reduce HTML to its visible text.
///
/// Script and style bodies and comments are dropped, common entities are
/// decoded and whitespace runs collapse to a single space.
pub fn strip_html(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut text = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(offset) = html[pos..].find('<') {
        let start = pos + offset;
        text.push_str(&html[pos..start]);

        if lower[start..].starts_with("<!--") {
            pos = lower[start..]
                .find("-->")
                .map(|i| start + i + 3)
                .unwrap_or(html.len());
            continue;
        }

        let Some(close) = html[start..].find('>') else {
            pos = html.len();
            break;
        };
        let end = start + close + 1;
        let tag = &lower[start + 1..end - 1];
        let closing = tag.starts_with('/');
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        pos = end;

        if !closing && (name == "script" || name == "style") {
            let end_tag = format!("</{name}");
            pos = match lower[end..].find(&end_tag) {
                Some(i) => lower[end + i..]
                    .find('>')
                    .map(|j| end + i + j + 1)
                    .unwrap_or(html.len()),
                None => html.len(),
            };
        }
        if BLOCK_TAGS.contains(&name.as_str()) {
            text.push(' ');
        }
    }
    text.push_str(&html[pos..]);

    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail[1..]
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..1 + semi]).map(|c| (c, semi + 2)));
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64url(s: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(s)
    }

    fn leaf(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: mime.into(),
            body: Some(PartBody {
                data: Some(b64url(text)),
            }),
            parts: vec![],
        }
    }

    fn multipart(mime: &str, parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: mime.into(),
            body: None,
            parts,
        }
    }

    #[test]
    fn nested_plain_text_wins() {
        let payload = multipart(
            "multipart/mixed",
            vec![
                multipart(
                    "multipart/alternative",
                    vec![
                        leaf("text/html", "<p>html version</p>"),
                        leaf("text/plain", "plain version"),
                    ],
                ),
                leaf("application/pdf", "%PDF"),
            ],
        );
        assert_eq!(
            extract_text(&payload).unwrap().as_deref(),
            Some("plain version")
        );
    }

    #[test]
    fn html_only_is_stripped() {
        let payload = multipart(
            "multipart/alternative",
            vec![leaf(
                "text/html; charset=UTF-8",
                "<html><body><p>We&#39;d like to <b>interview</b> you</p></body></html>",
            )],
        );
        assert_eq!(
            extract_text(&payload).unwrap().as_deref(),
            Some("We'd like to interview you")
        );
    }

    #[test]
    fn no_text_parts_is_absent() {
        let payload = multipart("multipart/mixed", vec![leaf("image/png", "binary")]);
        assert_eq!(extract_text(&payload).unwrap(), None);
    }

    #[test]
    fn empty_plain_part_falls_through_to_html() {
        let payload = multipart(
            "multipart/alternative",
            vec![leaf("text/plain", ""), leaf("text/html", "<div>hello</div>")],
        );
        assert_eq!(extract_text(&payload).unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn single_part_message_uses_root_body() {
        let payload = leaf("text/plain", "just text");
        assert_eq!(extract_text(&payload).unwrap().as_deref(), Some("just text"));
    }

    #[test]
    fn decode_accepts_both_alphabets_and_padding() {
        // "??>" encodes to "Pz8+" (standard) / "Pz8-" (url-safe)
        assert_eq!(decode_body("Pz8-").unwrap(), "??>");
        assert_eq!(decode_body("Pz8+").unwrap(), "??>");
        assert_eq!(decode_body("aGk").unwrap(), "hi");
        assert_eq!(decode_body("aGk=").unwrap(), "hi");
        assert_eq!(decode_body("aG\r\nk=").unwrap(), "hi");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_body("!!!not base64!!!"),
            Err(ChannelError::Decode(_))
        ));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let data = base64::engine::general_purpose::STANDARD.encode([b'o', b'k', 0xff]);
        assert_eq!(decode_body(&data).unwrap(), "ok\u{fffd}");
    }

    #[test]
    fn strip_html_drops_script_style_and_comments() {
        let html = concat!(
            "<style>p { color: red; }</style><p>Hello</p>",
            r#"<!-- hidden --><SCRIPT type="x">alert(1)</SCRIPT>World"#,
        );
        assert_eq!(strip_html(html), "Hello World");
    }

    #[test]
    fn strip_html_keeps_inline_words_together() {
        assert_eq!(strip_html("Ac<b>me</b> Corp"), "Acme Corp");
        assert_eq!(strip_html("line one<br>line two"), "line one line two");
    }

    #[test]
    fn strip_html_decodes_entities() {
        assert_eq!(
            strip_html("Tom &amp; Jerry&nbsp;&lt;3 &#x41;&#66; &bogus; &"),
            "Tom & Jerry <3 AB &bogus; &"
        );
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
        assert_eq!(strip_html(""), "");
    }
}
