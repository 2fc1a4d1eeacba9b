//! Message body rendering.
//!
//! Turns the raw bytes of one message into a self-contained HTML document:
//! the preferred body part (HTML, else plain text inside `<pre>`) with every
//! `cid:` image reference replaced by an inline `data:` URI, so the document
//! needs nothing else from the archive to display.

use std::collections::HashMap;

use base64::Engine;
use mail_parser::{MessageParser, MimeHeaders, PartType};
use tracing::debug;

use crate::error::{MboxError, Result};
use crate::model::record::MessageKey;
use crate::parser::mbox::strip_bom;
use crate::store::archive::ArchiveStore;

/// Render raw message bytes (separator line optional) into an HTML document.
pub fn render_document(raw: &[u8]) -> Result<String> {
    let message = MessageParser::default()
        .parse(skip_separator(raw))
        .ok_or_else(|| MboxError::Render("message could not be parsed".to_string()))?;

    let mut images: HashMap<String, String> = HashMap::new();
    let mut html_body: Option<String> = None;
    let mut text_body: Option<String> = None;

    for part in &message.parts {
        let (ctype, subtype) = match part.content_type() {
            Some(ct) => (
                ct.ctype().to_ascii_lowercase(),
                ct.subtype().map(str::to_ascii_lowercase),
            ),
            None => ("text".to_string(), Some("plain".to_string())),
        };

        if ctype == "image" {
            if let Some(cid) = part.content_id() {
                let cid = cid.trim().trim_start_matches('<').trim_end_matches('>');
                let mime = match &subtype {
                    Some(sub) => format!("image/{sub}"),
                    None => "image".to_string(),
                };
                let payload = base64::engine::general_purpose::STANDARD.encode(part.contents());
                images.insert(cid.to_string(), format!("data:{mime};base64,{payload}"));
            }
            continue;
        }

        let is_attachment = part
            .content_disposition()
            .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"));
        if is_attachment {
            continue;
        }

        match &part.body {
            PartType::Html(html) => html_body = Some(html.to_string()),
            PartType::Text(text) if subtype.as_deref() == Some("plain") => {
                text_body = Some(text.to_string())
            }
            _ => {}
        }
    }

    let mut document = match html_body {
        Some(html) => html,
        None => format!("<pre>{}</pre>", escape_html(text_body.as_deref().unwrap_or(""))),
    };
    for (cid, uri) in &images {
        document = document.replace(&format!("cid:{cid}"), uri);
    }
    Ok(document)
}

/// Fetch and render one message. Never fails: errors become an inline
/// error document.
pub fn render_message(store: &ArchiveStore, key: MessageKey) -> String {
    match store.fetch_raw(key).and_then(|raw| render_document(&raw)) {
        Ok(document) => document,
        Err(e) => {
            debug!(key = %key, error = %e, "Rendering error document");
            error_document(&e)
        }
    }
}

/// The document shown in place of a message that could not be read.
pub fn error_document(error: &MboxError) -> String {
    format!(
        "<h3>Error reading email</h3><p>{}</p>",
        escape_html(&error.to_string())
    )
}

fn skip_separator(raw: &[u8]) -> &[u8] {
    let raw = strip_bom(raw);
    if raw.starts_with(b"From ") {
        if let Some(pos) = raw.iter().position(|&b| b == b'\n') {
            return &raw[pos + 1..];
        }
    }
    raw
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Convert a rendered document to plain text for the terminal.
///
/// Block elements become line breaks, `<li>` becomes a `- ` bullet, script
/// and style contents are dropped, `<pre>` keeps its whitespace, common
/// entities are decoded and runs of blank lines collapse to one.
/// Leading indentation is not preserved, even inside `<pre>`.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.char_indices().peekable();
    let mut skip_until: Option<&'static str> = None;
    let mut pre_depth = 0usize;

    while let Some((i, ch)) = chars.next() {
        if ch != '<' {
            if skip_until.is_none() {
                if pre_depth == 0 && (ch == '\n' || ch == '\r' || ch == '\t') {
                    out.push(' ');
                } else {
                    out.push(ch);
                }
            }
            continue;
        }

        let Some(end) = html[i..].find('>') else {
            if skip_until.is_none() {
                out.push_str(&html[i..]);
            }
            break;
        };
        let tag = &html[i + 1..i + end];
        while chars.peek().is_some_and(|&(j, _)| j <= i + end) {
            chars.next();
        }

        let closing = tag.starts_with('/');
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        if let Some(block) = skip_until {
            if closing && name == block {
                skip_until = None;
            }
            continue;
        }

        match name.as_str() {
            "script" if !closing => skip_until = Some("script"),
            "style" if !closing => skip_until = Some("style"),
            "head" if !closing => skip_until = Some("head"),
            "pre" => {
                pre_depth = if closing { pre_depth.saturating_sub(1) } else { pre_depth + 1 };
                out.push('\n');
            }
            "li" if !closing => out.push_str("\n- "),
            "br" | "p" | "div" | "tr" | "table" | "ul" | "ol" | "blockquote" | "hr"
            | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => out.push('\n'),
            "td" | "th" if closing => out.push(' '),
            _ => {}
        }
    }

    let decoded = decode_entities(&out);

    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_blank = true;
    for line in decoded.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !prev_blank {
                cleaned.push('\n');
                prev_blank = true;
            }
        } else {
            cleaned.push_str(line);
            cleaned.push('\n');
            prev_blank = false;
        }
    }
    cleaned.trim().to_string()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..]
            .find(';')
            .filter(|&semi| semi <= 8)
            .and_then(|semi| entity_char(&rest[1..semi + 1]).map(|c| (c, semi + 2)));
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity_char(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(|c| if c == '\u{a0}' { ' ' } else { c });
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "copy" => '\u{a9}',
        _ => return None,
    })
}
