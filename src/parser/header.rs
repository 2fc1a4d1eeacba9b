//! Header extraction: folding, encoded-words (RFC 2047), date parsing and
//! folder classification.
//!
//! Everything here is pure. Malformed input never produces an error; missing
//! or undecodable fields fall back to fixed defaults.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use tracing::debug;

use crate::model::record::{Folder, HeaderRecord, MessageKey, MAX_FIELD_CHARS};
use crate::parser::mbox::{is_mbox_separator, strip_bom};

/// Sender shown when the `From:` header is missing or empty.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Subject shown when the `Subject:` header is missing or empty.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Characters of the raw `Date:` value kept when it cannot be parsed.
const RAW_DATE_CHARS: usize = 20;

/// Encoded words in the wild often drop their padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Build a [`HeaderRecord`] from the raw bytes of one message.
///
/// The leading `From ` separator is skipped and only the header block (up to
/// the first blank line) is examined.
pub fn extract_record(key: MessageKey, raw: &[u8]) -> HeaderRecord {
    let text = decode_header_bytes(header_block(raw));
    let headers = unfold_headers(&text);

    let sender = get_header(&headers, "from")
        .map(|v| decode_encoded_words(&v))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());

    let subject = get_header(&headers, "subject")
        .map(|v| decode_encoded_words(&v))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let timestamp = get_header(&headers, "date")
        .map(|d| format_timestamp(&d))
        .unwrap_or_default();

    let labels = get_header(&headers, "x-gmail-labels")
        .map(|l| decode_encoded_words(&l))
        .unwrap_or_default();

    HeaderRecord {
        key,
        sender: truncate_chars(&sender, MAX_FIELD_CHARS),
        subject: truncate_chars(&subject, MAX_FIELD_CHARS),
        timestamp,
        folder: classify_folder(&labels),
    }
}

/// Classify a message from its (comma-separated) Gmail labels.
///
/// First match wins: Sent, Trash/Bin, Spam, Draft, Archived, else Inbox.
/// Matching is a case-insensitive substring test.
pub fn classify_folder(labels: &str) -> Folder {
    let labels = labels.to_lowercase();
    if labels.contains("sent") {
        Folder::Sent
    } else if labels.contains("trash") || labels.contains("bin") {
        Folder::Trash
    } else if labels.contains("spam") {
        Folder::Spam
    } else if labels.contains("draft") {
        Folder::Drafts
    } else if labels.contains("archived") {
        Folder::Archived
    } else {
        Folder::Inbox
    }
}

/// Format a `Date:` value as `YYYY-MM-DD HH:MM` in its own offset.
///
/// Unparseable values are returned raw, truncated to 20 characters.
pub fn format_timestamp(date_str: &str) -> String {
    match parse_date(date_str) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => {
            debug!(date = date_str, "Could not parse date, keeping raw value");
            truncate_chars(date_str.trim(), RAW_DATE_CHARS)
        }
    }
}

/// Return at most `max` characters of `s`.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Slice the header block out of a raw message: skip the `From ` line and
/// stop at the first blank line.
fn header_block(raw: &[u8]) -> &[u8] {
    let mut data = strip_bom(raw);
    if is_mbox_separator(data) {
        data = match data.iter().position(|&b| b == b'\n') {
            Some(pos) => &data[pos + 1..],
            None => &[],
        };
    }

    let mut pos = 0;
    for line in data.split_inclusive(|&b| b == b'\n') {
        if line == b"\n" || line == b"\r\n" {
            break;
        }
        pos += line.len();
    }
    &data[..pos]
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Get the first value for a header name (case-insensitive).
fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some((text, consumed)) = decode_one_word(after_start) {
            result.push_str(&text);
            remaining = &after_start[consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=` and report how many bytes it spanned.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let (charset, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let encoded_text = &rest[..end];
    let consumed = charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding {
        "B" | "b" => {
            let compact: String = encoded_text.split_whitespace().collect();
            LENIENT_BASE64.decode(compact.as_bytes()).ok()?
        }
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some((decode_charset(charset, &bytes), consumed))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match hex_pair(bytes[i + 1], bytes[i + 2]) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Decode bytes using a named charset. Unknown charsets fall back to lossy UTF-8.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 allows a language suffix: "utf-8*en"
    let label = charset.split('*').next().unwrap_or(charset);
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        None => {
            debug!(charset = label, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Parse an email date string in various common formats.
///
/// The returned value keeps the offset written in the header. Dates without
/// an offset are taken as UTC. Supports RFC 2822, ISO 8601, and many broken
/// real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    // Drop trailing comments such as "(UTC)" or "(PST)"
    let no_comment = match trimmed.find(" (") {
        Some(pos) if trimmed.ends_with(')') => trimmed[..pos].trim(),
        _ => trimmed,
    };
    let no_dow = strip_day_of_week(no_comment);
    let imap = normalize_imap_date(&no_dow);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    let utc = FixedOffset::east_opt(0)?;
    for candidate in [no_dow.clone(), imap.clone(), replace_named_tz(&no_dow), replace_named_tz(&imap)] {
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
                return Some(dt);
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
                return Some(utc.from_utc_datetime(&ndt));
            }
        }
    }

    mail_parser_date(trimmed)
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<DateTime<FixedOffset>> {
    use mail_parser::MessageParser;

    // Wrap input in a minimal RFC 5322 message so mail-parser can parse it
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt).ok()
}

/// Normalize IMAP-style dates: `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    if !s.contains('-') {
        return s.to_string();
    }
    let lower = s.to_lowercase();
    for month in MONTHS {
        let pattern = format!("-{}-", month.to_lowercase());
        if let Some(pos) = lower.find(&pattern) {
            let mut result = s.to_string();
            result.replace_range(pos..pos + pattern.len(), &format!(" {month} "));
            return result;
        }
    }
    s.to_string()
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            if rest.starts_with(',') || rest.starts_with(' ') {
                return rest.trim_start_matches(',').trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    const TZS: [(&str, &str); 13] = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in TZS {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MessageKey {
        MessageKey::new(1, 0)
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_unpadded_base64() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYQ?="), "Hola");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_decode_broken_word_is_kept() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?= tail"), "=?UTF-8?X?abc?= tail");
    }

    #[test]
    fn test_decode_windows1252_encoded_word() {
        assert_eq!(decode_encoded_words("=?Windows-1252?Q?M=FCller?="), "Müller");
    }

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: This is a long\n\tsubject line\nFrom: user@example.com\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "subject");
        assert_eq!(headers[0].1, "This is a long subject line");
    }

    #[test]
    fn test_header_block_stops_at_blank_line() {
        let raw = b"From a@x Thu Jan 04 10:00:00 2024\nSubject: hi\n\nSubject: body line\n";
        assert_eq!(header_block(raw), b"Subject: hi\n");
    }

    #[test]
    fn test_extract_record_fields() {
        let raw = b"From a@x Thu Jan 04 10:00:00 2024\n\
From: Alice Smith <a@x.com>\n\
Subject: =?UTF-8?Q?Caf=C3=A9?=\n\
Date: Thu, 04 Jan 2024 10:05:00 +0100\n\
X-Gmail-Labels: Sent,Important\n\
\n\
Body\n";
        let rec = extract_record(key(), raw);
        assert_eq!(rec.sender, "Alice Smith <a@x.com>");
        assert_eq!(rec.subject, "Café");
        assert_eq!(rec.timestamp, "2024-01-04 10:05");
        assert_eq!(rec.folder, Folder::Sent);
    }

    #[test]
    fn test_extract_record_defaults() {
        let rec = extract_record(key(), b"garbage without headers");
        assert_eq!(rec.sender, UNKNOWN_SENDER);
        assert_eq!(rec.subject, NO_SUBJECT);
        assert_eq!(rec.timestamp, "");
        assert_eq!(rec.folder, Folder::Inbox);
    }

    #[test]
    fn test_extract_record_empty_subject() {
        let rec = extract_record(key(), b"From: bob@y.com\nSubject:   \n\n");
        assert_eq!(rec.subject, NO_SUBJECT);
        assert_eq!(rec.sender, "bob@y.com");
    }

    #[test]
    fn test_extract_record_truncates() {
        let long = "x".repeat(250);
        let raw = format!("From: {long}\nSubject: {long}\n\n");
        let rec = extract_record(key(), raw.as_bytes());
        assert_eq!(rec.sender.chars().count(), 100);
        assert_eq!(rec.subject.chars().count(), 100);
    }

    #[test]
    fn test_extract_record_latin1_bytes() {
        let raw = b"From: Fran\xe7ois <f@x.fr>\nSubject: R\xe9sum\xe9\n\n";
        let rec = extract_record(key(), raw);
        assert_eq!(rec.sender, "François <f@x.fr>");
        assert_eq!(rec.subject, "Résumé");
    }

    #[test]
    fn test_unparseable_date_kept_raw() {
        assert_eq!(format_timestamp("   "), "");
        let raw = "<<unknown>> sent at some point";
        assert_eq!(format_timestamp(raw), "<<unknown>> sent at ");
    }

    #[test]
    fn test_classify_folder_priority() {
        assert_eq!(classify_folder("Sent,Trash"), Folder::Sent);
        assert_eq!(classify_folder("Important,Bin"), Folder::Trash);
        assert_eq!(classify_folder("Spam,Draft"), Folder::Spam);
        assert_eq!(classify_folder("Drafts"), Folder::Drafts);
        assert_eq!(classify_folder("Archived,Opened"), Folder::Archived);
        assert_eq!(classify_folder("Inbox,Unread"), Folder::Inbox);
        assert_eq!(classify_folder(""), Folder::Inbox);
    }

    #[test]
    fn test_parse_date_keeps_offset() {
        let dt = parse_date("Thu, 04 Jan 2024 23:30:00 -0500").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-01-04 23:30");
    }

    #[test]
    fn test_parse_date_named_tz() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 EST").is_some());
    }

    #[test]
    fn test_parse_date_with_comment() {
        let dt = parse_date("Thu, 4 Jan 2024 10:00:00 +0000 (UTC)").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-04");
    }

    #[test]
    fn test_parse_date_iso8601() {
        assert!(parse_date("2024-01-04T10:00:00Z").is_some());
    }

    #[test]
    fn test_parse_date_imap_style() {
        let dt = parse_date("16-JUL-2025 03:01:03").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2025-07-16 03:01");
    }

    #[test]
    fn test_normalize_imap_date() {
        assert_eq!(normalize_imap_date("10-MAR-2025 06:00:42"), "10 Mar 2025 06:00:42");
        assert_eq!(normalize_imap_date("04 Jan 2024 10:00:00"), "04 Jan 2024 10:00:00");
    }
}
