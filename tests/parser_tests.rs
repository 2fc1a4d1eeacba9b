//! Integration tests for the boundary walk, header extraction, and rendering
//! against the `simple.mbox` fixture.

use std::path::{Path, PathBuf};

use mboxscope::model::record::{Folder, HeaderRecord};
use mboxscope::parser::header::extract_record;
use mboxscope::parser::mbox::MboxParser;
use mboxscope::render::{html_to_text, render_document};
use mboxscope::store::archive::ArchiveStore;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn records() -> Vec<HeaderRecord> {
    let store = ArchiveStore::default();
    store.open(fixture("simple.mbox")).unwrap();
    store
        .list_keys()
        .into_iter()
        .map(|key| extract_record(key, &store.fetch_raw(key).unwrap()))
        .collect()
}

// ─── Boundary walk ──────────────────────────────────────────────────

#[test]
fn test_simple_mbox_has_five_messages() {
    let parser = MboxParser::new(fixture("simple.mbox")).unwrap();
    parser.validate().unwrap();
    let spans = parser.scan_spans(None).unwrap();
    assert_eq!(spans.len(), 5, "escaped '>From' lines must not split messages");

    let covered: u64 = spans.iter().map(|s| s.length).sum();
    assert_eq!(covered, parser.file_size());
}

#[test]
fn test_progress_callback_reaches_file_size() {
    let parser = MboxParser::new(fixture("simple.mbox")).unwrap();
    let last = std::cell::Cell::new((0u64, 0u64));
    parser
        .scan_spans(Some(&|done, total| last.set((done, total))))
        .unwrap();
    let (done, total) = last.get();
    assert_eq!(done, total);
    assert_eq!(total, parser.file_size());
}

// ─── Header extraction ──────────────────────────────────────────────

#[test]
fn test_first_message_fields() {
    let first = &records()[0];
    assert_eq!(first.sender, "\"User One\" <user1@example.com>");
    assert_eq!(first.subject, "Hello World");
    assert_eq!(first.timestamp, "2024-01-15 10:30");
    assert_eq!(first.folder, Folder::Inbox);
}

#[test]
fn test_folded_subject_and_local_offset() {
    let second = &records()[1];
    assert_eq!(second.subject, "Re: Quarterly report");
    // Shown in the message's own offset, not converted to UTC
    assert_eq!(second.timestamp, "2024-01-16 08:05");
    assert_eq!(second.folder, Folder::Sent);
}

#[test]
fn test_encoded_words_and_raw_date() {
    let third = &records()[2];
    assert_eq!(third.sender, "José García <jose@example.es>");
    assert_eq!(third.subject, "Café con leche");
    assert_eq!(third.timestamp, "sometime last week");
    assert_eq!(third.folder, Folder::Spam);
}

#[test]
fn test_missing_headers_use_placeholders() {
    let fourth = &records()[3];
    assert_eq!(fourth.sender, "Unknown");
    assert_eq!(fourth.subject, "(No Subject)");
    assert_eq!(fourth.timestamp, "");
    // Encoded label is decoded before classification
    assert_eq!(fourth.folder, Folder::Trash);
}

#[test]
fn test_crlf_message() {
    let fifth = &records()[4];
    assert_eq!(fifth.sender, "Dana <dana@example.com>");
    assert_eq!(fifth.subject, "Invoice");
    assert_eq!(fifth.timestamp, "2024-02-02 16:45");
    assert_eq!(fifth.folder, Folder::Archived);
}

// ─── Rendering ──────────────────────────────────────────────────────

#[test]
fn test_render_plain_and_html_messages() {
    let store = ArchiveStore::default();
    store.open(fixture("simple.mbox")).unwrap();
    let keys = store.list_keys();

    let plain = render_document(&store.fetch_raw(keys[1]).unwrap()).unwrap();
    assert!(plain.starts_with("<pre>"));
    assert!(plain.contains("&gt;From the finance team"));

    let html = render_document(&store.fetch_raw(keys[4]).unwrap()).unwrap();
    assert!(html.contains("<b>42"));
    assert_eq!(html_to_text(&html).lines().next(), Some("Total due: 42 &euro;"));
}
