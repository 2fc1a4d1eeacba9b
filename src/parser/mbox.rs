//! MBOX boundary walker.
//!
//! Reads MBOX files line-by-line with a large buffer and records where each
//! message starts and how long it is. Message contents are never parsed here,
//! so the walk costs one sequential read and no per-message allocation beyond
//! the span table. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{MboxError, Result};

/// Default size of the internal read buffer (1 MB for fast sequential reads).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Location of one message inside the MBOX file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpan {
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// Length from the separator to the next separator (or EOF).
    pub length: u64,
}

/// Walks an MBOX file and finds message boundaries.
///
/// The walker is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    read_buffer_size: usize,
}

impl MboxParser {
    /// Create a walker for the given MBOX file.
    ///
    /// Fails with [`MboxError::FileNotFound`] if the path does not exist and
    /// with [`MboxError::InvalidMbox`] if it is not a regular file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MboxError::FileNotFound(path.clone())
            } else {
                MboxError::io(&path, e)
            }
        })?;
        if !metadata.is_file() {
            return Err(MboxError::InvalidMbox(path));
        }
        Ok(Self {
            path,
            file_size: metadata.len(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        })
    }

    /// Override the read buffer size (minimum 4 KB).
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(4096);
        self
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Check that a non-empty file begins with a `From ` separator.
    ///
    /// An empty file is accepted as an archive with no messages.
    pub fn validate(&self) -> Result<()> {
        if self.file_size == 0 {
            return Ok(());
        }
        let mut file = File::open(&self.path).map_err(|e| MboxError::io(&self.path, e))?;
        let mut head = [0u8; 8];
        let mut filled = 0;
        while filled < head.len() {
            let n = file
                .read(&mut head[filled..])
                .map_err(|e| MboxError::io(&self.path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if is_mbox_separator(&head[..filled]) {
            Ok(())
        } else {
            Err(MboxError::InvalidMbox(self.path.clone()))
        }
    }

    /// Walk the whole file and return the span of every message, in file order.
    ///
    /// `progress_callback` receives `(bytes_read, file_size)` every 4 MB.
    pub fn scan_spans(&self, progress_callback: Option<&dyn Fn(u64, u64)>) -> Result<Vec<MessageSpan>> {
        let mut spans = Vec::new();
        if self.file_size == 0 {
            return Ok(spans);
        }

        let file = File::open(&self.path).map_err(|e| MboxError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(self.read_buffer_size, file);

        let mut current_offset: u64 = 0;
        let mut message_start: Option<u64> = None;
        let mut prev_line_was_empty = true;
        let mut last_progress: u64 = 0;

        // Only the first bytes of each line matter; longer lines are consumed
        // without being copied.
        let mut line_head: Vec<u8> = Vec::with_capacity(16);
        const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

        loop {
            line_head.clear();
            let mut line_len: u64 = 0;
            let mut line_blank = true;
            loop {
                let buf = reader
                    .fill_buf()
                    .map_err(|e| MboxError::io(&self.path, e))?;
                if buf.is_empty() {
                    break; // EOF
                }
                let newline_pos = memchr_newline(buf);
                let consume_len = match newline_pos {
                    Some(pos) => pos + 1,
                    None => buf.len(),
                };
                let chunk = &buf[..consume_len];
                if line_head.len() < 8 {
                    let take = (8 - line_head.len()).min(chunk.len());
                    line_head.extend_from_slice(&chunk[..take]);
                }
                if line_blank && !is_blank_line(chunk) {
                    line_blank = false;
                }
                reader.consume(consume_len);
                line_len += consume_len as u64;
                if newline_pos.is_some() {
                    break;
                }
            }
            if line_len == 0 {
                break;
            }

            if is_mbox_separator(&line_head) {
                if let Some(start) = message_start {
                    if !prev_line_was_empty {
                        warn!(
                            offset = current_offset,
                            "Found 'From ' separator without preceding blank line"
                        );
                    }
                    spans.push(MessageSpan {
                        offset: start,
                        length: current_offset - start,
                    });
                }
                message_start = Some(current_offset);
            }

            prev_line_was_empty = line_blank;
            current_offset += line_len;

            if let Some(cb) = progress_callback {
                if current_offset - last_progress >= PROGRESS_INTERVAL {
                    cb(current_offset, self.file_size);
                    last_progress = current_offset;
                }
            }
        }

        if let Some(start) = message_start {
            spans.push(MessageSpan {
                offset: start,
                length: current_offset - start,
            });
        }

        if let Some(cb) = progress_callback {
            cb(self.file_size, self.file_size);
        }

        Ok(spans)
    }
}

/// Fast newline search (equivalent to memchr for `\n`).
#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Check whether a line is an MBOX separator (`From ` at the start).
pub(crate) fn is_mbox_separator(line: &[u8]) -> bool {
    let line = strip_bom(line);
    line.starts_with(b"From ")
}

/// Strip a UTF-8 BOM if present.
pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from user@example.com\n")); // lowercase
        assert!(!is_mbox_separator(b">From user@example.com\n")); // escaped
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_mbox_separator_with_bom() {
        let mut line = vec![0xEF, 0xBB, 0xBF];
        line.extend_from_slice(b"From user@example.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_separator(&line));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"  \n"));
        assert!(!is_blank_line(b"hello\n"));
    }

    #[test]
    fn test_scan_spans_covers_file() {
        let data = b"From a@x Mon Jan 01 00:00:00 2024\nSubject: one\n\nbody\n>From quoted\n\nFrom b@x Mon Jan 01 00:00:00 2024\r\nSubject: two\r\n\r\nbody two";
        let tmp = write_tmp(data);
        let parser = MboxParser::new(tmp.path()).unwrap();
        let spans = parser.scan_spans(None).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].offset, 0);
        assert_eq!(spans[1].offset, spans[0].length);
        assert_eq!(spans[1].offset + spans[1].length, data.len() as u64);
        assert!(data[spans[1].offset as usize..].starts_with(b"From b@x"));
    }

    #[test]
    fn test_scan_spans_long_lines() {
        let mut data = b"From a@x Mon Jan 01 00:00:00 2024\nSubject: big\n\n".to_vec();
        data.extend(std::iter::repeat(b'x').take(20_000));
        data.extend_from_slice(b"\n\nFrom b@x Mon Jan 01 00:00:00 2024\n\nsecond\n");
        let tmp = write_tmp(&data);
        let parser = MboxParser::new(tmp.path())
            .unwrap()
            .with_read_buffer_size(4096);
        let spans = parser.scan_spans(None).unwrap();
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_validate_rejects_non_mbox() {
        let tmp = write_tmp(b"BEGIN:VCARD\nVERSION:3.0\nEND:VCARD\n");
        let parser = MboxParser::new(tmp.path()).unwrap();
        assert!(matches!(parser.validate(), Err(MboxError::InvalidMbox(_))));
    }

    #[test]
    fn test_empty_file_is_valid() {
        let tmp = write_tmp(b"");
        let parser = MboxParser::new(tmp.path()).unwrap();
        assert!(parser.validate().is_ok());
        assert!(parser.scan_spans(None).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = MboxParser::new("/definitely/not/here.mbox").err().unwrap();
        assert!(matches!(err, MboxError::FileNotFound(_)));
    }
}
