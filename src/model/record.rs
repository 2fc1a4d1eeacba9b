//! Header records produced by the scan and the keys that locate them.

use std::fmt;
use std::str::FromStr;

/// Maximum number of characters kept for sender and subject.
pub const MAX_FIELD_CHARS: usize = 100;

/// Stable identifier of one message inside a loaded archive.
///
/// `index` is the message's position in file order. `generation` names the
/// load cycle that issued the key, so a key from a previous archive can never
/// be resolved against the one that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct MessageKey {
    pub generation: u64,
    pub index: u64,
}

impl MessageKey {
    pub fn new(generation: u64, index: u64) -> Self {
        Self { generation, index }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// Folder classification derived from the `X-Gmail-Labels` header.
///
/// This is a label, not a physical location in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum Folder {
    Inbox,
    Sent,
    Drafts,
    Spam,
    Trash,
    Archived,
}

impl Folder {
    /// All folders in sidebar order.
    pub const ALL: [Folder; 6] = [
        Folder::Inbox,
        Folder::Sent,
        Folder::Drafts,
        Folder::Spam,
        Folder::Trash,
        Folder::Archived,
    ];

    /// Display name, also accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Folder::Inbox => "Inbox",
            Folder::Sent => "Sent",
            Folder::Drafts => "Drafts",
            Folder::Spam => "Spam",
            Folder::Trash => "Trash",
            Folder::Archived => "Archived",
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Folder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Folder::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown folder '{s}'"))
    }
}

/// Compact summary of one message, extracted once during the scan.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HeaderRecord {
    /// Key used to fetch the full message again.
    pub key: MessageKey,
    /// Decoded `From:` header, at most [`MAX_FIELD_CHARS`] characters.
    pub sender: String,
    /// Decoded `Subject:` header, at most [`MAX_FIELD_CHARS`] characters.
    pub subject: String,
    /// `YYYY-MM-DD HH:MM` when the date parsed, otherwise the raw value truncated.
    pub timestamp: String,
    pub folder: Folder,
}
