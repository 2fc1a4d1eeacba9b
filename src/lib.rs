//! `mboxscope`: a responsive MBOX archive browser.
//!
//! Opening an archive only walks message boundaries. Header records are
//! extracted by a background scan and published in batches into a live,
//! filterable index, so the first messages can be browsed while the rest of
//! the file is still being read. Message bodies are fetched and rendered on
//! demand.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod render;
pub mod scan;
pub mod store;
pub mod tui;
