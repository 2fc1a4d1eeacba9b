//! Email parsing: MBOX boundary walking and header extraction.

pub mod header;
pub mod mbox;
