//! Core data model types: message keys, folders and header records.

pub mod record;
