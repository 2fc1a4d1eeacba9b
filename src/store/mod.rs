//! Archive storage: the single shared handle on the loaded MBOX file.

pub mod archive;
