//! The rewrite passes run in sequence over a parsed `File`, before the
//! edit buffer is handed to the emitter.

pub mod async_sm;
pub mod autoblock;
pub mod closure;
pub mod concurrency;
pub mod header;
pub mod reserved;
pub mod small;
pub mod ufcs;
