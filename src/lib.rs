//! feedstore: a feed ingestion and storage service.
//!
//! Periodically fetches RSS/Atom feeds, reconciles parsed metadata and
//! articles against stored state, and persists the result with idempotent
//! whole-record saves. Conditional fetching (If-Modified-Since / 304)
//! avoids re-downloading unchanged feeds.

pub mod config;
pub mod feed;
pub mod storage;
pub mod sync;
