//! `relay-source` — paced access to the source platform's history API.
//!
//! # Overview
//!
//! [`client::SourceApi`] is the raw transport (one HTTP call per method).
//! [`client::PacedSource`] puts a [`limiter::RateLimiter`] in front of it so
//! every outbound call after the first waits a fixed interval. The
//! [`pager::CursorPager`] walks channel history forward one message per
//! call, starting just past the newest stored timestamp.

pub mod client;
pub mod error;
pub mod limiter;
pub mod pager;

pub use client::{HistoryPage, HttpSourceApi, PacedSource, SourceApi, UserInfo};
pub use error::{Result, SourceError};
pub use limiter::RateLimiter;
pub use pager::{CursorPager, FetchedMessage, CURSOR_STEP, EPOCH_FALLBACK};
