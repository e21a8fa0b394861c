//! Integration tests for the stashq task queue.
//!
//! Most tests run against the in-memory store. Tests marked with the
//! `integration` feature need a running S3-compatible service:
//!
//! ```bash
//! docker run -p 9000:9000 minio/minio server /data
//! cargo test --test integration --features integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cancellation;
mod common;
mod crash_window;
mod lifecycle;
mod query;
