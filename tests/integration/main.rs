//! Integration tests for ambit.
//!
//! The REST tests run the real client and transport against a local
//! `wiremock` server; the rest use the in-memory transport.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test integration
//!
//! # With client logs
//! RUST_LOG=ambit=debug cargo test --test integration -- --nocapture
//! ```

mod common;
mod context_tests;
mod flag_tests;
mod lifecycle_tests;
mod rest_tests;
