//! End-to-End Integration Tests
//!
//! These tests run complete identity provider responses through the
//! assertion processing pipeline.

mod common;
mod pipeline;
mod replay;
