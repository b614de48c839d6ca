//! HTTP API integration tests

pub mod history_test;
pub mod shares_test;
