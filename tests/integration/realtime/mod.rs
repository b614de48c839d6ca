//! Realtime integration tests

pub mod fanout_test;
pub mod websocket_test;
