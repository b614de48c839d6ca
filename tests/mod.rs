//! Test suite for diagramsync
//!
//! This module organizes all tests

#![cfg(feature = "ssr")]

pub mod common;
