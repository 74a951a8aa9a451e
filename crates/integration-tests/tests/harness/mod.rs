//! Shared fixtures for the end-to-end tests
//!
//! Each test binary compiles this module separately and uses a different
//! subset of it.

#![allow(dead_code)]

pub mod config;
pub mod fixtures;
pub mod mock_provider;
pub mod server;
