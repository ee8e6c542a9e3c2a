//! Loopback servers shared by the integration tests.

#![allow(dead_code)]

pub mod collector;
pub mod line_server;
