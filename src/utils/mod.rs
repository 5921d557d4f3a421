//! Shared helpers for docstream binaries.

pub mod bootstrap;
