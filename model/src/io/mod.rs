//! Side-effecting helpers: configuration files on disk.

pub mod config;
