// ABOUTME: Library module for mysql-panel
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod auth;
pub mod backup;
pub mod browser;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod mysql;
pub mod privileges;
pub mod registry;
pub mod server;
pub mod tools;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
