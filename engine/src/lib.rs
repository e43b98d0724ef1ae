//! Shipwright library
//!
//! Pipeline orchestration engine: resolves a templated configuration document
//! into build and deploy actions, runs them across target servers with a
//! selectable strategy and health gating, and reports the results.

pub mod app;
pub mod catalog;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod report;
pub mod resolver;
pub mod utils;
