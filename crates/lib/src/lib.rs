//! contentpipe-lib: Core logic for the contentpipe asset build pipeline
//!
//! This crate provides everything between a content project and its built outputs:
//! - `content`: the project tree of folders and files, loaded from `content.json`
//! - `record`: per-item timestamps, staleness and dependency propagation
//! - `tool`: locating, launching and recovering the external converter
//! - `build`: orchestrated, parallel build and clean passes

pub mod build;
pub mod consts;
pub mod content;
pub mod platform;
pub mod record;
pub mod tool;
pub mod util;
