//! Build passes over a content project.
//!
//! # Submodules
//!
//! - [`status`] - Per-item status set
//! - [`dag`] - Dependency graph and parallel waves
//! - [`convert`] - The conversion seam and the external-tool converter
//! - [`orchestrate`] - Build and clean passes
//! - [`types`] - Errors, per-item outcomes and the aggregate report

pub mod convert;
pub mod dag;
pub mod orchestrate;
pub mod status;
pub mod types;

pub use convert::{ConversionJob, Converter, ToolConverter, expand_arguments};
pub use dag::{BuildDag, Schedule};
pub use orchestrate::BuildOrchestrator;
pub use status::{BuildStatus, BuildStep, IllegalStatus};
pub use types::{BuildConfig, BuildError, BuildReport, ItemOutcome, ItemReport};
