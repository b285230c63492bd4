//! dsf-linter core library.
//!
//! This crate lints DSF process plugins: it finds plugin definitions on a
//! project's classpath (API v1 and v2), correlates their declared BPMN and
//! FHIR resources with the files on disk, validates those files, checks
//! service registration, and reports resources no plugin references.
//!
//! High-level modules:
//! - `classpath`: Class-file index over directories and JARs, bytecode reading.
//! - `plugin`: Plugin definition discovery and the V1/V2 adapter.
//! - `resource_discovery`: Per-plugin resource correlation.
//! - `leftover`: Project-wide unreferenced resource detection.
//! - `validation`: BPMN, FHIR and plugin-level rule sets.
//! - `orchestrator`: Per-plugin lint pass.
//! - `linter`: The five-phase run façade.
//! - `report`: JSON/HTML report files.
//! - `project`, `maven`: Input setup and the optional build step.
//! - `cli`, `config`, `output`, `logging`: Binary-facing plumbing.
pub mod classpath;
pub mod cli;
pub mod config;
pub mod error;
pub mod leftover;
pub mod linter;
pub mod logging;
pub mod maven;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod plugin;
pub mod project;
pub mod report;
pub mod resource;
pub mod resource_discovery;
pub mod validation;

pub use error::{LintError, RunError};
pub use linter::{DsfLinter, LintOptions};
