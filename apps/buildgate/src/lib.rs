//! buildgate core library.
//!
//! Orchestrates engine builds, packaging, automation tests, and cleanup, and
//! applies two quality gates the toolchain does not enforce itself: a log
//! classifier that fails on error/warning lines, and a line-coverage gate.
//!
//! High-level modules:
//! - `cli`: CLI argument parsing (binary uses this).
//! - `config`: Discovery and effective configuration resolution.
//! - `project`: Upward search for the `*.uproject` descriptor.
//! - `classify`: Error/warning/ignored classification of captured logs.
//! - `coverage`: Cobertura parsing, threshold gate, and source resolution.
//! - `runner`: Blocking process execution teed to a log file.
//! - `pipeline`: Typed build/package/test/clean steps run fail-fast.
//! - `toolchain`: Build configurations and default engine tool paths.
//! - `models`: Step outcomes and pipeline reports.
//! - `output`: Human/JSON printers.
//! - `error`: Error taxonomy and exit codes.
pub mod classify;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod error;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod project;
pub mod runner;
pub mod toolchain;
