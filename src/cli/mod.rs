//! Command Line Interface (CLI) layer for rasterconv.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the dispatch logic (`runner`) for the `convert`, `drivers` and
//! `options` subcommands. It wires user-provided options to the library's
//! `Converter` and background `ConversionJob`.
//!
//! If you are embedding rasterconv into another application, use the
//! library API directly instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
