//! The `monodep` command-line interface.
//!
//! Argument parsing lives in [`cli`], command bodies in [`commands`] and
//! subscriber setup in [`tracing`]. The binary only wires them together.

/// Arguments, exit codes and error rendering.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Tracing and logging configuration.
pub mod tracing;
