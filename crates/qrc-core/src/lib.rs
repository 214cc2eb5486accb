//! Configuration and diagnostics for the qrc Core control client.

pub mod config;
pub mod diagnostics;

mod error;

#[cfg(test)]
mod tests;

pub use diagnostics::{CoreApi, DiagnosticsEngine, DiagnosticsPolicy, ExclusionRule};
pub use error::{Error, Result};

pub use qrc_types::*;
