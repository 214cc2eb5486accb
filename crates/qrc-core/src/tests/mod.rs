//! Test module for qrc-core
//!
//! This module contains tests for:
//! - Script error and status scanning
//! - The remediation pass and its audit trail
//! - Configuration loading, defaults and connection settings
//! - The diagnostics engine driving a real client against a mock Core

mod end_to_end_tests;
