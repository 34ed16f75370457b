//! Test helpers module
//!
//! This module provides utilities and helpers for testing the DietBuddy
//! orchestrator: recording channel and transcriber doubles, scripted agents
//! and a unified test context.

#![allow(dead_code)]

pub mod doubles;
pub mod test_context;

pub use doubles::*;
pub use test_context::*;
