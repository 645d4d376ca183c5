//! Shared utilities and common types for the invitation engine.
//!
//! This crate provides common functionality used across all other crates:
//! - Contact validation logic

pub mod validation;
