//! Core module - Scan data model and presentation
//!
//! This module provides:
//! - Fixed-column field extraction and key normalization
//! - Search keys, object handles and the result index
//! - Object path utilities
//! - Report rendering

pub mod field;
pub mod model;
pub mod paths;
pub mod render;
