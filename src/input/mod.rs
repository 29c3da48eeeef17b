//! # Input Module
//!
//! Phoenix adapter report translation.
//!
//! This module handles:
//! - Loading the report-offset to axis mapping
//! - Normalizing report bytes into the -1.0..=1.0 range
//! - One-shot calibration fields and first-read suppression
//! - Raw diagnostic reading without mapping

pub mod axis_map;
pub mod normalize;
pub mod poller;
pub mod state;
