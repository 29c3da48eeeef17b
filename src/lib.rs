//! # Phoenix USB Reader Library
//!
//! Read a Phoenix RC USB adapter and turn its reports into normalized
//! flight control inputs.
//!
//! This library provides the device transport for the adapter and the
//! translator that maps raw report bytes onto roll, pitch, yaw and thrust.

pub mod config;
pub mod error;
pub mod input;
pub mod usb;
