//! # twt-ctl — TWT control tool
//!
//! Operator tool around `twt-core`: builds firmware command buffers from
//! arguments, decodes completion events and S1G TWT action frames given
//! as hex, and runs an in-process setup/teardown exchange against a
//! simulated firmware.

pub mod config;
pub mod simulate;
