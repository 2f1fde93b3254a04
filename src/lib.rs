//! DSP Production Calculator
//!
//! Production planning for Dyson Sphere Program: machine counts, logistics
//! and power for a target output, plus bottleneck analysis and scenario
//! comparison over settings.

pub mod analyzer;
pub mod calculator;
pub mod catalog;
pub mod db;
pub mod error;
pub mod extract;
pub mod models;
pub mod power;
pub mod sample;
pub mod settings;

pub use error::{CalcError, CalcResult};
