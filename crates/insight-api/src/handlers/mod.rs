//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod ask;
pub mod health;
pub mod kpis;
pub mod predict;
