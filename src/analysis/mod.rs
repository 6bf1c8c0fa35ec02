//! Risk analysis for the pool monitoring service.
//!
//! Submodules:
//! - `ratios`: fund outflow, liquidity change and failure rate.
//! - `history`: in-memory liquidity samples used as the one-hour baseline.

pub mod history;
pub mod ratios;
