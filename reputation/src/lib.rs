//! Reputation engine for the Witnet explorer

#![deny(rust_2018_idioms)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

pub mod addresses;
pub mod eligibility;
pub mod engine;
pub use engine::ReputationEngine;

pub mod trs;
pub use trs::TotalReputationSet;

pub mod journal;
pub mod snapshot;

/// Module containing error definitions
pub mod error;
