//! Pricing state for the Lumo wallet engine.
//!
//! `RateCache` holds the latest exchange rates, network fee rates and
//! historical rate series; expired entries are treated as absent on read.
//! `RateSource` abstracts the upstream pricing feed so tests can run
//! against a canned source.

pub mod cache;
pub mod error;
pub mod source;

pub use cache::RateCache;
pub use error::RateError;
pub use source::{HttpRateSource, RateSource};
