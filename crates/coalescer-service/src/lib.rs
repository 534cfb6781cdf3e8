//! A request-coalescing cache access layer.
//!
//! See the [`caching`] module for how reads are coalesced and written through.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod logging;
pub mod services;
pub mod utils;
