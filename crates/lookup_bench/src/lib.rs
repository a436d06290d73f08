//! Benchmark support for the lookup table crates.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
