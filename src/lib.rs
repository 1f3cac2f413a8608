//! Anonymous two-phase voting over RSA blind signatures.
//!
//! Registration hands every eligible voter a pseudonym signed through a
//! cut-and-choose exchange; voting checks a second cut-and-choose over the
//! unopened half of the same secrets and unmasks anyone who votes twice.

#[allow(clippy::many_single_char_names)]
pub mod combiner;
pub mod error;
pub mod hash;
#[allow(clippy::many_single_char_names)]
mod math;
pub mod persist;
#[allow(clippy::many_single_char_names)]
pub mod registration;
#[allow(clippy::many_single_char_names)]
pub mod rsa;
pub mod server;
pub mod voting;
pub mod wire;

pub use error::{Error, Result};
