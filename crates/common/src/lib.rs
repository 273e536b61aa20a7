//! Types shared by the API client crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
