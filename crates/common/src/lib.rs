//! Shared helpers for the POI registry: field-level encryption and small
//! list/text utilities.

pub mod encryption;
pub mod utils;

pub use encryption::{CipherError, FieldCipher};
