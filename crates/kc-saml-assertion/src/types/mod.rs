//! SAML 2.0 assertion types and data structures.

mod assertion;
mod constants;
mod element;
mod encrypted;
mod name_id;

pub use assertion::*;
pub use constants::*;
pub use element::*;
pub use encrypted::*;
pub use name_id::*;
