//! Cryptographically secure random generation.
//!
//! Used for AES content keys, GCM nonces and XML `ID` attribute values.

use rand::Rng;

/// Generates a cryptographically secure random byte array.
///
/// Uses the thread-local random number generator which is cryptographically
/// secure by default.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates an identifier usable as an XML `ID` attribute.
///
/// XML IDs must be `NCName`s and therefore cannot start with a digit,
/// so the identifier is an underscore followed by 40 hex characters
/// (160 bits of entropy).
#[must_use]
pub fn generate_xml_id() -> String {
    let mut id = String::with_capacity(41);
    id.push('_');
    for byte in random_bytes(20) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}
