//! Primitive generator clients
//!
//! Each module expresses one primitive through the code generator's verb
//! layer and contributes its registry entries and known-answer tests.

use crate::registry::Registration;

pub mod aes;
pub mod ascon;
pub mod keccak;
pub mod sha256;
pub mod tinyjambu;
pub mod xoodoo;

pub(crate) fn registrations() -> Vec<Registration> {
    let mut out = Vec::new();
    out.extend(aes::registrations());
    out.extend(ascon::registrations());
    out.extend(keccak::registrations());
    out.extend(sha256::registrations());
    out.extend(tinyjambu::registrations());
    out.extend(xoodoo::registrations());
    out
}
