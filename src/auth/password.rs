//! Password hashing
//! Mission: Salted bcrypt hashes, plus a marker for accounts without a usable password
//!
//! bcrypt only reads the first 72 bytes of its input, so the raw password is
//! first reduced to a base64 SHA-256 digest (44 bytes). Every byte of the
//! password then takes part in the comparison.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bcrypt::{hash, verify, BcryptResult, DEFAULT_COST};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use tracing::warn;

const UNUSABLE_PASSWORD_PREFIX: char = '!';
const UNUSABLE_PASSWORD_SUFFIX_LENGTH: usize = 40;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, raw: &str) -> BcryptResult<String> {
        hash(prehash(raw), self.cost)
    }

    /// Hash for `Some(raw)`, unusable marker for `None`.
    pub fn hash_optional(&self, raw: Option<&str>) -> BcryptResult<String> {
        match raw {
            Some(raw) => self.hash(raw),
            None => Ok(make_unusable_password()),
        }
    }

    /// Never fails: malformed or unusable hashes simply do not verify.
    pub fn verify(&self, raw: &str, stored: &str) -> bool {
        if !is_password_usable(stored) {
            return false;
        }
        match verify(prehash(raw), stored) {
            Ok(valid) => valid,
            Err(e) => {
                warn!("Stored password hash could not be parsed: {e}");
                false
            }
        }
    }
}

fn prehash(raw: &str) -> String {
    BASE64.encode(Sha256::digest(raw.as_bytes()))
}

pub fn make_unusable_password() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UNUSABLE_PASSWORD_SUFFIX_LENGTH)
        .map(char::from)
        .collect();
    format!("{UNUSABLE_PASSWORD_PREFIX}{suffix}")
}

pub fn is_password_usable(stored: &str) -> bool {
    !stored.is_empty() && !stored.starts_with(UNUSABLE_PASSWORD_PREFIX)
}
