//! Short numeric codes that identify active users at the front desk

use crate::auth::error::AccountError;
use rand::Rng;
use tracing::debug;

pub const USER_CODE_DIGITS: usize = 4;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Random string of `n` decimal digits, leading zeros included.
pub fn random_digits<R: Rng + ?Sized>(rng: &mut R, n: usize) -> String {
    (0..n)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct UserCodeGenerator {
    max_attempts: u32,
}

impl Default for UserCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl UserCodeGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Draw codes until `is_taken` reports a free one.
    pub fn generate<F>(&self, is_taken: F) -> Result<String, AccountError>
    where
        F: FnMut(&str) -> anyhow::Result<bool>,
    {
        self.generate_with(&mut rand::thread_rng(), is_taken)
    }

    pub fn generate_with<R, F>(&self, rng: &mut R, mut is_taken: F) -> Result<String, AccountError>
    where
        R: Rng + ?Sized,
        F: FnMut(&str) -> anyhow::Result<bool>,
    {
        for attempt in 1..=self.max_attempts {
            let code = random_digits(rng, USER_CODE_DIGITS);
            if !is_taken(&code)? {
                debug!(attempt, "Allocated user code");
                return Ok(code);
            }
        }

        Err(AccountError::UserCodeExhausted {
            attempts: self.max_attempts,
        })
    }
}
