//! # One-Time Codes
//!
//! A code is a six-digit decimal string drawn uniformly from `000000..=999999`
//! using the operating system's CSPRNG. Leading zeros are kept: `"004211"` is
//! a perfectly good code and must be compared as such.
//!
//! ## Security notes
//!
//! - Generation uses `OsRng`. A seeded PRNG would let anyone who observes a
//!   few codes predict the next one.
//! - [`OtpCode::matches`] compares in constant time. No normalisation is
//!   applied: `" 123456"` does not match `"123456"`.
//! - `Debug` is redacted so a stray `{:?}` never writes a live code to logs.

use std::fmt;

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::config::{OTP_DIGITS, OTP_SPACE};

/// A one-time numeric code.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OtpCode(String);

impl OtpCode {
    /// Draws a fresh code from the OS random source.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Draws a code from the given RNG. Split out so tests can use a
    /// seeded generator.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let n: u32 = rng.gen_range(0..OTP_SPACE);
        Self(format!("{:0width$}", n, width = OTP_DIGITS))
    }

    /// Constant-time exact comparison against a submitted code. The code
    /// length is public, so a length mismatch returns early.
    pub fn matches(&self, submitted: &str) -> bool {
        let expected = self.0.as_bytes();
        let provided = submitted.as_bytes();
        if expected.len() != provided.len() {
            return false;
        }
        expected.ct_eq(provided).into()
    }

    /// The code itself. Only the notifier should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OtpCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode([REDACTED])")
    }
}
