//! # Gate Configuration & Constants
//!
//! Every tunable number in docgate lives here. Credential lifetime and code
//! length are part of the contract with requesters (the email tells them
//! how long the code is good for), so change them deliberately.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Credential Parameters
// ---------------------------------------------------------------------------

/// How long an issued code stays valid. Five minutes: long enough to
/// switch to a mail client and back, short enough that a leaked inbox
/// screenshot is useless by the time anyone reads it.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(300);

/// Same as [`DEFAULT_CREDENTIAL_TTL`] in seconds, for CLI defaults.
/// Keep the two in sync.
pub const DEFAULT_CREDENTIAL_TTL_SECS: u64 = 300;

/// Upper bound on a configured TTL. A "one-time" code that lives for days
/// is a password.
pub const MAX_CREDENTIAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of decimal digits in a code. Leading zeros are allowed, so the
/// keyspace is exactly 10^6.
pub const OTP_DIGITS: usize = 6;

/// Exclusive upper bound of the numeric code space (10^OTP_DIGITS).
pub const OTP_SPACE: u32 = 1_000_000;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 8000;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 8001;

/// Crate version reported by the node's status endpoint.
pub const GATE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Errors raised when validating a [`GateConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("credential TTL must be greater than zero")]
    ZeroTtl,

    #[error("credential TTL of {0:?} exceeds the 24h maximum")]
    TtlTooLong(Duration),
}

/// Runtime knobs shared by the issuer and verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Lifetime of every credential issued under this configuration.
    pub credential_ttl: Duration,

    /// When `true`, a code can unlock its statement exactly once. When
    /// `false`, a valid unexpired code may be replayed until it expires or
    /// is superseded.
    pub single_use: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
            single_use: true,
        }
    }
}

impl GateConfig {
    /// Checks the configuration is usable. Call once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credential_ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        if self.credential_ttl > MAX_CREDENTIAL_TTL {
            return Err(ConfigError::TtlTooLong(self.credential_ttl));
        }
        Ok(())
    }

    /// The TTL as a `chrono` duration, for timestamp arithmetic.
    ///
    /// Validates first, so an out-of-range TTL is an error rather than a
    /// wrapped value.
    pub fn ttl(&self) -> Result<chrono::Duration, ConfigError> {
        self.validate()?;
        chrono::Duration::from_std(self.credential_ttl)
            .map_err(|_| ConfigError::TtlTooLong(self.credential_ttl))
    }
}
