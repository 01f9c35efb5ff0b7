//! One-time password value type.
//!
//! An OTP is exactly six ASCII digits with leading zeros preserved: it is
//! text, never a number. Issuance (drawing one uniformly from
//! `000000`–`999999`) lives in the daemon behind a pluggable source so tests
//! can inject determinism.

use serde::{Deserialize, Serialize};

/// Number of digits in an OTP.
pub const OTP_DIGITS: usize = 6;

/// Error for a malformed OTP string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("OTP must be exactly {OTP_DIGITS} ASCII digits")]
    InvalidFormat,
}

/// A six-digit one-time code proving the holder received the owner's
/// approval notification.
///
/// `"012345"` and `"12345"` are different things: the former is a valid OTP,
/// the latter is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Otp(String);

impl Otp {
    /// Validate and wrap a candidate code.
    pub fn new(code: impl Into<String>) -> Result<Self, OtpError> {
        let code = code.into();
        if code.len() == OTP_DIGITS && code.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(code))
        } else {
            Err(OtpError::InvalidFormat)
        }
    }

    /// Parse user input, tolerating surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, OtpError> {
        Self::new(input.trim())
    }

    /// Build an OTP from an index in `0..1_000_000`, zero-padded.
    ///
    /// This is the only constructor issuers need; anything outside the range
    /// is a caller bug.
    pub fn from_index(n: u32) -> Self {
        debug_assert!(n < 1_000_000);
        Self(format!("{:06}", n % 1_000_000))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Otp {
    type Error = OtpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Otp> for String {
    fn from(otp: Otp) -> Self {
        otp.0
    }
}
