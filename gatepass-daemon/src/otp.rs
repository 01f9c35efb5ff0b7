//! One-time passcode issuance.

use rand::rngs::OsRng;
use rand::Rng;

use gatepass_core::Otp;

/// Source of freshly issued passcodes.
///
/// The lifecycle engine takes this as a trait object so tests can script
/// deterministic codes.
pub trait OtpSource: Send + Sync {
    fn issue(&self) -> Otp;
}

/// Issues uniformly random six-digit codes from the OS RNG.
pub struct RandomOtpSource;

impl OtpSource for RandomOtpSource {
    fn issue(&self) -> Otp {
        // Uniform over the full space, leading zeros included.
        Otp::from_index(OsRng.gen_range(0..1_000_000u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_codes_are_six_digits() {
        let source = RandomOtpSource;
        for _ in 0..32 {
            let otp = source.issue();
            assert_eq!(otp.as_str().len(), 6);
            assert!(otp.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
