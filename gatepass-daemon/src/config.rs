//! Daemon configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid duration {value:?} for {var}")]
    InvalidDuration { var: &'static str, value: String },
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
    /// Base URL embedded in the owner's decision links.
    pub base_url: String,
    /// Shared secret for privileged operations. `None` fails every
    /// privileged call closed.
    pub admin_secret: Option<String>,
    /// How long an issued passcode stays usable after approval. `None`
    /// means no expiry.
    pub otp_validity: Option<Duration>,
    /// Store passcodes and credentials as SHA-256 digests instead of
    /// plaintext.
    pub hash_secrets: bool,
}

impl DaemonConfig {
    /// Environment variables:
    /// - `GATEPASS_DB` (default: platform data dir)
    /// - `GATEPASS_BASE_URL` (default: `http://localhost:4001`)
    /// - `GATEPASS_ADMIN_SECRET` (unset or empty disables privileged ops)
    /// - `GATEPASS_OTP_VALIDITY` (e.g. "30s", "5m", "1h"; unset means no expiry)
    /// - `GATEPASS_HASH_SECRETS` ("1" or "true")
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = match std::env::var("GATEPASS_DB") {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("gatepass")
                .join("gatepass.db"),
        };

        let base_url = std::env::var("GATEPASS_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http://localhost:4001".to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let admin_secret = std::env::var("GATEPASS_ADMIN_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let otp_validity = match std::env::var("GATEPASS_OTP_VALIDITY") {
            Ok(v) if !v.trim().is_empty() => Some(parse_duration(&v).ok_or(
                ConfigError::InvalidDuration {
                    var: "GATEPASS_OTP_VALIDITY",
                    value: v,
                },
            )?),
            _ => None,
        };

        let hash_secrets = matches!(
            std::env::var("GATEPASS_HASH_SECRETS").as_deref(),
            Ok("1") | Ok("true")
        );

        Ok(Self {
            db_path,
            base_url,
            admin_secret,
            otp_validity,
            hash_secrets,
        })
    }
}

/// Parse a duration string like "30s", "5m" or "1h".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    let (num_str, unit) = if let Some(rest) = s.strip_suffix('s') {
        (rest, 1)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3600)
    } else {
        // Assume seconds if no unit
        (s, 1)
    };

    let num: u64 = num_str.parse().ok()?;
    if num == 0 {
        return None;
    }
    Some(Duration::from_secs(num.saturating_mul(unit)))
}
