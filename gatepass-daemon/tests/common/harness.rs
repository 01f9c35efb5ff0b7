//! Test harness for lifecycle E2E tests.
//!
//! Runs the services directly against an in-memory SQLite store, with a
//! scripted passcode source and a recording notifier.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use gatepass_core::{AccessRequest, Otp};
use gatepass_daemon::db;
use gatepass_daemon::notify::{Notifier, NotifyError};
use gatepass_daemon::otp::OtpSource;
use gatepass_daemon::services::{LifecycleOptions, LifecycleService, StatusService};
use gatepass_daemon::store::RequestStore;

pub const TEST_BASE_URL: &str = "http://localhost:4001";
pub const TEST_ADMIN_SECRET: &str = "test-admin-secret";

/// Passcode source that pops from a scripted queue, falling back to a fixed
/// code when the script runs out.
pub struct ScriptedOtpSource {
    queue: Mutex<VecDeque<Otp>>,
}

impl ScriptedOtpSource {
    pub fn new(codes: &[&str]) -> Self {
        let queue = codes
            .iter()
            .map(|c| Otp::new(*c).expect("scripted code must be six digits"))
            .collect();
        Self {
            queue: Mutex::new(queue),
        }
    }
}

impl OtpSource for ScriptedOtpSource {
    fn issue(&self) -> Otp {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Otp::new("999999").unwrap())
    }
}

/// A notification the harness observed.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Sent {
    Owner {
        request_id: i64,
        contact: String,
        approve_url: String,
        deny_url: String,
    },
    Guest {
        contact: String,
        otp: String,
    },
}

/// Notifier that records every delivery, optionally failing them all.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<Sent>>>,
    pub fail: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_owner(
        &self,
        request: &AccessRequest,
        approve_url: &str,
        deny_url: &str,
    ) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap() {
            return Err(NotifyError::Gateway("scripted failure".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Owner {
            request_id: request.id.as_i64(),
            contact: request.contact.clone(),
            approve_url: approve_url.to_string(),
            deny_url: deny_url.to_string(),
        });
        Ok(())
    }

    async fn notify_guest(&self, contact: &str, otp: &Otp) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap() {
            return Err(NotifyError::Gateway("scripted failure".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Guest {
            contact: contact.to_string(),
            otp: otp.as_str().to_string(),
        });
        Ok(())
    }
}

/// In-memory daemon: store, services, and the harness fakes.
pub struct TestDaemon {
    pub pool: SqlitePool,
    pub store: RequestStore,
    pub lifecycle: LifecycleService,
    pub status: StatusService,
    pub notifier: RecordingNotifier,
}

impl TestDaemon {
    /// Default daemon: scripted codes, no expiry, plaintext storage.
    pub async fn new(codes: &[&str]) -> Self {
        Self::with_options(codes, None, false).await
    }

    pub async fn with_options(
        codes: &[&str],
        otp_validity: Option<Duration>,
        hash_secrets: bool,
    ) -> Self {
        let pool = db::open_in_memory()
            .await
            .expect("failed to open in-memory database");
        let store = RequestStore::new(pool.clone());
        let notifier = RecordingNotifier::new();

        let lifecycle = LifecycleService::new(
            store.clone(),
            Arc::new(ScriptedOtpSource::new(codes)),
            Arc::new(notifier.clone()),
            LifecycleOptions {
                base_url: TEST_BASE_URL.to_string(),
                otp_validity,
                hash_secrets,
                admin_secret: Some(TEST_ADMIN_SECRET.to_string()),
            },
        );
        let status = StatusService::new(store.clone(), Some(TEST_ADMIN_SECRET.to_string()));

        Self {
            pool,
            store,
            lifecycle,
            status,
            notifier,
        }
    }

    /// Backdate a decided request, for expiry tests.
    #[allow(dead_code)]
    pub async fn backdate_decision(&self, id: i64, decided_at: chrono::DateTime<chrono::Utc>) {
        sqlx::query("UPDATE requests SET decided_at = ? WHERE id = ?")
            .bind(decided_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
            .bind(id)
            .execute(&self.pool)
            .await
            .expect("failed to backdate decision");
    }
}
