//! Persistent request storage with SQLite.
//!
//! Every guarded transition is a single conditional `UPDATE` whose `WHERE`
//! clause restates the guard, checked via `rows_affected()`. The guard check
//! and the state write are therefore one statement: a second writer racing
//! on the same id can never observe the pre-transition state between another
//! writer's check and write.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use gatepass_core::{AccessRequest, RequestEvent, RequestId, RequestState};

/// Errors that can occur during request store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request not found")]
    NotFound,
    #[error("request already {from}")]
    InvalidTransition { from: RequestState },
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent storage for access requests.
///
/// Cheap to clone; all clones share the underlying pool.
#[derive(Clone)]
pub struct RequestStore {
    pool: SqlitePool,
}

impl RequestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new pending request and return the full record.
    ///
    /// The id comes from the database (rowid, monotonic, never reused while
    /// the table lives).
    pub async fn create(
        &self,
        device_label: &str,
        contact: &str,
    ) -> Result<AccessRequest, StoreError> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO requests (device_label, contact, state, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(device_label)
        .bind(contact)
        .bind(RequestState::Pending.as_str())
        .bind(encode_ts(created_at))
        .execute(&self.pool)
        .await?;

        let mut request = AccessRequest::new(
            RequestId::new(result.last_insert_rowid()),
            device_label,
            contact,
            created_at,
        );
        // Normalize to what a re-read would produce.
        request.created_at = decode_ts_lossy(&encode_ts(created_at));
        Ok(request)
    }

    /// Get a request by id.
    pub async fn get(&self, id: RequestId) -> Result<Option<AccessRequest>, StoreError> {
        let row = sqlx::query(
            "SELECT id, device_label, contact, state, otp, credential, created_at, decided_at
             FROM requests WHERE id = ?",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_request(&r)).transpose()
    }

    /// Resolve a guest's most recent request with the given contact and
    /// state, without involving the numeric id.
    pub async fn get_by_contact(
        &self,
        contact: &str,
        state: RequestState,
    ) -> Result<Option<AccessRequest>, StoreError> {
        let row = sqlx::query(
            "SELECT id, device_label, contact, state, otp, credential, created_at, decided_at
             FROM requests
             WHERE contact = ? AND state = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(contact)
        .bind(state.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_request(&r)).transpose()
    }

    /// List all requests, newest first.
    pub async fn list_all(&self) -> Result<Vec<AccessRequest>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, device_label, contact, state, otp, credential, created_at, decided_at
             FROM requests
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    /// Read-only status projection for guest polling.
    ///
    /// Deliberately never selects `otp` or `credential`.
    pub async fn get_state(
        &self,
        id: RequestId,
    ) -> Result<Option<RequestState>, StoreError> {
        let row = sqlx::query("SELECT id, state FROM requests WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(r) => {
                let state: String = r.get("state");
                let state = state.parse().map_err(|e| StoreError::Corrupt {
                    id: id.as_i64(),
                    reason: format!("{}", e),
                })?;
                Ok(Some(state))
            }
        }
    }

    /// Apply a lifecycle event to a request and persist the outcome.
    ///
    /// The in-memory machine decides legality and computes the new fields;
    /// the `UPDATE` re-asserts the pre-transition state so a writer racing
    /// between the read and the write loses with zero affected rows. For an
    /// approval this also means the OTP lands in the same statement that
    /// flips the state: there is never a persisted OTP without a persisted
    /// `approved`.
    pub async fn apply_event(
        &self,
        id: RequestId,
        event: RequestEvent,
        ts: DateTime<Utc>,
    ) -> Result<AccessRequest, StoreError> {
        let mut record = self.get(id).await?.ok_or(StoreError::NotFound)?;
        let from = record.state;

        record
            .apply(event, ts)
            .map_err(|e| StoreError::InvalidTransition { from: e.from })?;

        let result = sqlx::query(
            "UPDATE requests
             SET state = ?, otp = ?, credential = ?, decided_at = ?
             WHERE id = ? AND state = ?",
        )
        .bind(record.state.as_str())
        .bind(&record.otp)
        .bind(&record.credential)
        .bind(record.decided_at.map(encode_ts))
        .bind(id.as_i64())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejection_for(id).await?);
        }
        Ok(record)
    }

    /// Approved -> Credentialed, consuming the OTP.
    ///
    /// The `WHERE` clause re-asserts both the state and the exact stored OTP
    /// (and, when a validity window is configured, that the decision is
    /// recent enough), so a racing or replayed submission loses cleanly.
    /// Returns whether the transition was applied; the caller treats `false`
    /// as the generic fail-closed rejection.
    pub async fn credential_approved(
        &self,
        id: RequestId,
        otp_stored: &str,
        credential_stored: &str,
        decided_not_before: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let cutoff = decided_not_before.map(encode_ts);

        let result = sqlx::query(
            "UPDATE requests
             SET state = ?, credential = ?, otp = NULL
             WHERE id = ? AND state = ? AND otp = ?
               AND (? IS NULL OR decided_at >= ?)",
        )
        .bind(RequestState::Credentialed.as_str())
        .bind(credential_stored)
        .bind(id.as_i64())
        .bind(RequestState::Approved.as_str())
        .bind(otp_stored)
        .bind(cutoff.clone())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a request by id. Idempotent: removing an unknown id simply
    /// returns `false`.
    pub async fn remove(&self, id: RequestId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM requests WHERE id = ?")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// After a guarded update affected zero rows: was the record missing, or
    /// already past the expected state?
    async fn rejection_for(&self, id: RequestId) -> Result<StoreError, StoreError> {
        match self.get_state(id).await? {
            None => Ok(StoreError::NotFound),
            Some(from) => Ok(StoreError::InvalidTransition { from }),
        }
    }
}

// ============================================================================
// Row decoding and timestamp format
// ============================================================================

/// Fixed-width RFC 3339 UTC with microseconds: sortable as text, which is
/// what the `ORDER BY created_at DESC` listings and the validity-window
/// comparison rely on.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(s: &str, id: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id,
            reason: format!("bad timestamp {:?}: {}", s, e),
        })
}

fn decode_ts_lossy(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn row_to_request(row: &SqliteRow) -> Result<AccessRequest, StoreError> {
    let id: i64 = row.get("id");
    let state: String = row.get("state");
    let state: RequestState = state.parse().map_err(|e| StoreError::Corrupt {
        id,
        reason: format!("{}", e),
    })?;

    let created_at: String = row.get("created_at");
    let decided_at: Option<String> = row.get("decided_at");

    Ok(AccessRequest {
        id: RequestId::new(id),
        device_label: row.get("device_label"),
        contact: row.get("contact"),
        state,
        otp: row.get("otp"),
        credential: row.get("credential"),
        created_at: decode_ts(&created_at, id)?,
        decided_at: decided_at.map(|s| decode_ts(&s, id)).transpose()?,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_store() -> RequestStore {
        let pool = db::open_in_memory().await.unwrap();
        RequestStore::new(pool)
    }

    #[tokio::test]
    async fn create_assigns_monotonic_ids_and_pending_state() {
        let store = test_store().await;

        let a = store.create("laptop", "a@x.com").await.unwrap();
        let b = store.create("phone", "b@x.com").await.unwrap();

        assert_eq!(a.id, RequestId::new(1));
        assert_eq!(b.id, RequestId::new(2));
        assert_eq!(a.state, RequestState::Pending);
        assert!(a.otp.is_none());
        assert!(a.credential.is_none());

        let fetched = store.get(a.id).await.unwrap().unwrap();
        assert_eq!(fetched, a);
    }

    #[tokio::test]
    async fn approve_binds_otp_atomically() {
        let store = test_store().await;
        let req = store.create("laptop", "a@x.com").await.unwrap();

        store
            .apply_event(
                req.id,
                RequestEvent::Approved { otp: "482913".into() },
                Utc::now(),
            )
            .await
            .unwrap();

        let fetched = store.get(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, RequestState::Approved);
        assert_eq!(fetched.otp.as_deref(), Some("482913"));
        assert!(fetched.decided_at.is_some());
    }

    #[tokio::test]
    async fn second_approve_is_rejected_without_overwrite() {
        let store = test_store().await;
        let req = store.create("laptop", "a@x.com").await.unwrap();

        store
            .apply_event(
                req.id,
                RequestEvent::Approved { otp: "111111".into() },
                Utc::now(),
            )
            .await
            .unwrap();
        let err = store
            .apply_event(
                req.id,
                RequestEvent::Approved { otp: "222222".into() },
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: RequestState::Approved
            }
        ));
        // The original OTP survives.
        let fetched = store.get(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.otp.as_deref(), Some("111111"));
    }

    #[tokio::test]
    async fn deny_then_approve_is_rejected() {
        let store = test_store().await;
        let req = store.create("laptop", "a@x.com").await.unwrap();

        store
            .apply_event(req.id, RequestEvent::Denied, Utc::now())
            .await
            .unwrap();

        let err = store
            .apply_event(
                req.id,
                RequestEvent::Approved { otp: "333333".into() },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: RequestState::Denied
            }
        ));

        let err = store
            .apply_event(req.id, RequestEvent::Denied, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn decide_unknown_id_is_not_found_and_creates_nothing() {
        let store = test_store().await;

        let err = store
            .apply_event(RequestId::new(2), RequestEvent::Denied, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn credential_consumes_otp_once() {
        let store = test_store().await;
        let req = store.create("laptop", "a@x.com").await.unwrap();
        store
            .apply_event(
                req.id,
                RequestEvent::Approved { otp: "482913".into() },
                Utc::now(),
            )
            .await
            .unwrap();

        let applied = store
            .credential_approved(req.id, "482913", "mypw", None)
            .await
            .unwrap();
        assert!(applied);

        let fetched = store.get(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, RequestState::Credentialed);
        assert_eq!(fetched.credential.as_deref(), Some("mypw"));
        assert!(fetched.otp.is_none());

        // Replay with the same (or any) OTP loses.
        let applied = store
            .credential_approved(req.id, "482913", "again", None)
            .await
            .unwrap();
        assert!(!applied);
        let fetched = store.get(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.credential.as_deref(), Some("mypw"));
    }

    #[tokio::test]
    async fn credential_with_wrong_otp_is_a_no_op() {
        let store = test_store().await;
        let req = store.create("laptop", "a@x.com").await.unwrap();
        store
            .apply_event(
                req.id,
                RequestEvent::Approved { otp: "482913".into() },
                Utc::now(),
            )
            .await
            .unwrap();

        let applied = store
            .credential_approved(req.id, "000000", "mypw", None)
            .await
            .unwrap();
        assert!(!applied);

        let fetched = store.get(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, RequestState::Approved);
        assert_eq!(fetched.otp.as_deref(), Some("482913"));
    }

    #[tokio::test]
    async fn credential_respects_validity_cutoff() {
        let store = test_store().await;
        let req = store.create("laptop", "a@x.com").await.unwrap();
        let decided = Utc::now() - chrono::Duration::minutes(30);
        store
            .apply_event(
                req.id,
                RequestEvent::Approved { otp: "482913".into() },
                decided,
            )
            .await
            .unwrap();

        // Window of 10 minutes: the 30-minute-old decision is out.
        let cutoff = Utc::now() - chrono::Duration::minutes(10);
        let applied = store
            .credential_approved(req.id, "482913", "mypw", Some(cutoff))
            .await
            .unwrap();
        assert!(!applied);

        // A wide-open window admits it.
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let applied = store
            .credential_approved(req.id, "482913", "mypw", Some(cutoff))
            .await
            .unwrap();
        assert!(applied);
    }

    #[tokio::test]
    async fn get_by_contact_returns_newest_matching() {
        let store = test_store().await;
        let old = store.create("laptop", "a@x.com").await.unwrap();
        let new = store.create("tablet", "a@x.com").await.unwrap();
        store.create("phone", "b@x.com").await.unwrap();

        store
            .apply_event(
                old.id,
                RequestEvent::Approved { otp: "111111".into() },
                Utc::now(),
            )
            .await
            .unwrap();
        store
            .apply_event(
                new.id,
                RequestEvent::Approved { otp: "222222".into() },
                Utc::now(),
            )
            .await
            .unwrap();

        let found = store
            .get_by_contact("a@x.com", RequestState::Approved)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, new.id);

        let none = store
            .get_by_contact("nobody@x.com", RequestState::Approved)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn list_all_is_newest_first() {
        let store = test_store().await;
        for (label, contact) in [("a", "1@x"), ("b", "2@x"), ("c", "3@x")] {
            store.create(label, contact).await.unwrap();
        }

        let all = store.list_all().await.unwrap();
        let ids: Vec<i64> = all.iter().map(|r| r.id.as_i64()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = test_store().await;
        let req = store.create("laptop", "a@x.com").await.unwrap();

        assert!(store.remove(req.id).await.unwrap());
        assert!(!store.remove(req.id).await.unwrap());
        assert!(store.get(req.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_state_projection_matches_record() {
        let store = test_store().await;
        let req = store.create("laptop", "a@x.com").await.unwrap();

        assert_eq!(
            store.get_state(req.id).await.unwrap(),
            Some(RequestState::Pending)
        );
        assert_eq!(store.get_state(RequestId::new(99)).await.unwrap(), None);
    }
}
