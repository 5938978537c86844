use crate::models::{ProfileRow, QuotaRow, VerificationJobRow};
use crate::{Database, parse_ts, to_ts};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use uuid::Uuid;

impl Database {
    // -- Profiles --

    pub fn get_profile(&self, user_id: i64) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, user_id))
    }

    /// A user is VIP while their stored expiry is strictly in the future.
    pub fn is_vip(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let profile = self.get_profile(user_id)?;
        match profile.and_then(|p| p.vip_expires_at) {
            Some(raw) => Ok(parse_ts(&raw)? > now),
            None => Ok(false),
        }
    }

    pub fn grant_vip(&self, user_id: i64, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, vip_expires_at) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET vip_expires_at = excluded.vip_expires_at",
                rusqlite::params![user_id, to_ts(expires_at)],
            )?;
            Ok(())
        })
    }

    /// Records that the user's like action went through. Only successful
    /// deliveries touch this column.
    pub fn touch_last_used(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profiles (user_id, last_used_at) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET last_used_at = excluded.last_used_at",
                rusqlite::params![user_id, to_ts(now)],
            )?;
            Ok(())
        })
    }

    // -- Request quotas --

    /// Remaining requests under the lazy-reset rule: no record means the
    /// full limit, a lapsed window means the full limit (observed here but
    /// only persisted by the next consume), otherwise the stored counter.
    pub fn remaining_requests(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        limit: i64,
        window: Duration,
    ) -> Result<i64> {
        self.with_conn(|conn| current_remaining(conn, user_id, now, limit, window))
    }

    /// Spends one request. Fails without a write when nothing is left.
    /// Check and decrement run inside one writer section, so two racing
    /// consumes cannot both observe the same positive counter.
    pub fn consume_request(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        limit: i64,
        window: Duration,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let current = current_remaining(conn, user_id, now, limit, window)?;
            if current <= 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO request_quotas (user_id, last_request_at, remaining)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     last_request_at = excluded.last_request_at,
                     remaining = excluded.remaining",
                rusqlite::params![user_id, to_ts(now), current - 1],
            )?;
            Ok(true)
        })
    }

    // -- Verification jobs --

    /// Inserts a fresh unverified job and returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn create_job(
        &self,
        user_id: i64,
        uid: &str,
        region: &str,
        chat_id: i64,
        message_id: i64,
        code: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO verification_jobs
                     (id, code, user_id, uid, region, expires_at, chat_id, message_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id,
                    code,
                    user_id,
                    uid,
                    region,
                    to_ts(now + ttl),
                    chat_id,
                    message_id,
                    to_ts(now),
                ],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    /// Flips a code to verified, once. A consumed or unknown code changes
    /// zero rows. With `enforce_expiry` the flip also requires an
    /// unexpired link.
    pub fn confirm_job(&self, code: &str, now: DateTime<Utc>, enforce_expiry: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = if enforce_expiry {
                conn.execute(
                    "UPDATE verification_jobs
                     SET verified = 1, verified_at = ?2
                     WHERE code = ?1 AND verified = 0 AND expires_at > ?2",
                    rusqlite::params![code, to_ts(now)],
                )?
            } else {
                conn.execute(
                    "UPDATE verification_jobs
                     SET verified = 1, verified_at = ?2
                     WHERE code = ?1 AND verified = 0",
                    rusqlite::params![code, to_ts(now)],
                )?
            };
            Ok(changed == 1)
        })
    }

    /// Verified jobs the processor has not handled yet, oldest first.
    pub fn pending_jobs(&self) -> Result<Vec<VerificationJobRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, code, user_id, uid, region, verified, verified_at,
                        processed, expires_at, chat_id, message_id, created_at
                 FROM verification_jobs
                 WHERE verified = 1 AND processed = 0
                 ORDER BY created_at",
            )?;

            let rows = stmt
                .query_map([], map_job_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn mark_processed(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE verification_jobs SET processed = 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    /// Whether the user already holds a live (unverified, unprocessed,
    /// unexpired) verification link.
    pub fn has_live_job(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: i64 = conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM verification_jobs
                     WHERE user_id = ?1 AND verified = 0 AND processed = 0
                       AND expires_at > ?2
                 )",
                rusqlite::params![user_id, to_ts(now)],
                |row| row.get(0),
            )?;
            Ok(exists == 1)
        })
    }

    pub fn job_by_code(&self, code: &str) -> Result<Option<VerificationJobRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, code, user_id, uid, region, verified, verified_at,
                        processed, expires_at, chat_id, message_id, created_at
                 FROM verification_jobs WHERE code = ?1",
            )?;

            let row = stmt.query_row([code], map_job_row).optional()?;
            Ok(row)
        })
    }
}

fn current_remaining(
    conn: &Connection,
    user_id: i64,
    now: DateTime<Utc>,
    limit: i64,
    window: Duration,
) -> Result<i64> {
    match query_quota(conn, user_id)? {
        None => Ok(limit),
        Some(quota) => {
            let last = parse_ts(&quota.last_request_at)?;
            if now - last > window {
                Ok(limit)
            } else {
                Ok(quota.remaining)
            }
        }
    }
}

fn query_quota(conn: &Connection, user_id: i64) -> Result<Option<QuotaRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, last_request_at, remaining FROM request_quotas WHERE user_id = ?1",
    )?;

    let row = stmt
        .query_row([user_id], |row| {
            Ok(QuotaRow {
                user_id: row.get(0)?,
                last_request_at: row.get(1)?,
                remaining: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_profile(conn: &Connection, user_id: i64) -> Result<Option<ProfileRow>> {
    let mut stmt = conn
        .prepare("SELECT user_id, vip_expires_at, last_used_at FROM profiles WHERE user_id = ?1")?;

    let row = stmt
        .query_row([user_id], |row| {
            Ok(ProfileRow {
                user_id: row.get(0)?,
                vip_expires_at: row.get(1)?,
                last_used_at: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VerificationJobRow> {
    Ok(VerificationJobRow {
        id: row.get(0)?,
        code: row.get(1)?,
        user_id: row.get(2)?,
        uid: row.get(3)?,
        region: row.get(4)?,
        verified: row.get::<_, i64>(5)? != 0,
        verified_at: row.get(6)?,
        processed: row.get::<_, i64>(7)? != 0,
        expires_at: row.get(8)?,
        chat_id: row.get(9)?,
        message_id: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LIMIT: i64 = 1;

    fn window() -> Duration {
        Duration::hours(20)
    }

    fn ttl() -> Duration {
        Duration::minutes(10)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn fresh_user_has_full_quota() {
        let db = db();
        assert_eq!(db.remaining_requests(1, t0(), LIMIT, window()).unwrap(), 1);
    }

    #[test]
    fn quota_exhausts_after_limit_consumes() {
        let db = db();
        assert!(db.consume_request(1, t0(), LIMIT, window()).unwrap());
        assert_eq!(db.remaining_requests(1, t0(), LIMIT, window()).unwrap(), 0);

        // Within the window, further consumes fail and change nothing.
        let later = t0() + Duration::hours(1);
        assert!(!db.consume_request(1, later, LIMIT, window()).unwrap());
        assert_eq!(db.remaining_requests(1, later, LIMIT, window()).unwrap(), 0);
    }

    #[test]
    fn quota_refreshes_after_window_lapses() {
        let db = db();
        assert!(db.consume_request(1, t0(), LIMIT, window()).unwrap());

        let lapsed = t0() + window() + Duration::minutes(1);
        assert_eq!(
            db.remaining_requests(1, lapsed, LIMIT, window()).unwrap(),
            LIMIT
        );
        assert!(db.consume_request(1, lapsed, LIMIT, window()).unwrap());
        assert_eq!(
            db.remaining_requests(1, lapsed, LIMIT, window()).unwrap(),
            0
        );
    }

    #[test]
    fn lapsed_reset_is_not_persisted_by_reads() {
        let db = db();
        assert!(db.consume_request(1, t0(), LIMIT, window()).unwrap());

        let lapsed = t0() + window() + Duration::minutes(1);
        assert_eq!(
            db.remaining_requests(1, lapsed, LIMIT, window()).unwrap(),
            LIMIT
        );

        // The stored row still carries the old counter until a consume
        // commits the reset.
        let stored = db
            .with_conn(|conn| query_quota(conn, 1))
            .unwrap()
            .unwrap();
        assert_eq!(stored.remaining, 0);
    }

    #[test]
    fn quota_is_per_user() {
        let db = db();
        assert!(db.consume_request(1, t0(), LIMIT, window()).unwrap());
        assert_eq!(db.remaining_requests(2, t0(), LIMIT, window()).unwrap(), 1);
    }

    #[test]
    fn vip_grant_round_trip() {
        let db = db();
        let expires = t0() + Duration::days(5);
        db.grant_vip(9, expires).unwrap();

        assert!(db.is_vip(9, t0()).unwrap());
        assert!(db.is_vip(9, expires - Duration::seconds(1)).unwrap());
        assert!(!db.is_vip(9, expires).unwrap());
        assert!(!db.is_vip(9, expires + Duration::days(1)).unwrap());
    }

    #[test]
    fn vip_regrant_extends_expiry() {
        let db = db();
        db.grant_vip(9, t0() + Duration::days(1)).unwrap();
        db.grant_vip(9, t0() + Duration::days(30)).unwrap();
        assert!(db.is_vip(9, t0() + Duration::days(10)).unwrap());
    }

    #[test]
    fn non_vip_user_is_not_vip() {
        let db = db();
        assert!(!db.is_vip(42, t0()).unwrap());
        db.touch_last_used(42, t0()).unwrap();
        assert!(!db.is_vip(42, t0()).unwrap());
    }

    #[test]
    fn touch_last_used_preserves_vip_expiry() {
        let db = db();
        db.grant_vip(9, t0() + Duration::days(5)).unwrap();
        db.touch_last_used(9, t0()).unwrap();

        let profile = db.get_profile(9).unwrap().unwrap();
        assert!(profile.vip_expires_at.is_some());
        assert!(profile.last_used_at.is_some());
    }

    #[test]
    fn confirm_succeeds_exactly_once() {
        let db = db();
        db.create_job(1, "12345", "ind", 100, 200, "abcDEF123456", t0(), ttl())
            .unwrap();

        assert!(db.confirm_job("abcDEF123456", t0(), true).unwrap());

        let job = db.job_by_code("abcDEF123456").unwrap().unwrap();
        assert!(job.verified);
        let first_verified_at = job.verified_at.clone().unwrap();

        // Second click: clean failure, verified state untouched.
        let later = t0() + Duration::minutes(1);
        assert!(!db.confirm_job("abcDEF123456", later, true).unwrap());
        let job = db.job_by_code("abcDEF123456").unwrap().unwrap();
        assert_eq!(job.verified_at.unwrap(), first_verified_at);
    }

    #[test]
    fn confirm_unknown_code_fails() {
        let db = db();
        assert!(!db.confirm_job("nope", t0(), true).unwrap());
        assert!(!db.confirm_job("nope", t0(), false).unwrap());
    }

    #[test]
    fn expired_code_rejected_when_enforced() {
        let db = db();
        db.create_job(1, "12345", "ind", 100, 200, "code0001", t0(), ttl())
            .unwrap();

        let late = t0() + ttl() + Duration::seconds(1);
        assert!(!db.confirm_job("code0001", late, true).unwrap());

        let job = db.job_by_code("code0001").unwrap().unwrap();
        assert!(!job.verified);
    }

    #[test]
    fn expired_code_honored_in_lenient_mode() {
        let db = db();
        db.create_job(1, "12345", "ind", 100, 200, "code0002", t0(), ttl())
            .unwrap();

        let late = t0() + ttl() + Duration::hours(3);
        assert!(db.confirm_job("code0002", late, false).unwrap());
    }

    #[test]
    fn pending_scan_returns_verified_unprocessed_oldest_first() {
        let db = db();
        db.create_job(1, "111", "ind", 10, 20, "first0000000", t0(), ttl())
            .unwrap();
        db.create_job(2, "222", "br", 11, 21, "second000000", t0() + Duration::seconds(5), ttl())
            .unwrap();
        db.create_job(3, "333", "ind", 12, 22, "third0000000", t0() + Duration::seconds(9), ttl())
            .unwrap();

        // Only two get verified; the third stays invisible to the scan.
        assert!(db.confirm_job("second000000", t0() + Duration::minutes(1), true).unwrap());
        assert!(db.confirm_job("first0000000", t0() + Duration::minutes(2), true).unwrap());

        let pending = db.pending_jobs().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].code, "first0000000");
        assert_eq!(pending[1].code, "second000000");
    }

    #[test]
    fn processed_jobs_leave_the_scan_for_good() {
        let db = db();
        let id = db
            .create_job(1, "111", "ind", 10, 20, "code0003", t0(), ttl())
            .unwrap();
        assert!(db.confirm_job("code0003", t0(), true).unwrap());
        assert_eq!(db.pending_jobs().unwrap().len(), 1);

        db.mark_processed(&id).unwrap();
        assert!(db.pending_jobs().unwrap().is_empty());

        // A later cycle sees nothing either; the flag is terminal.
        db.mark_processed(&id).unwrap();
        assert!(db.pending_jobs().unwrap().is_empty());
    }

    #[test]
    fn create_job_does_not_touch_the_quota() {
        let db = db();
        db.create_job(1, "12345", "ind", 100, 200, "code0004", t0(), ttl())
            .unwrap();
        // Quota is spent at processing time, not at creation time.
        assert_eq!(db.remaining_requests(1, t0(), LIMIT, window()).unwrap(), 1);
    }

    #[test]
    fn live_job_gate() {
        let db = db();
        assert!(!db.has_live_job(1, t0()).unwrap());

        db.create_job(1, "12345", "ind", 100, 200, "code0005", t0(), ttl())
            .unwrap();
        assert!(db.has_live_job(1, t0()).unwrap());
        // Another user is unaffected.
        assert!(!db.has_live_job(2, t0()).unwrap());
        // The gate lifts once the link expires unclicked.
        assert!(!db.has_live_job(1, t0() + ttl() + Duration::seconds(1)).unwrap());

        // And once the link is clicked, the job is no longer "live".
        assert!(db.confirm_job("code0005", t0(), true).unwrap());
        assert!(!db.has_live_job(1, t0()).unwrap());
    }

    #[test]
    fn job_rows_carry_reply_coordinates() {
        let db = db();
        db.create_job(7, "555", "eu", 12345, 678, "code0006", t0(), ttl())
            .unwrap();
        assert!(db.confirm_job("code0006", t0(), true).unwrap());

        let pending = db.pending_jobs().unwrap();
        assert_eq!(pending[0].user_id, 7);
        assert_eq!(pending[0].uid, "555");
        assert_eq!(pending[0].region, "eu");
        assert_eq!(pending[0].chat_id, 12345);
        assert_eq!(pending[0].message_id, 678);
    }
}
