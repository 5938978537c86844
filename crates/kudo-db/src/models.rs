/// Database row types — these map directly to SQLite rows.
/// Timestamps stay as stored strings here; callers parse them with
/// `parse_ts` when they need instants.
pub struct ProfileRow {
    pub user_id: i64,
    pub vip_expires_at: Option<String>,
    pub last_used_at: Option<String>,
}

pub struct QuotaRow {
    pub user_id: i64,
    pub last_request_at: String,
    pub remaining: i64,
}

pub struct VerificationJobRow {
    pub id: String,
    pub code: String,
    pub user_id: i64,
    pub uid: String,
    pub region: String,
    pub verified: bool,
    pub verified_at: Option<String>,
    pub processed: bool,
    pub expires_at: String,
    pub chat_id: i64,
    pub message_id: i64,
    pub created_at: String,
}
