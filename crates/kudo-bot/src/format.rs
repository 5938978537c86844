//! User-facing reply text. Everything the bot says lives here.

use chrono::{DateTime, Utc};
use kudo_types::like::LikeOutcome;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

pub const LIMIT_EXCEEDED: &str =
    "🚫 You have exceeded your daily request limit. Try again tomorrow.";
pub const NOT_AUTHORIZED: &str = "🚫 You are not authorized to use this command.";
pub const PENDING_VERIFICATION: &str =
    "⏳ You already have a verification link pending. Finish that one first.";

pub fn admin_status() -> String {
    "👑 *Admin Status*\n\nYou have unlimited requests and no verification required!".into()
}

pub fn vip_status() -> String {
    "🌟 *VIP Status*\n\nYou have unlimited requests and no verification required!".into()
}

pub fn quota_status(remaining: i64, limit: i64, reset_hours: i64) -> String {
    format!(
        "📊 *Your Request Status*\n\n\
         📅 Daily requests left: {remaining}/{limit}\n\
         ⏳ Requests reset every {reset_hours} hours"
    )
}

pub fn like_outcome(outcome: &LikeOutcome, uid: &str, processed_at: DateTime<Utc>) -> String {
    match outcome {
        LikeOutcome::Delivered(d) => format!(
            "✅ *Request Processed Successfully*\n\n\
             👤 *Player:* {}\n\
             🆔 *UID:* `{}`\n\
             👍 *Likes Before:* {}\n\
             ✨ *Likes Added:* {}\n\
             📈 *Total Likes Now:* {}\n\
             ⏰ *Processed At:* {}",
            d.nickname,
            uid,
            d.likes_before,
            d.likes_added,
            d.likes_after,
            processed_at.format("%Y-%m-%d %H:%M:%S"),
        ),
        LikeOutcome::Saturated => {
            "❌ Max likes reached for your UID, please provide another UID".into()
        }
        LikeOutcome::Failed { detail: None } => "❌ *API Error: Unable to process like*".into(),
        LikeOutcome::Failed {
            detail: Some(detail),
        } => format!(
            "❌ *API Error: Unable to process like*\n\n🆔 *UID:* `{uid}`\n📛 Error: {detail}"
        ),
    }
}

pub fn verification_prompt(
    first_name: &str,
    uid: &str,
    region: &str,
    link: &str,
    vip_url: Option<&str>,
    ttl_minutes: i64,
) -> String {
    let name = if first_name.is_empty() {
        "User"
    } else {
        first_name
    };
    let mut text = format!(
        "🔒 *Verification Required*\n\n\
         🤵 *Hello:* {name}\n\
         🆔 *Uid:* `{uid}`\n\
         🌍 *Region:* {region}\n\n\
         Verify to get 1 more request. This is free\n\
         {link}\n\
         ⚠️ Link expires in {ttl_minutes} minutes"
    );
    if let Some(vip) = vip_url {
        text.push_str(&format!("\n*Purchase Vip&No Verify* {vip}"));
    }
    text
}

pub fn vip_granted(target: i64, days: i64, expires_at: DateTime<Utc>) -> String {
    format!(
        "✅ VIP access granted to user `{target}` for {days} days (until {})",
        expires_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

/// Button rows for the verification prompt. A link that fails to parse
/// drops its button rather than the whole message.
pub fn verification_keyboard(link: &str, help_url: Option<&str>) -> Option<InlineKeyboardMarkup> {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    if let Ok(link) = Url::parse(link) {
        rows.push(vec![InlineKeyboardButton::url(
            "✅ VERIFY & SEND LIKE ✅",
            link,
        )]);
    }
    if let Some(raw) = help_url {
        if let Ok(help) = Url::parse(raw) {
            rows.push(vec![InlineKeyboardButton::url("❓ How to Verify ❓", help)]);
        }
    }
    if rows.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(rows))
    }
}
