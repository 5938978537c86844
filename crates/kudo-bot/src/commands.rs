//! Inbound command routing: /check, /like and /addvip.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use thiserror::Error;
use tracing::{error, info};

use kudo_client::{LikeApiClient, ShortenerClient};
use kudo_db::Database;
use kudo_types::config::Config;
use kudo_types::like::LikeOutcome;

use crate::{format, verification};

/// Everything a command handler needs, injected through the dispatcher.
#[derive(Clone)]
pub struct BotContext {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub like: Arc<LikeApiClient>,
    pub shortener: Arc<ShortenerClient>,
}

/// Argument-parse failures carry the usage line to echo back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("❌ Wrong format. Use: /like <region> <uid>")]
    LikeUsage,
    #[error("❌ Use: /addvip <user_id> <days>")]
    AddVipUsage,
}

/// Entry point wired into the dispatcher. Failures are logged, never
/// returned, so one bad command cannot take the dispatcher down.
pub async fn handle_text_message(bot: Bot, msg: Message, ctx: BotContext) -> ResponseResult<()> {
    if let Err(e) = route(&bot, &msg, &ctx).await {
        error!("command handling failed: {e:#}");
    }
    Ok(())
}

async fn route(bot: &Bot, msg: &Message, ctx: &BotContext) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some((command, args)) = split_command(text) else {
        return Ok(());
    };

    match command.as_str() {
        "check" => check_command(bot, msg, ctx).await,
        "like" => like_command(bot, msg, ctx, &args).await,
        "addvip" => addvip_command(bot, msg, ctx, &args).await,
        _ => Ok(()),
    }
}

/// Splits `/name@bot arg…` into a lowercased name and its arguments.
/// Returns None for anything that is not a command.
fn split_command(text: &str) -> Option<(String, Vec<&str>)> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    let name = head.strip_prefix('/')?;
    if name.is_empty() {
        return None;
    }
    let name = name.split('@').next().unwrap_or(name).to_lowercase();
    Some((name, parts.collect()))
}

async fn check_command(bot: &Bot, msg: &Message, ctx: &BotContext) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let now = Utc::now();

    let reply = if ctx.config.admins.is_admin(user_id) {
        format::admin_status()
    } else if ctx.db.is_vip(user_id, now)? {
        format::vip_status()
    } else {
        let remaining = ctx.db.remaining_requests(
            user_id,
            now,
            ctx.config.daily_request_limit,
            ctx.config.reset_window,
        )?;
        format::quota_status(
            remaining,
            ctx.config.daily_request_limit,
            ctx.config.reset_window.num_hours(),
        )
    };

    send_markdown(bot, msg, &reply).await
}

async fn like_command(bot: &Bot, msg: &Message, ctx: &BotContext, args: &[&str]) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let now = Utc::now();

    let is_admin = ctx.config.admins.is_admin(user_id);
    let is_vip = ctx.db.is_vip(user_id, now)?;

    // Ordinary users spend quota at processing time; here we only refuse
    // early when nothing is left, without minting a job.
    if !is_admin && !is_vip {
        let remaining = ctx.db.remaining_requests(
            user_id,
            now,
            ctx.config.daily_request_limit,
            ctx.config.reset_window,
        )?;
        if remaining <= 0 {
            return send_markdown(bot, msg, format::LIMIT_EXCEEDED).await;
        }
    }

    let (region, uid) = match parse_like_args(args) {
        Ok(pair) => pair,
        Err(e) => return send_plain(bot, msg, &e.to_string()).await,
    };

    // Admins and VIPs get the action inline, no verification.
    if is_admin || is_vip {
        let outcome = ctx.like.deliver(&region, &uid).await;
        if matches!(outcome, LikeOutcome::Delivered(_)) {
            ctx.db.touch_last_used(user_id, now)?;
        }
        return send_markdown(bot, msg, &format::like_outcome(&outcome, &uid, Utc::now())).await;
    }

    // One live link per user.
    if ctx.db.has_live_job(user_id, now)? {
        return send_markdown(bot, msg, format::PENDING_VERIFICATION).await;
    }

    let code = verification::mint_code();
    let verify_url = verification::verify_url(&ctx.config.public_base_url, &code);
    let link = ctx.shortener.shorten(&verify_url).await;

    ctx.db.create_job(
        user_id,
        &uid,
        &region,
        msg.chat.id.0,
        msg.id.0 as i64,
        &code,
        now,
        ctx.config.link_ttl,
    )?;
    info!("verification job created for user {}", user_id);

    let prompt = format::verification_prompt(
        &user.first_name,
        &uid,
        &region,
        &link,
        ctx.config.vip_url.as_deref(),
        ctx.config.link_ttl.num_minutes(),
    );
    let mut request = bot
        .send_message(msg.chat.id, prompt)
        .parse_mode(ParseMode::Markdown);
    if let Some(keyboard) = format::verification_keyboard(&link, ctx.config.help_url.as_deref()) {
        request = request.reply_markup(keyboard);
    }
    request.await?;
    Ok(())
}

async fn addvip_command(bot: &Bot, msg: &Message, ctx: &BotContext, args: &[&str]) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if !ctx.config.admins.is_admin(user.id.0 as i64) {
        return send_plain(bot, msg, format::NOT_AUTHORIZED).await;
    }

    let (target, days) = match parse_addvip_args(args) {
        Ok(pair) => pair,
        Err(e) => return send_plain(bot, msg, &e.to_string()).await,
    };

    let expires_at = Utc::now() + chrono::Duration::days(days);
    ctx.db.grant_vip(target, expires_at)?;
    info!("VIP granted to user {} for {} days", target, days);

    send_markdown(bot, msg, &format::vip_granted(target, days, expires_at)).await
}

fn parse_like_args(args: &[&str]) -> Result<(String, String), ParseError> {
    match args {
        [region, uid, ..] => Ok((region.to_lowercase(), (*uid).to_string())),
        _ => Err(ParseError::LikeUsage),
    }
}

fn parse_addvip_args(args: &[&str]) -> Result<(i64, i64), ParseError> {
    match args {
        [target, days, ..] => {
            let target = target.parse().map_err(|_| ParseError::AddVipUsage)?;
            let days = days.parse().map_err(|_| ParseError::AddVipUsage)?;
            Ok((target, days))
        }
        _ => Err(ParseError::AddVipUsage),
    }
}

async fn send_markdown(bot: &Bot, msg: &Message, text: &str) -> Result<()> {
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Markdown)
        .await?;
    Ok(())
}

async fn send_plain(bot: &Bot, msg: &Message, text: &str) -> Result<()> {
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
