use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ParseMode, ReplyParameters};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kudo_bot::format;
use kudo_client::LikeApiClient;
use kudo_db::{Database, models::VerificationJobRow};
use kudo_types::config::Config;
use kudo_types::like::LikeOutcome;

/// Background task that drains verified-but-unprocessed jobs.
///
/// Runs on a fixed interval. Each verified job is re-authorized, acted on
/// once, answered in its originating chat, and flagged processed. The
/// flag flips exactly once per job regardless of how the action went.
pub async fn run_processor_loop(
    db: Arc<Database>,
    config: Arc<Config>,
    like: Arc<LikeApiClient>,
    bot: Bot,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.poll_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Job processor stopping");
                return;
            }
            _ = interval.tick() => {}
        }

        let jobs = match db.pending_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("pending-job scan failed: {e:#}");
                continue;
            }
        };

        for job in jobs {
            if let Err(e) = process_job(&db, &config, &like, &bot, &job).await {
                // Store trouble: leave the job for the next cycle.
                warn!("job {} deferred: {e:#}", job.id);
            }
        }
    }
}

/// Whether a verified job still warrants an action call.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    LimitExceeded,
    Proceed,
}

/// Re-checks authorization at processing time. Admins and VIPs are exempt
/// from quota; everyone else spends one request here, not at job
/// creation.
fn settle_quota(
    db: &Database,
    config: &Config,
    user_id: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<Disposition> {
    let exempt = config.admins.is_admin(user_id) || db.is_vip(user_id, now)?;
    if !exempt
        && !db.consume_request(
            user_id,
            now,
            config.daily_request_limit,
            config.reset_window,
        )?
    {
        return Ok(Disposition::LimitExceeded);
    }
    Ok(Disposition::Proceed)
}

async fn process_job(
    db: &Database,
    config: &Config,
    like: &LikeApiClient,
    bot: &Bot,
    job: &VerificationJobRow,
) -> anyhow::Result<()> {
    let now = Utc::now();

    if settle_quota(db, config, job.user_id, now)? == Disposition::LimitExceeded {
        reply(bot, job, format::LIMIT_EXCEEDED).await;
        db.mark_processed(&job.id)?;
        return Ok(());
    }

    let outcome = like.deliver(&job.region, &job.uid).await;
    if matches!(outcome, LikeOutcome::Delivered(_)) {
        db.touch_last_used(job.user_id, now)?;
    }

    reply(bot, job, &format::like_outcome(&outcome, &job.uid, Utc::now())).await;
    db.mark_processed(&job.id)?;
    Ok(())
}

/// Telegram delivery failures are logged, never propagated; the job still
/// counts as handled.
async fn reply(bot: &Bot, job: &VerificationJobRow, text: &str) {
    let send = bot
        .send_message(ChatId(job.chat_id), text)
        .parse_mode(ParseMode::Markdown)
        .reply_parameters(ReplyParameters::new(MessageId(job.message_id as i32)));

    if let Err(e) = send.await {
        warn!("reply to chat {} failed: {}", job.chat_id, e);
    }
}
