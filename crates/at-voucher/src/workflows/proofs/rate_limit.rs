use chrono::{DateTime, Duration, Utc};

use super::domain::{ProofSubmissionAudit, SubmissionChannel};
use crate::config::ProgramConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("too many {channel:?} proof submissions; limit is {limit} per hour, retry in {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub channel: SubmissionChannel,
    pub limit: usize,
    pub retry_after_secs: i64,
}

/// Rolling-window cap on proof submissions per user and channel.
#[derive(Debug, Clone)]
pub struct ProofRateLimiter {
    web_limit: usize,
    email_limit: usize,
    window: Duration,
}

impl ProofRateLimiter {
    pub fn new(web_limit: usize, email_limit: usize, window: Duration) -> Self {
        Self {
            web_limit,
            email_limit,
            window,
        }
    }

    pub fn from_config(config: &ProgramConfig) -> Self {
        Self::new(
            config.web_proof_limit_per_hour,
            config.email_proof_limit_per_hour,
            Duration::hours(1),
        )
    }

    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// `recent` holds the user's audits since `window_start`; other channels are ignored.
    pub fn check(
        &self,
        channel: SubmissionChannel,
        recent: &[ProofSubmissionAudit],
        now: DateTime<Utc>,
    ) -> Result<(), RateLimitExceeded> {
        let limit = match channel {
            SubmissionChannel::Web => self.web_limit,
            SubmissionChannel::Email => self.email_limit,
        };
        let window_start = self.window_start(now);
        let in_window = recent
            .iter()
            .filter(|audit| audit.channel == channel && audit.submitted_at > window_start);

        let mut count = 0usize;
        let mut oldest: Option<DateTime<Utc>> = None;
        for audit in in_window {
            count += 1;
            oldest = Some(oldest.map_or(audit.submitted_at, |seen| seen.min(audit.submitted_at)));
        }

        if count < limit {
            return Ok(());
        }

        let retry_after_secs = oldest
            .map(|oldest| (oldest + self.window - now).num_seconds().max(1))
            .unwrap_or(1);
        Err(RateLimitExceeded {
            channel,
            limit,
            retry_after_secs,
        })
    }
}
