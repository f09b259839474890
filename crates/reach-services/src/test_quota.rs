//! Test-send quota
//!
//! Caps test sends per account per calendar day, counted from the audit
//! rows. The check runs before any gateway call.

use chrono::{DateTime, Utc};
use reach_core::{traits::TestSendLog, AppError, AppResult};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Daily test-send quota guard
pub struct TestSendQuota<L: TestSendLog> {
    log: Arc<L>,
    daily_limit: i32,
}

impl<L: TestSendLog> TestSendQuota<L> {
    /// Create a quota guard with the given daily limit
    pub fn new(log: Arc<L>, daily_limit: i32) -> Self {
        Self { log, daily_limit }
    }

    /// The underlying audit log
    pub fn log(&self) -> &L {
        &self.log
    }

    /// Fail with `TestQuotaExceeded` when the account has used up today's
    /// allowance
    #[instrument(skip(self))]
    pub async fn check(&self, account_id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        let used = self.log.count_today(account_id, now).await?;

        if used >= i64::from(self.daily_limit) {
            warn!(
                "Account {} exceeded test send quota ({}/{})",
                account_id, used, self.daily_limit
            );
            return Err(AppError::TestQuotaExceeded {
                limit: self.daily_limit,
            });
        }

        debug!(
            "Account {} has used {}/{} test sends today",
            account_id, used, self.daily_limit
        );

        Ok(())
    }
}
