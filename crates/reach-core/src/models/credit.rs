//! Monthly free credits and test-send audit rows

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::campaign::Channel;

/// Free message allowance for one account and calendar month.
///
/// Credits apply to Brand campaigns only; each credit covers one successful
/// send at zero cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyCredit {
    pub account_id: Uuid,

    /// Calendar month key, `YYYY-MM`
    pub year_month: String,

    pub total_credits: i32,

    pub used_credits: i32,

    pub updated_at: DateTime<Utc>,
}

impl MonthlyCredit {
    /// Credits still available this month
    #[inline]
    pub fn remaining(&self) -> i32 {
        (self.total_credits - self.used_credits).max(0)
    }

    /// Month key for a point in time, `YYYY-MM`
    pub fn month_key(at: DateTime<Utc>) -> String {
        format!("{:04}-{:02}", at.year(), at.month())
    }
}

/// Audit row for a single test send. Test sends skip the ledger but are
/// always persisted, successful or not, and counted against the daily cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSend {
    /// Unique identifier
    pub id: Uuid,

    pub account_id: Uuid,

    /// Normalized destination phone
    pub phone: String,

    pub content: String,

    pub channel: Channel,

    pub has_media: bool,

    pub succeeded: bool,

    pub tracking_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_remaining_clamps_at_zero() {
        let credit = MonthlyCredit {
            account_id: Uuid::new_v4(),
            year_month: "2026-08".to_string(),
            total_credits: 30,
            used_credits: 32,
            updated_at: Utc::now(),
        };
        assert_eq!(credit.remaining(), 0);
    }

    #[test]
    fn test_month_key() {
        let at = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(MonthlyCredit::month_key(at), "2026-03");
    }
}
