//! Send-window guard
//!
//! Brand messages may only go out between 08:00:00 and 20:50:00 inclusive,
//! store-local time. Outside the window the guard rejects the dispatch and
//! reports the next 08:00 boundary so an external scheduler can retry then.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use reach_core::{AppError, AppResult};
use tracing::debug;

const WINDOW_OPEN: NaiveTime = match NaiveTime::from_hms_opt(8, 0, 0) {
    Some(t) => t,
    None => unreachable!(),
};
const WINDOW_CLOSE: NaiveTime = match NaiveTime::from_hms_opt(20, 50, 0) {
    Some(t) => t,
    None => unreachable!(),
};

/// Store-local send window
#[derive(Debug, Clone, Copy)]
pub struct SendWindow {
    tz: Tz,
}

impl SendWindow {
    /// Create a window in the given timezone
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Create a window from an IANA timezone name
    pub fn from_name(name: &str) -> AppResult<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|_| AppError::Config(format!("Unknown timezone: {}", name)))?;
        Ok(Self::new(tz))
    }

    /// Check if the window is open at `now`
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local_time = now.with_timezone(&self.tz).time();
        local_time >= WINDOW_OPEN && local_time <= WINDOW_CLOSE
    }

    /// Next time the window opens at or after `now`.
    ///
    /// Before 08:00 this is 08:00 the same day; during or after the window
    /// it is 08:00 the next day.
    pub fn next_open(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.tz);
        let date = if local.time() < WINDOW_OPEN {
            local.date_naive()
        } else {
            local.date_naive() + Duration::days(1)
        };

        let opening = self
            .tz
            .from_local_datetime(&date.and_time(WINDOW_OPEN))
            .earliest()
            .unwrap_or_else(|| self.tz.from_utc_datetime(&date.and_time(WINDOW_OPEN)));

        opening.with_timezone(&Utc)
    }

    /// Fail with `SendWindowClosed` if the window is not open at `now`
    pub fn check(&self, now: DateTime<Utc>) -> AppResult<()> {
        if self.is_open(now) {
            return Ok(());
        }

        let next_available = self.next_open(now);
        debug!(
            "Send window closed at {}, next opening {}",
            now, next_available
        );
        Err(AppError::SendWindowClosed { next_available })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono_tz::Asia::Seoul;

    fn seoul_utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        let local = NaiveDate::from_ymd_opt(2026, 8, 15)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap();
        Seoul
            .from_local_datetime(&local)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_window_boundaries() {
        let window = SendWindow::new(Seoul);

        assert!(window.is_open(seoul_utc(8, 0, 0)));
        assert!(window.is_open(seoul_utc(20, 50, 0)));
        assert!(window.is_open(seoul_utc(14, 30, 0)));

        assert!(!window.is_open(seoul_utc(7, 59, 59)));
        assert!(!window.is_open(seoul_utc(20, 50, 1)));
        assert!(!window.is_open(seoul_utc(23, 0, 0)));
    }

    #[test]
    fn test_next_open_before_window() {
        let window = SendWindow::new(Seoul);

        let next = window.next_open(seoul_utc(6, 30, 0));
        assert_eq!(next, seoul_utc(8, 0, 0));
    }

    #[test]
    fn test_next_open_after_close_is_tomorrow() {
        let window = SendWindow::new(Seoul);

        let next = window.next_open(seoul_utc(21, 0, 0));
        let next_local = next.with_timezone(&Seoul);
        assert_eq!(next_local.time(), WINDOW_OPEN);
        assert_eq!(
            next_local.date_naive(),
            NaiveDate::from_ymd_opt(2026, 8, 16).unwrap()
        );
    }

    #[test]
    fn test_check_carries_next_available() {
        let window = SendWindow::new(Seoul);

        match window.check(seoul_utc(21, 0, 0)) {
            Err(AppError::SendWindowClosed { next_available }) => {
                assert!(next_available > seoul_utc(21, 0, 0));
            }
            other => panic!("expected SendWindowClosed, got {:?}", other.is_ok()),
        }

        assert!(window.check(seoul_utc(12, 0, 0)).is_ok());
    }

    #[test]
    fn test_from_name() {
        assert!(SendWindow::from_name("Asia/Seoul").is_ok());
        assert!(SendWindow::from_name("Not/AZone").is_err());
    }
}
