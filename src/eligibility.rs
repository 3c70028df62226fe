//! The donation eligibility rule.
//!
//! A donor may give blood again once 56 whole days have elapsed since their
//! last donation. The rule is pure: callers pass both timestamps, so the
//! service layer and tests share one definition.
use super::types::TimeStamp;
use chrono::{Duration, Utc};

/// Minimum whole days between donations
pub const DONATION_INTERVAL_DAYS: i64 = 56;

/// True when the donor has never donated, or at least 56 whole days have
/// elapsed. The boundary is inclusive: exactly 56 days means eligible.
pub fn is_eligible(last_donation: Option<&TimeStamp<Utc>>, now: &TimeStamp<Utc>) -> bool {
    match last_donation {
        None => true,
        Some(last) => {
            let elapsed = now.to_datetime_utc() - last.to_datetime_utc();
            elapsed.num_days() >= DONATION_INTERVAL_DAYS
        }
    }
}

/// The first instant the donor becomes eligible again, for display when the
/// rule rejects them.
pub fn next_eligible_date(last_donation: &TimeStamp<Utc>) -> TimeStamp<Utc> {
    (last_donation.to_datetime_utc() + Duration::days(DONATION_INTERVAL_DAYS)).into()
}
