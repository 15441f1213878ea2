use chrono::{Datelike, NaiveDate};

use crate::models::{BadgeAttribution, DerivedStats};

pub fn derive_stats(
    records: &[BadgeAttribution],
    member_count: usize,
    today: NaiveDate,
) -> DerivedStats {
    let total = records.len();
    let this_month = records
        .iter()
        .filter_map(BadgeAttribution::attributed_on)
        .filter(|date| date.year() == today.year() && date.month() == today.month())
        .count();

    DerivedStats {
        total,
        this_month,
        average_per_member: average_per_member(total, member_count),
    }
}

/// `total / members`, one decimal, 0 when there are no members.
pub fn average_per_member(total: usize, member_count: usize) -> f64 {
    if member_count == 0 {
        return 0.0;
    }
    (total as f64 / member_count as f64 * 10.0).round() / 10.0
}
