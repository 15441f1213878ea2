use chrono::{Datelike, Months, NaiveDate};

use crate::models::{BadgeAttribution, MonthBucket};

pub const WINDOW_MONTHS: u32 = 12;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Janv", "Févr", "Mars", "Avr", "Mai", "Juin", "Juil", "Août", "Sept", "Oct", "Nov", "Déc",
];

/// Counts attributions per calendar month over the trailing window ending at
/// the month of `today`, oldest bucket first.
pub fn monthly_buckets(records: &[BadgeAttribution], today: NaiveDate) -> Vec<MonthBucket> {
    let keys = window_keys(today);
    let mut counts = vec![0usize; keys.len()];

    for record in records {
        let Some(date) = record.attributed_on() else {
            continue;
        };
        let key = (date.year(), date.month());
        if let Some(slot) = keys.iter().position(|candidate| *candidate == key) {
            counts[slot] += 1;
        }
    }

    keys.into_iter()
        .zip(counts)
        .map(|((year, month), count)| MonthBucket {
            label: month_label(year, month),
            count,
        })
        .collect()
}

/// `(year, month)` pairs for `[today-11 .. today]`, chronological.
fn window_keys(today: NaiveDate) -> Vec<(i32, u32)> {
    let anchor = today.with_day(1).unwrap_or(today);
    (0..WINDOW_MONTHS)
        .rev()
        .filter_map(|back| anchor.checked_sub_months(Months::new(back)))
        .map(|month| (month.year(), month.month()))
        .collect()
}

pub fn month_label(year: i32, month: u32) -> String {
    let name = MONTH_ABBREVIATIONS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("?");
    format!("{name} '{:02}", year.rem_euclid(100))
}
