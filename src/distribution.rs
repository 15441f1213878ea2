use std::collections::HashMap;

use clap::ValueEnum;

use crate::models::{BadgeAttribution, CategoryShare};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Dimension {
    /// Badge series, e.g. "CPS"
    Series,
    /// Competence name and level, e.g. "Adaptabilité (level_2)"
    Competence,
}

impl Dimension {
    pub fn category(self, record: &BadgeAttribution) -> Option<String> {
        match self {
            Dimension::Series => record.series().map(series_label),
            Dimension::Competence => {
                let name = record.competence()?;
                let level = record.level()?;
                Some(format!("{name} ({})", level.key()))
            }
        }
    }
}

/// Tallies records per category, in first-seen order.
///
/// Percentages are `round(count / total * 100)` with halves rounded away from
/// zero, so they sum to 100 within one point per extra category.
pub fn distribution<R, F>(records: &[R], category: F) -> Vec<CategoryShare>
where
    F: Fn(&R) -> Option<String>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut tallies: Vec<(String, usize)> = Vec::new();

    for record in records {
        let Some(label) = category(record) else {
            continue;
        };
        match positions.get(&label) {
            Some(&index) => tallies[index].1 += 1,
            None => {
                positions.insert(label.clone(), tallies.len());
                tallies.push((label, 1));
            }
        }
    }

    let total: usize = tallies.iter().map(|(_, count)| count).sum();

    tallies
        .into_iter()
        .map(|(label, count)| CategoryShare {
            label,
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

pub fn series_distribution(records: &[BadgeAttribution], dimension: Dimension) -> Vec<CategoryShare> {
    distribution(records, |record| dimension.category(record))
}

/// "Série TouKouLeur" -> "TouKouLeur"
pub fn series_label(series: &str) -> String {
    let trimmed = series.trim();
    ["Série ", "Serie "]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u32
}
