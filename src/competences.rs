use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{BadgeAttribution, BadgeLevel, LevelCounts};

/// Data behind the competence radar chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CompetenceMatrix {
    /// No competence was observed; render an empty state instead of a chart.
    #[default]
    Empty,
    Populated {
        /// Competence names, sorted.
        axes: Vec<String>,
        /// One series per level, each aligned with `axes`.
        levels: [Vec<usize>; 4],
    },
}

impl CompetenceMatrix {
    pub fn is_empty(&self) -> bool {
        matches!(self, CompetenceMatrix::Empty)
    }

    pub fn axes(&self) -> &[String] {
        match self {
            CompetenceMatrix::Empty => &[],
            CompetenceMatrix::Populated { axes, .. } => axes,
        }
    }

    /// Counts for one competence; every level is reported, unseen ones as 0.
    pub fn row(&self, competence: &str) -> Option<LevelCounts> {
        let index = self.axes().iter().position(|axis| axis == competence)?;
        let levels = [
            BadgeLevel::Level1,
            BadgeLevel::Level2,
            BadgeLevel::Level3,
            BadgeLevel::Level4,
        ];
        Some(LevelCounts::from_slots(
            levels.map(|level| self.series(level)[index]),
        ))
    }

    pub fn series(&self, level: BadgeLevel) -> &[usize] {
        match self {
            CompetenceMatrix::Empty => &[],
            CompetenceMatrix::Populated { levels, .. } => &levels[level.index()],
        }
    }
}

pub fn competence_matrix(records: &[BadgeAttribution]) -> CompetenceMatrix {
    let mut rows: BTreeMap<&str, [usize; 4]> = BTreeMap::new();

    for record in records {
        let (Some(name), Some(level)) = (record.competence(), record.level()) else {
            continue;
        };
        rows.entry(name).or_insert([0; 4])[level.index()] += 1;
    }

    if rows.is_empty() {
        return CompetenceMatrix::Empty;
    }

    let mut axes = Vec::with_capacity(rows.len());
    let mut levels: [Vec<usize>; 4] = Default::default();
    for (name, slots) in rows {
        axes.push(name.to_string());
        for (series, count) in levels.iter_mut().zip(slots) {
            series.push(count);
        }
    }

    CompetenceMatrix::Populated { axes, levels }
}
