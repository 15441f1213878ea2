use std::fmt::Write;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;

use crate::competences::CompetenceMatrix;
use crate::models::{
    AttributionFilter, BadgeAttribution, CategoryShare, DerivedStats, MonthBucket,
    ProjectRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Serialize)]
struct CompetenceRow<'a> {
    competence: &'a str,
    level_1: usize,
    level_2: usize,
    level_3: usize,
    level_4: usize,
}

pub fn render_timeline(buckets: &[MonthBucket], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(buckets)?),
        OutputFormat::Csv => to_csv(buckets),
        OutputFormat::Table => {
            let mut output = String::new();
            for bucket in buckets {
                let _ = writeln!(output, "{:<10} {:>5}", bucket.label, bucket.count);
            }
            Ok(output)
        }
    }
}

pub fn render_distribution(
    shares: &[CategoryShare],
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(shares)?),
        OutputFormat::Csv => to_csv(shares),
        OutputFormat::Table => {
            if shares.is_empty() {
                return Ok("No attributions found.\n".to_string());
            }
            let mut output = String::new();
            for share in shares {
                let _ = writeln!(
                    output,
                    "- {}: {} badges ({}%)",
                    share.label, share.count, share.percentage
                );
            }
            Ok(output)
        }
    }
}

pub fn render_competences(
    matrix: &CompetenceMatrix,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(matrix)?),
        OutputFormat::Csv => to_csv(competence_rows(matrix)),
        OutputFormat::Table => {
            if matrix.is_empty() {
                return Ok("No competences attributed yet.\n".to_string());
            }
            let mut output = String::new();
            let _ = writeln!(
                output,
                "{:<30} {:>8} {:>8} {:>8} {:>8}",
                "competence", "level_1", "level_2", "level_3", "level_4"
            );
            for row in competence_rows(matrix) {
                let _ = writeln!(
                    output,
                    "{:<30} {:>8} {:>8} {:>8} {:>8}",
                    row.competence, row.level_1, row.level_2, row.level_3, row.level_4
                );
            }
            Ok(output)
        }
    }
}

pub fn render_stats(stats: &DerivedStats, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(stats)?),
        OutputFormat::Csv => to_csv([stats]),
        OutputFormat::Table => Ok(format!(
            "Total badges: {}\nThis month: {}\nAverage per member: {:.1}\n",
            stats.total, stats.this_month, stats.average_per_member
        )),
    }
}

pub fn render_projects(projects: &[ProjectRef], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(projects)?),
        OutputFormat::Csv => to_csv(projects),
        OutputFormat::Table => {
            if projects.is_empty() {
                return Ok("No projects found.\n".to_string());
            }
            let mut output = String::new();
            for project in projects {
                let _ = writeln!(output, "{:>6}  {}", project.id, project.title);
            }
            Ok(output)
        }
    }
}

/// Snapshot of every chart, as rendered into the markdown report.
pub struct ReportData<'a> {
    pub filter: &'a AttributionFilter,
    pub generated_on: NaiveDate,
    pub stats: &'a DerivedStats,
    pub timeline: &'a [MonthBucket],
    pub distribution: &'a [CategoryShare],
    pub competences: &'a CompetenceMatrix,
    pub recent: &'a [BadgeAttribution],
}

pub fn build_report(data: &ReportData<'_>) -> String {
    let mut output = String::new();
    let scope = scope_label(data.filter);

    let _ = writeln!(output, "# Badge Analytics Report");
    let _ = writeln!(output, "Generated for {} on {}", scope, data.generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Total badges: {}", data.stats.total);
    let _ = writeln!(output, "- This month: {}", data.stats.this_month);
    let _ = writeln!(
        output,
        "- Average per member: {:.1}",
        data.stats.average_per_member
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Badges per Month");
    for bucket in data.timeline {
        let _ = writeln!(output, "- {}: {}", bucket.label, bucket.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Series Mix");
    if data.distribution.is_empty() {
        let _ = writeln!(output, "No attributions recorded for this scope.");
    } else {
        for share in data.distribution {
            let _ = writeln!(
                output,
                "- {}: {} badges ({}%)",
                share.label, share.count, share.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Competences by Level");
    if data.competences.is_empty() {
        let _ = writeln!(output, "No competences attributed for this scope.");
    } else {
        let _ = writeln!(output, "| Competence | Level 1 | Level 2 | Level 3 | Level 4 |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for row in competence_rows(data.competences) {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                row.competence, row.level_1, row.level_2, row.level_3, row.level_4
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Attributions");
    if data.recent.is_empty() {
        let _ = writeln!(output, "No attributions recorded for this scope.");
    } else {
        for attribution in data.recent {
            let _ = writeln!(output, "- {}", describe_attribution(attribution));
        }
    }

    output
}

/// Most recent attributions first; undated records sort last.
pub fn recent_attributions(records: &[BadgeAttribution], limit: usize) -> Vec<BadgeAttribution> {
    let mut dated: Vec<(Option<NaiveDate>, &BadgeAttribution)> = records
        .iter()
        .map(|record| (record.attributed_on(), record))
        .collect();
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated
        .into_iter()
        .take(limit)
        .map(|(_, record)| record.clone())
        .collect()
}

fn describe_attribution(attribution: &BadgeAttribution) -> String {
    let receiver = attribution
        .receiver
        .as_ref()
        .map(|member| member.display_name())
        .unwrap_or_else(|| "unknown member".to_string());
    let competence = attribution
        .competence()
        .map(str::to_string)
        .unwrap_or_else(|| format!("attribution #{}", attribution.id));
    let level = attribution
        .level()
        .map(|level| format!(" {}", level.key()))
        .unwrap_or_default();
    let date = attribution
        .attributed_on()
        .map(|date| date.to_string())
        .unwrap_or_else(|| "undated".to_string());

    let mut line = format!("{receiver}: {competence}{level} on {date}");
    if let Some(project) = &attribution.project {
        let _ = write!(line, " ({})", project.title);
    }
    if let Some(comment) = attribution.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = write!(line, ": {}", comment.trim());
    }
    if let Some(proof) = attribution.proof.as_ref().and_then(|proof| proof.label()) {
        let _ = write!(line, " [proof: {proof}]");
    }
    line
}

fn scope_label(filter: &AttributionFilter) -> String {
    match (&filter.series, filter.project_id) {
        (Some(series), Some(project_id)) => format!("{series}, project {project_id}"),
        (Some(series), None) => series.clone(),
        (None, Some(project_id)) => format!("project {project_id}"),
        (None, None) => "the whole organization".to_string(),
    }
}

fn competence_rows(matrix: &CompetenceMatrix) -> Vec<CompetenceRow<'_>> {
    matrix
        .axes()
        .iter()
        .map(|competence| {
            let counts = matrix.row(competence).unwrap_or_default();
            CompetenceRow {
                competence,
                level_1: counts.level_1,
                level_2: counts.level_2,
                level_3: counts.level_3,
                level_4: counts.level_4,
            }
        })
        .collect()
}

fn to_csv<S, I>(rows: I) -> anyhow::Result<String>
where
    S: Serialize,
    I: IntoIterator<Item = S>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::competences::competence_matrix;
    use crate::models::{BadgeDescriptor, MemberRef, ProofFile};

    fn attribution(id: u64, date: Option<&str>, name: &str, level: &str) -> BadgeAttribution {
        BadgeAttribution {
            id,
            assigned_at: date.map(str::to_string),
            badge: Some(BadgeDescriptor {
                name: Some(name.to_string()),
                series: Some("Série CPS".to_string()),
                level: Some(level.to_string()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn recent_attributions_are_newest_first() {
        let records = vec![
            attribution(1, Some("2024-01-10"), "A", "level_1"),
            attribution(2, None, "B", "level_1"),
            attribution(3, Some("2024-05-02"), "C", "level_1"),
            attribution(4, Some("2024-03-15"), "D", "level_1"),
        ];
        let recent = recent_attributions(&records, 3);
        let ids: Vec<u64> = recent.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 1]);
    }

    #[test]
    fn describes_attribution_with_context() {
        let mut record = attribution(1, Some("2024-05-02"), "Adaptabilité", "level_2");
        record.receiver = Some(MemberRef {
            id: 4,
            first_name: Some("Awa".to_string()),
            last_name: Some("Diallo".to_string()),
            email: None,
        });
        record.project = Some(ProjectRef { id: 12, title: "Forum métiers".to_string() });
        record.comment = Some(" Très investie ".to_string());
        record.proof = Some(ProofFile { filename: Some("attestation.pdf".to_string()), url: None });

        assert_eq!(
            describe_attribution(&record),
            "Awa Diallo: Adaptabilité level_2 on 2024-05-02 (Forum métiers): Très investie [proof: attestation.pdf]"
        );
    }

    #[test]
    fn competences_render_as_csv_with_all_levels() {
        let matrix = competence_matrix(&[attribution(1, None, "X", "level_2")]);
        let csv = render_competences(&matrix, OutputFormat::Csv).unwrap();
        assert_eq!(csv, "competence,level_1,level_2,level_3,level_4\nX,0,1,0,0\n");
    }

    #[test]
    fn empty_distribution_renders_message() {
        let text = render_distribution(&[], OutputFormat::Table).unwrap();
        assert_eq!(text, "No attributions found.\n");
    }

    #[test]
    fn report_lists_every_section() {
        let filter = AttributionFilter {
            series: Some("Série CPS".to_string()),
            project_id: None,
        };
        let stats = DerivedStats { total: 14, this_month: 2, average_per_member: 0.3 };
        let timeline = vec![MonthBucket { label: "Juin '24".to_string(), count: 2 }];
        let distribution = vec![CategoryShare { label: "CPS".to_string(), count: 14, percentage: 100 }];
        let competences = CompetenceMatrix::Empty;

        let report = build_report(&ReportData {
            filter: &filter,
            generated_on: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            stats: &stats,
            timeline: &timeline,
            distribution: &distribution,
            competences: &competences,
            recent: &[],
        });

        assert!(report.starts_with("# Badge Analytics Report\nGenerated for Série CPS on 2024-06-15\n"));
        assert!(report.contains("- Average per member: 0.3\n"));
        assert!(report.contains("- Juin '24: 2\n"));
        assert!(report.contains("- CPS: 14 badges (100%)\n"));
        assert!(report.contains("No competences attributed for this scope."));
        assert!(report.ends_with("No attributions recorded for this scope.\n"));
    }
}
