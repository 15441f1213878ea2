use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod competences;
mod config;
mod dashboard;
mod distribution;
mod error;
mod models;
mod report;
mod stats;
mod timeline;

use api::ApiClient;
use config::{FileConfig, Overrides, Settings};
use dashboard::Dashboard;
use distribution::Dimension;
use models::AttributionFilter;
use report::{OutputFormat, ReportData};

#[derive(Parser)]
#[command(name = "badge-analytics")]
#[command(about = "Badge attribution analytics for an organization", long_about = None)]
#[command(version)]
struct Cli {
    /// Base URL of the platform API
    #[arg(long, global = true, env = "BADGE_API_URL")]
    api_url: Option<String>,
    /// Bearer token attached to every request
    #[arg(long, global = true, env = "BADGE_API_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Organization identifier
    #[arg(long = "org", global = true, env = "BADGE_ORG_ID")]
    organization_id: Option<u64>,
    /// Records requested per page
    #[arg(long, global = true, env = "BADGE_PAGE_SIZE")]
    page_size: Option<u32>,
    /// TOML configuration file (defaults to ./badge-analytics.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    /// Only count badges of this series
    #[arg(long)]
    series: Option<String>,
    /// Only count badges attributed within this project
    #[arg(long)]
    project: Option<u64>,
}

impl From<FilterArgs> for AttributionFilter {
    fn from(args: FilterArgs) -> Self {
        Self {
            series: args.series,
            project_id: args.project,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List organization projects
    Projects {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Badges attributed per month over the last twelve months
    Timeline {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Share of badges per series or per competence level
    Distribution {
        #[arg(long, value_enum, default_value_t = Dimension::Series)]
        by: Dimension,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Competences by level, as plotted on the radar chart
    Competences {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Organization-wide totals
    Stats {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Generate a markdown report with every chart
    Report {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "badge_analytics=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let file_config = FileConfig::load(cli.config.as_deref())?;
    let settings = Settings::resolve(
        Overrides {
            api_url: cli.api_url,
            token: cli.token,
            organization_id: cli.organization_id,
            page_size: cli.page_size,
        },
        file_config,
    )?;

    let client = ApiClient::new(&settings.api_url, &settings.token, settings.page_size)
        .context("failed to build API client")?;
    let org = settings.organization_id;
    let today = Utc::now().date_naive();
    let dashboard = Dashboard::new();

    match cli.command {
        Commands::Projects { format } => {
            let projects = client
                .projects(org)
                .await
                .context("failed to list projects")?;
            print!("{}", report::render_projects(&projects, format)?);
        }
        Commands::Timeline { filter, format } => {
            let filter = AttributionFilter::from(filter);
            dashboard.refresh_timeline(&client, org, &filter, today).await;
            print!("{}", report::render_timeline(&dashboard.timeline.value(), format)?);
        }
        Commands::Distribution { by, filter, format } => {
            let filter = AttributionFilter::from(filter);
            dashboard.refresh_distribution(&client, org, &filter, by).await;
            print!(
                "{}",
                report::render_distribution(&dashboard.distribution.value(), format)?
            );
        }
        Commands::Competences { filter, format } => {
            let filter = AttributionFilter::from(filter);
            dashboard.refresh_competences(&client, org, &filter).await;
            print!(
                "{}",
                report::render_competences(&dashboard.competences.value(), format)?
            );
        }
        Commands::Stats { format } => {
            dashboard.refresh_stats(&client, org, today).await;
            print!("{}", report::render_stats(&dashboard.stats.value(), format)?);
        }
        Commands::Report { filter, out } => {
            let filter = AttributionFilter::from(filter);
            dashboard.refresh_all(&client, org, &filter, today).await;

            let stats = dashboard.stats.value();
            let timeline = dashboard.timeline.value();
            let distribution = dashboard.distribution.value();
            let competences = dashboard.competences.value();
            let recent = dashboard.recent.value();
            let report = report::build_report(&ReportData {
                filter: &filter,
                generated_on: today,
                stats: &stats,
                timeline: &timeline,
                distribution: &distribution,
                competences: &competences,
                recent: &recent,
            });
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
