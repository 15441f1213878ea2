//! Chart pipelines.
//!
//! Every chart owns a [`ChartSlot`]: a loading flag plus the last result. A
//! refresh takes a ticket before fetching and only the newest ticket may
//! store its result, so a slow fetch for an old filter never overwrites a
//! newer one. A failed fetch leaves the chart empty without touching the
//! other charts.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::api::BadgeSource;
use crate::competences::{competence_matrix, CompetenceMatrix};
use crate::distribution::{series_distribution, Dimension};
use crate::error::ApiError;
use crate::models::{AttributionFilter, BadgeAttribution, CategoryShare, DerivedStats, MonthBucket};
use crate::report::recent_attributions;
use crate::stats::derive_stats;
use crate::timeline::monthly_buckets;

const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
struct SlotState<T> {
    generation: u64,
    loading: bool,
    value: T,
}

#[derive(Debug, Default)]
pub struct ChartSlot<T> {
    state: Arc<Mutex<SlotState<T>>>,
}

impl<T> Clone for ChartSlot<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Default> ChartSlot<T> {
    /// Marks the chart as loading and invalidates every earlier ticket.
    pub fn begin(&self) -> Ticket {
        let mut state = self.lock();
        state.generation += 1;
        state.loading = true;
        Ticket(state.generation)
    }

    /// Stores `value` if `ticket` is still the newest. Returns whether it was stored.
    pub fn complete(&self, ticket: Ticket, value: T) -> bool {
        let mut state = self.lock();
        if state.generation != ticket.0 {
            return false;
        }
        state.value = value;
        state.loading = false;
        true
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn value(&self) -> T {
        self.lock().value.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        // Values are replaced wholesale, so a poisoned lock still holds a whole value.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs one fetch+aggregate cycle into `slot`. A fetch error is logged and
/// stored as the empty value.
pub async fn refresh<T, Fut>(slot: &ChartSlot<T>, chart: &str, pipeline: Fut) -> bool
where
    T: Clone + Default,
    Fut: std::future::Future<Output = Result<T, ApiError>>,
{
    if slot.is_loading() {
        tracing::debug!(chart, "Superseding an in-flight refresh");
    }
    let ticket = slot.begin();
    let value = match pipeline.await {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(chart, %error, "Chart fetch failed; showing no data");
            T::default()
        }
    };
    let stored = slot.complete(ticket, value);
    if !stored {
        tracing::debug!(chart, "Discarding stale chart result");
    }
    stored
}

#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    pub timeline: ChartSlot<Vec<MonthBucket>>,
    pub distribution: ChartSlot<Vec<CategoryShare>>,
    pub competences: ChartSlot<CompetenceMatrix>,
    pub stats: ChartSlot<DerivedStats>,
    pub recent: ChartSlot<Vec<BadgeAttribution>>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes every chart concurrently. Charts do not wait on each other's
    /// success; each one degrades on its own.
    ///
    /// Each chart fetches its own attribution set, even when the filters match.
    pub async fn refresh_all<S: BadgeSource + ?Sized>(
        &self,
        source: &S,
        organization_id: u64,
        filter: &AttributionFilter,
        today: NaiveDate,
    ) {
        tokio::join!(
            self.refresh_timeline(source, organization_id, filter, today),
            self.refresh_distribution(source, organization_id, filter, Dimension::Series),
            self.refresh_competences(source, organization_id, filter),
            self.refresh_stats(source, organization_id, today),
            self.refresh_recent(source, organization_id, filter),
        );
    }

    pub async fn refresh_timeline<S: BadgeSource + ?Sized>(
        &self,
        source: &S,
        organization_id: u64,
        filter: &AttributionFilter,
        today: NaiveDate,
    ) -> bool {
        refresh(&self.timeline, "timeline", async {
            let records = source.badge_attributions(organization_id, filter).await?;
            Ok(monthly_buckets(&records, today))
        })
        .await
    }

    pub async fn refresh_distribution<S: BadgeSource + ?Sized>(
        &self,
        source: &S,
        organization_id: u64,
        filter: &AttributionFilter,
        dimension: Dimension,
    ) -> bool {
        // Filtering the series chart by series would leave a single slice.
        let filter = match dimension {
            Dimension::Series => filter.project_only(),
            Dimension::Competence => filter.clone(),
        };
        refresh(&self.distribution, "distribution", async {
            let records = source.badge_attributions(organization_id, &filter).await?;
            Ok(series_distribution(&records, dimension))
        })
        .await
    }

    pub async fn refresh_competences<S: BadgeSource + ?Sized>(
        &self,
        source: &S,
        organization_id: u64,
        filter: &AttributionFilter,
    ) -> bool {
        refresh(&self.competences, "competences", async {
            let records = source.badge_attributions(organization_id, filter).await?;
            Ok(competence_matrix(&records))
        })
        .await
    }

    pub async fn refresh_recent<S: BadgeSource + ?Sized>(
        &self,
        source: &S,
        organization_id: u64,
        filter: &AttributionFilter,
    ) -> bool {
        refresh(&self.recent, "recent", async {
            let records = source.badge_attributions(organization_id, filter).await?;
            Ok(recent_attributions(&records, RECENT_LIMIT))
        })
        .await
    }

    /// Statistics always use the unfiltered organization-wide set.
    pub async fn refresh_stats<S: BadgeSource + ?Sized>(
        &self,
        source: &S,
        organization_id: u64,
        today: NaiveDate,
    ) -> bool {
        refresh(&self.stats, "stats", async {
            let records = source
                .badge_attributions(organization_id, &AttributionFilter::default())
                .await?;
            let members = source.confirmed_member_count(organization_id).await?;
            Ok(derive_stats(&records, members, today))
        })
        .await
    }
}
