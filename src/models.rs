use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// One page of a listing endpoint.
///
/// Entries of `data` that do not decode as `T` are dropped one by one; the
/// rest of the page is kept.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct Page<T> {
    #[serde(default = "Vec::new", deserialize_with = "skip_malformed")]
    pub data: Vec<T>,
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub total_pages: Option<u32>,
}

impl<T> Page<T> {
    /// A missing meta block, or a zero page count, means the listing fits in one page.
    pub fn total_pages(&self) -> u32 {
        self.meta
            .as_ref()
            .and_then(|meta| meta.total_pages)
            .unwrap_or(1)
            .max(1)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BadgeAttribution {
    pub id: u64,
    #[serde(default)]
    pub assigned_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub badge: Option<BadgeDescriptor>,
    #[serde(default, deserialize_with = "lenient")]
    pub receiver: Option<MemberRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub project: Option<ProjectRef>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub proof: Option<ProofFile>,
}

impl BadgeAttribution {
    /// Attribution date: `assigned_at`, falling back to `created_at` when the
    /// former is absent or blank. Unparseable values yield `None`.
    pub fn attributed_on(&self) -> Option<NaiveDate> {
        let raw = [self.assigned_at.as_deref(), self.created_at.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())?;
        parse_timestamp(raw)
    }

    pub fn competence(&self) -> Option<&str> {
        self.badge
            .as_ref()
            .and_then(|badge| badge.name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    pub fn series(&self) -> Option<&str> {
        self.badge
            .as_ref()
            .and_then(|badge| badge.series.as_deref())
            .filter(|series| !series.trim().is_empty())
    }

    pub fn level(&self) -> Option<BadgeLevel> {
        self.badge
            .as_ref()
            .and_then(|badge| badge.level.as_deref())
            .and_then(BadgeLevel::parse)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BadgeDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProofFile {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ProofFile {
    pub fn label(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .or(self.url.as_deref())
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectRef {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberRef {
    pub id: u64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl MemberRef {
    /// Full name when known, then email, then the bare id.
    pub fn display_name(&self) -> String {
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full_name.is_empty() {
            return full_name;
        }
        self.email
            .clone()
            .unwrap_or_else(|| format!("member #{}", self.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BadgeLevel {
    Level1,
    Level2,
    Level3,
    Level4,
}

impl BadgeLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "level_1" => Some(BadgeLevel::Level1),
            "level_2" => Some(BadgeLevel::Level2),
            "level_3" => Some(BadgeLevel::Level3),
            "level_4" => Some(BadgeLevel::Level4),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            BadgeLevel::Level1 => "level_1",
            BadgeLevel::Level2 => "level_2",
            BadgeLevel::Level3 => "level_3",
            BadgeLevel::Level4 => "level_4",
        }
    }

    pub fn index(self) -> usize {
        match self {
            BadgeLevel::Level1 => 0,
            BadgeLevel::Level2 => 1,
            BadgeLevel::Level3 => 2,
            BadgeLevel::Level4 => 3,
        }
    }
}

/// Filters accepted by the attributions listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionFilter {
    pub series: Option<String>,
    pub project_id: Option<u64>,
}

impl AttributionFilter {
    pub fn project_only(&self) -> Self {
        Self {
            series: None,
            project_id: self.project_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryShare {
    pub label: String,
    pub count: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub level_1: usize,
    pub level_2: usize,
    pub level_3: usize,
    pub level_4: usize,
}

impl LevelCounts {
    pub fn from_slots(slots: [usize; 4]) -> Self {
        Self {
            level_1: slots[0],
            level_2: slots[1],
            level_3: slots[2],
            level_4: slots[3],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedStats {
    pub total: usize,
    pub this_month: usize,
    pub average_per_member: f64,
}

fn skip_malformed<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    let records = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::debug!(index, %error, "Skipping malformed record");
                None
            }
        })
        .collect();
    Ok(records)
}

/// A nested object that does not decode is treated as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(value) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(error) => {
            tracing::debug!(%error, "Ignoring malformed nested object");
            Ok(None)
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc).date_naive());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.date());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
