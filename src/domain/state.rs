// Dashboard state and the partial updates merged into it
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use std::collections::BTreeMap;

/// Ordered chart points, with optional labels (month names, weekdays, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub labels: Vec<String>,
    pub points: Vec<f64>,
}

impl Series {
    pub fn new(labels: Vec<String>, points: Vec<f64>) -> Self {
        Self { labels, points }
    }

    pub fn points(points: Vec<f64>) -> Self {
        Self {
            labels: Vec::new(),
            points,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentItem {
    pub id: String,
    pub category: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

impl RecentItem {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            title: title.into(),
            timestamp,
        }
    }

    /// Short human age of the item, e.g. "5 min ago" or "yesterday".
    pub fn age(&self, now: DateTime<Utc>) -> String {
        let elapsed = now.signed_duration_since(self.timestamp);
        let minutes = elapsed.num_minutes();
        let hours = elapsed.num_hours();
        let days = elapsed.num_days();

        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{minutes} min ago")
        } else if hours < 24 {
            format!("{hours}h ago")
        } else if days == 1 {
            "yesterday".to_string()
        } else if days < 7 {
            format!("{days} days ago")
        } else {
            self.timestamp.format("%Y-%m-%d").to_string()
        }
    }
}

/// Serialized with its `age` relative to the moment of serialization.
impl Serialize for RecentItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut item = serializer.serialize_struct("RecentItem", 5)?;
        item.serialize_field("id", &self.id)?;
        item.serialize_field("category", &self.category)?;
        item.serialize_field("title", &self.title)?;
        item.serialize_field("timestamp", &self.timestamp)?;
        item.serialize_field("age", &self.age(Utc::now()))?;
        item.end()
    }
}

/// Keys a dashboard declares up front. Every declared key has a value in
/// [`DashboardState`] from construction onwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSchema {
    pub statistics: Vec<String>,
    pub series: Vec<String>,
    pub recent_limit: usize,
}

/// Partial state produced by one fetch. Merging is shallow and per key:
/// a statistic or series present here replaces the stored one, and a recent
/// category present here replaces every stored item of that category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub statistics: BTreeMap<String, f64>,
    pub chart_series: BTreeMap<String, Series>,
    pub recent: BTreeMap<String, Vec<RecentItem>>,
}

impl StatePatch {
    pub fn statistic(key: impl Into<String>, value: f64) -> Self {
        let mut patch = Self::default();
        patch.statistics.insert(key.into(), value);
        patch
    }

    pub fn series(key: impl Into<String>, series: Series) -> Self {
        let mut patch = Self::default();
        patch.chart_series.insert(key.into(), series);
        patch
    }

    pub fn recent(category: impl Into<String>, items: Vec<RecentItem>) -> Self {
        let mut patch = Self::default();
        patch.recent.insert(category.into(), items);
        patch
    }

    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty() && self.chart_series.is_empty() && self.recent.is_empty()
    }

    /// Fold `other` into this patch with the same overwrite rule as the state.
    pub fn extend(&mut self, other: StatePatch) {
        self.statistics.extend(other.statistics);
        self.chart_series.extend(other.chart_series);
        self.recent.extend(other.recent);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    pub statistics: BTreeMap<String, f64>,
    pub chart_series: BTreeMap<String, Series>,
    pub recent_items: Vec<RecentItem>,
    #[serde(skip)]
    recent_by_category: BTreeMap<String, Vec<RecentItem>>,
    #[serde(skip)]
    recent_limit: usize,
}

impl DashboardState {
    pub fn new(schema: &StateSchema) -> Self {
        Self {
            statistics: schema.statistics.iter().map(|key| (key.clone(), 0.0)).collect(),
            chart_series: schema
                .series
                .iter()
                .map(|key| (key.clone(), Series::default()))
                .collect(),
            recent_items: Vec::new(),
            recent_by_category: BTreeMap::new(),
            recent_limit: schema.recent_limit,
        }
    }

    pub fn statistic(&self, key: &str) -> Option<f64> {
        self.statistics.get(key).copied()
    }

    pub fn apply(&mut self, patch: &StatePatch) {
        for (key, value) in &patch.statistics {
            self.statistics.insert(key.clone(), *value);
        }
        for (key, series) in &patch.chart_series {
            self.chart_series.insert(key.clone(), series.clone());
        }
        if !patch.recent.is_empty() {
            for (category, items) in &patch.recent {
                self.recent_by_category.insert(category.clone(), items.clone());
            }
            self.rebuild_recent();
        }
    }

    fn rebuild_recent(&mut self) {
        let mut items: Vec<RecentItem> = self.recent_by_category.values().flatten().cloned().collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if self.recent_limit > 0 {
            items.truncate(self.recent_limit);
        }
        self.recent_items = items;
    }
}
