// Fetch tasks: a primary aggregate query plus its decomposed fallback plan
use crate::domain::error::ValidationError;
use crate::domain::query::{Method, Query};
use crate::domain::refresh::View;

/// Declares a chart series owned by a task.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    pub key: String,
    /// Fixed label order used when the backend returns the series as an
    /// object keyed by label (e.g. admission types or weekday indexes).
    pub labels: Vec<String>,
    /// Field holding the point value when the backend returns a list of
    /// objects, e.g. `count` in `[{"month": "Jan", "count": 4}]`.
    pub value_field: Option<String>,
    /// Field holding the point label in the same list-of-objects form.
    pub label_field: Option<String>,
}

impl SeriesSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            labels: Vec::new(),
            value_field: None,
            label_field: None,
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_fields(mut self, label_field: Option<String>, value_field: Option<String>) -> Self {
        self.label_field = label_field;
        self.value_field = value_field;
        self
    }
}

/// The part of the dashboard state a task is responsible for.
#[derive(Debug, Clone, PartialEq)]
pub enum Slice {
    Statistics(Vec<String>),
    Charts(Vec<SeriesSpec>),
    /// Recent-item categories, e.g. `consultation`, `admission`.
    Recent(Vec<String>),
}

impl Slice {
    fn owns(&self, key: &str, target: Target) -> bool {
        match (self, target) {
            (Slice::Statistics(keys), Target::Statistic) => keys.iter().any(|k| k == key),
            (Slice::Charts(series), Target::Series) => series.iter().any(|s| s.key == key),
            (Slice::Recent(categories), Target::Recent) => categories.iter().any(|c| c == key),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Statistic,
    Series,
    Recent,
}

/// How a record row becomes a recent item: `title` is a template where
/// `${field}` is replaced by the row's value for `field`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordShape {
    pub title: String,
    pub time_field: String,
}

/// How the raw result of a sub-request becomes state.
#[derive(Debug, Clone, PartialEq)]
pub enum Extract {
    /// `search_count` result as a statistic.
    Count,
    /// Sum of one numeric field over `search_read` rows, as a statistic.
    Sum { field: String },
    /// `read_group` rows as a series of per-group counts.
    GroupCounts { group_by: String },
    /// Monday-first seven-bucket histogram of a date field over `search_read` rows.
    Weekday { date_field: String },
    /// `search_read` rows as recent items of the sub-request's category.
    Records(RecordShape),
}

impl Extract {
    fn method(&self) -> Method {
        match self {
            Extract::Count => Method::SearchCount,
            Extract::GroupCounts { .. } => Method::ReadGroup,
            Extract::Sum { .. } | Extract::Weekday { .. } | Extract::Records(_) => Method::SearchRead,
        }
    }

    fn target(&self) -> Target {
        match self {
            Extract::Count | Extract::Sum { .. } => Target::Statistic,
            Extract::GroupCounts { .. } | Extract::Weekday { .. } => Target::Series,
            Extract::Records(_) => Target::Recent,
        }
    }
}

/// One step of a fallback plan, producing exactly one key of the task's slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SubRequest {
    pub key: String,
    pub query: Query,
    pub extract: Extract,
}

impl SubRequest {
    pub fn new(key: impl Into<String>, query: Query, extract: Extract) -> Result<Self, ValidationError> {
        let key = key.into();
        if query.method() != extract.method() {
            return Err(ValidationError::InvalidTask {
                task: key,
                message: format!("{:?} extraction needs {}, got {}", extract, extract.method(), query.method()),
            });
        }
        Ok(Self { key, query, extract })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchTask {
    pub id: String,
    pub slice: Slice,
    pub primary: Option<Query>,
    pub fallback: Vec<SubRequest>,
    /// View that displays this slice; switching to it re-fetches the task.
    pub view: Option<View>,
}

impl FetchTask {
    pub fn new(
        id: impl Into<String>,
        slice: Slice,
        primary: Option<Query>,
        fallback: Vec<SubRequest>,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        let invalid = |message: String| ValidationError::InvalidTask {
            task: id.clone(),
            message,
        };

        if id.is_empty() {
            return Err(invalid("task id must not be empty".to_string()));
        }
        if primary.is_none() && fallback.is_empty() {
            return Err(invalid("needs a primary query or a fallback plan".to_string()));
        }
        if let Some(query) = &primary {
            if !matches!(query.method(), Method::Aggregate(_)) {
                return Err(invalid(format!("{query} is not an aggregate endpoint")));
            }
        }
        for sub in &fallback {
            if !slice.owns(&sub.key, sub.extract.target()) {
                return Err(invalid(format!(
                    "fallback key '{}' is not declared by the task's slice",
                    sub.key
                )));
            }
        }

        Ok(Self {
            id,
            slice,
            primary,
            fallback,
            view: None,
        })
    }

    pub fn shown_in(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::{Aggregate, Entity};
    use serde_json::json;

    fn count(entity: Entity) -> Query {
        Query::search_count(entity, json!([])).unwrap()
    }

    #[test]
    fn test_extract_must_match_method() {
        let err = SubRequest::new("total", count(Entity::Partner), Extract::Sum { field: "x".into() });
        assert!(matches!(err, Err(ValidationError::InvalidTask { .. })));
        assert!(SubRequest::new("total", count(Entity::Partner), Extract::Count).is_ok());
    }

    #[test]
    fn test_fallback_keys_must_be_declared() {
        let sub = SubRequest::new("total_patients", count(Entity::Partner), Extract::Count).unwrap();
        let err = FetchTask::new(
            "statistics",
            Slice::Statistics(vec!["active_inpatients".to_string()]),
            None,
            vec![sub.clone()],
        );
        assert!(err.is_err());

        let ok = FetchTask::new(
            "statistics",
            Slice::Statistics(vec!["total_patients".to_string()]),
            Some(Query::aggregate(Entity::Partner, Aggregate::DashboardStatistics).unwrap()),
            vec![sub],
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_statistic_extract_cannot_feed_series() {
        let sub = SubRequest::new("weekly", count(Entity::Inpatient), Extract::Count).unwrap();
        let err = FetchTask::new(
            "charts",
            Slice::Charts(vec![SeriesSpec::new("weekly")]),
            None,
            vec![sub],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_task_needs_some_query() {
        assert!(FetchTask::new("empty", Slice::Statistics(Vec::new()), None, Vec::new()).is_err());
    }
}
