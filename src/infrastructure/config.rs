// Configuration loading and conversion into validated dashboard definitions
use crate::domain::action::Section;
use crate::domain::dashboard::{DEFAULT_RECENT_LIMIT, DashboardDefinition};
use crate::domain::error::ValidationError;
use crate::domain::query::{Entity, Method, Query};
use crate::domain::refresh::{RefreshPolicy, View, view_is};
use crate::domain::task::{Extract, FetchTask, RecordShape, SeriesSpec, Slice, SubRequest};
use anyhow::Context;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub backend: BackendSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub url: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardsConfig {
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub dashboards: Vec<DashboardConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ValidationSettings {
    pub strict: Option<bool>,
}

impl ValidationSettings {
    /// Strict unless configured otherwise in debug builds, lenient in release.
    pub fn is_strict(&self) -> bool {
        self.strict.unwrap_or(cfg!(debug_assertions))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub name: String,
    pub recent_limit: Option<usize>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    #[serde(default)]
    pub sections: Vec<SectionConfig>,
    pub refresh: Option<RefreshConfig>,
    pub initial_view: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SliceKind {
    Statistics,
    Charts,
    Recent,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaskConfig {
    pub id: String,
    pub slice: SliceKind,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub series: Vec<SeriesConfig>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub primary: Option<CallConfig>,
    #[serde(default)]
    pub fallback: Vec<SubRequestConfig>,
    pub view: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeriesConfig {
    pub key: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub label_field: Option<String>,
    pub value_field: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CallConfig {
    pub entity: String,
    pub method: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractKind {
    Count,
    Sum,
    GroupCounts,
    Weekday,
    Records,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubRequestConfig {
    pub key: String,
    pub entity: String,
    pub method: String,
    #[serde(default = "empty_domain")]
    pub domain: Value,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    pub limit: Option<u32>,
    pub order: Option<String>,
    pub extract: ExtractKind,
    /// Summed field for `sum`.
    pub field: Option<String>,
    /// Bucketed field for `weekday`.
    pub date_field: Option<String>,
    /// Title template and timestamp field for `records`.
    pub title: Option<String>,
    pub time_field: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SectionConfig {
    pub key: String,
    pub title: String,
    pub entity: String,
    #[serde(default = "empty_domain")]
    pub domain: Value,
    #[serde(default)]
    pub view_modes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub gated: Vec<GatedRefreshConfig>,
    pub remount_charts_on: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatedRefreshConfig {
    pub task: String,
    pub view: String,
}

fn empty_domain() -> Value {
    Value::Array(Vec::new())
}

/// Backend connection and bind address. `HMS__BACKEND__URL` style variables
/// override the file.
pub fn load_backend_config() -> anyhow::Result<BackendConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/backend"))
        .add_source(config::Environment::with_prefix("HMS").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_dashboards_config() -> anyhow::Result<DashboardsConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboards"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Build every configured dashboard. In strict mode the first invalid
/// dashboard is an error; otherwise it is logged and left out.
pub fn build_definitions(config: &DashboardsConfig) -> anyhow::Result<Vec<DashboardDefinition>> {
    let strict = config.validation.is_strict();
    let mut definitions = Vec::with_capacity(config.dashboards.len());

    for dashboard in &config.dashboards {
        match dashboard.build() {
            Ok(definition) => definitions.push(definition),
            Err(e) if strict => {
                return Err(e).with_context(|| format!("invalid dashboard '{}'", dashboard.name));
            }
            Err(e) => {
                tracing::error!(dashboard = %dashboard.name, error = %e, "skipping invalid dashboard");
            }
        }
    }

    Ok(definitions)
}

impl DashboardConfig {
    pub fn build(&self) -> Result<DashboardDefinition, ValidationError> {
        let tasks = self
            .tasks
            .iter()
            .map(TaskConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        let sections = self
            .sections
            .iter()
            .map(SectionConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        let refresh = self.refresh.as_ref().map(RefreshConfig::build).transpose()?;

        let definition = DashboardDefinition::new(
            self.name.clone(),
            tasks,
            sections,
            self.recent_limit.unwrap_or(DEFAULT_RECENT_LIMIT),
            refresh,
        )?;
        Ok(match &self.initial_view {
            Some(view) => definition.with_initial_view(View::new(view.clone())),
            None => definition,
        })
    }
}

impl TaskConfig {
    pub fn build(&self) -> Result<FetchTask, ValidationError> {
        let slice = match self.slice {
            SliceKind::Statistics => Slice::Statistics(self.keys.clone()),
            SliceKind::Charts => Slice::Charts(
                self.series
                    .iter()
                    .map(|s| {
                        SeriesSpec::new(s.key.clone())
                            .with_labels(s.labels.clone())
                            .with_fields(s.label_field.clone(), s.value_field.clone())
                    })
                    .collect(),
            ),
            SliceKind::Recent => Slice::Recent(self.categories.clone()),
        };

        let primary = match &self.primary {
            Some(call) => {
                let entity = Entity::parse(&call.entity)?;
                match Method::parse(&call.method)? {
                    Method::Aggregate(aggregate) => Some(Query::aggregate(entity, aggregate)?),
                    other => {
                        return Err(ValidationError::InvalidTask {
                            task: self.id.clone(),
                            message: format!("primary method '{other}' is not an aggregate endpoint"),
                        });
                    }
                }
            }
            None => None,
        };

        let fallback = self
            .fallback
            .iter()
            .map(|sub| sub.build(&self.id))
            .collect::<Result<Vec<_>, _>>()?;

        let task = FetchTask::new(self.id.clone(), slice, primary, fallback)?;
        Ok(match &self.view {
            Some(view) => task.shown_in(View::new(view.clone())),
            None => task,
        })
    }
}

impl SubRequestConfig {
    fn build(&self, task: &str) -> Result<SubRequest, ValidationError> {
        let entity = Entity::parse(&self.entity)?;
        let domain = self.domain.clone();
        let mut query = match Method::parse(&self.method)? {
            Method::SearchCount => Query::search_count(entity, domain)?,
            Method::SearchRead => Query::search_read(entity, domain, &self.fields)?,
            Method::ReadGroup => Query::read_group(entity, domain, &self.fields, &self.group_by)?,
            Method::Aggregate(aggregate) => Query::aggregate(entity, aggregate)?,
        };
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(order) = &self.order {
            query = query.order(order.clone());
        }

        let missing = |field: &str| ValidationError::InvalidTask {
            task: task.to_string(),
            message: format!("fallback '{}' needs '{field}'", self.key),
        };
        let extract = match self.extract {
            ExtractKind::Count => Extract::Count,
            ExtractKind::Sum => Extract::Sum {
                field: self.field.clone().ok_or_else(|| missing("field"))?,
            },
            ExtractKind::GroupCounts => Extract::GroupCounts {
                group_by: self.group_by.first().cloned().ok_or_else(|| missing("group_by"))?,
            },
            ExtractKind::Weekday => Extract::Weekday {
                date_field: self.date_field.clone().ok_or_else(|| missing("date_field"))?,
            },
            ExtractKind::Records => Extract::Records(RecordShape {
                title: self.title.clone().ok_or_else(|| missing("title"))?,
                time_field: self.time_field.clone().ok_or_else(|| missing("time_field"))?,
            }),
        };

        SubRequest::new(self.key.clone(), query, extract)
    }
}

impl SectionConfig {
    fn build(&self) -> Result<Section, ValidationError> {
        let entity = Entity::parse(&self.entity)?;
        Ok(Section::new(self.key.clone(), self.title.clone(), entity, self.domain.clone())?
            .with_view_modes(self.view_modes.clone()))
    }
}

impl RefreshConfig {
    fn build(&self) -> Result<RefreshPolicy, ValidationError> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidRefresh(
                "interval_secs must be greater than zero".to_string(),
            ));
        }

        let mut policy = RefreshPolicy::every(Duration::from_secs(self.interval_secs));
        for task in &self.tasks {
            policy = policy.refresh(task.clone());
        }
        for gated in &self.gated {
            policy = policy.refresh_when(gated.task.clone(), view_is(gated.view.clone()));
        }
        if let Some(view) = &self.remount_charts_on {
            policy = policy.remount_charts_when(view_is(view.clone()));
        }
        Ok(policy)
    }
}

/// Date variables available to query templates, formatted as `%Y-%m-%d`.
pub fn date_vars(today: NaiveDate) -> HashMap<String, String> {
    let month_start = today.with_day(1).unwrap_or(today);
    let dates = [
        ("today", Some(today)),
        ("yesterday", today.checked_sub_days(Days::new(1))),
        ("week_ago", today.checked_sub_days(Days::new(7))),
        ("month_ago", today.checked_sub_months(Months::new(1))),
        ("six_months_ago", today.checked_sub_months(Months::new(6))),
        ("month_start", Some(month_start)),
    ];

    dates
        .into_iter()
        .filter_map(|(key, date)| Some((key.to_string(), date?.format("%Y-%m-%d").to_string())))
        .collect()
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
