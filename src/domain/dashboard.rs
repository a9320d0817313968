// Dashboard definition: the tasks, sections and refresh policy of one dashboard
use super::action::Section;
use super::error::ValidationError;
use super::refresh::{RefreshPolicy, View};
use super::state::StateSchema;
use super::task::{FetchTask, Slice};
use std::collections::HashSet;

pub const DEFAULT_RECENT_LIMIT: usize = 5;
pub const DEFAULT_INITIAL_VIEW: &str = "home";

#[derive(Debug, Clone)]
pub struct DashboardDefinition {
    pub name: String,
    pub tasks: Vec<FetchTask>,
    pub sections: Vec<Section>,
    pub recent_limit: usize,
    pub refresh: Option<RefreshPolicy>,
    /// View the presentation shows before any `switch_view`.
    pub initial_view: View,
}

impl DashboardDefinition {
    pub fn new(
        name: impl Into<String>,
        tasks: Vec<FetchTask>,
        sections: Vec<Section>,
        recent_limit: usize,
        refresh: Option<RefreshPolicy>,
    ) -> Result<Self, ValidationError> {
        let mut task_ids = HashSet::new();
        for task in &tasks {
            if !task_ids.insert(task.id.as_str()) {
                return Err(ValidationError::Duplicate {
                    kind: "task",
                    id: task.id.clone(),
                });
            }
        }

        let mut section_keys = HashSet::new();
        for section in &sections {
            if !section_keys.insert(section.key.as_str()) {
                return Err(ValidationError::Duplicate {
                    kind: "section",
                    id: section.key.clone(),
                });
            }
        }

        if let Some(policy) = &refresh {
            if policy.interval().is_zero() {
                return Err(ValidationError::InvalidRefresh(
                    "interval must be greater than zero".to_string(),
                ));
            }
            for rule in policy.rules() {
                if !task_ids.contains(rule.task.as_str()) {
                    return Err(ValidationError::UnknownRefreshTask(rule.task.clone()));
                }
            }
        }

        Ok(Self {
            name: name.into(),
            tasks,
            sections,
            recent_limit,
            refresh,
            initial_view: View::new(DEFAULT_INITIAL_VIEW),
        })
    }

    pub fn with_initial_view(mut self, view: View) -> Self {
        self.initial_view = view;
        self
    }

    pub fn task(&self, id: &str) -> Option<&FetchTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.key == key)
    }

    pub fn tasks_shown_in<'a>(&'a self, view: &'a View) -> impl Iterator<Item = &'a FetchTask> + 'a {
        self.tasks
            .iter()
            .filter(move |task| task.view.as_ref() == Some(view))
    }

    /// Every statistic and series any task declares.
    pub fn schema(&self) -> StateSchema {
        let mut schema = StateSchema {
            recent_limit: self.recent_limit,
            ..StateSchema::default()
        };
        for task in &self.tasks {
            match &task.slice {
                Slice::Statistics(keys) => schema.statistics.extend(keys.iter().cloned()),
                Slice::Charts(series) => schema.series.extend(series.iter().map(|s| s.key.clone())),
                Slice::Recent(_) => {}
            }
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::{Aggregate, Entity, Query};
    use crate::domain::task::SeriesSpec;
    use std::time::Duration;

    fn stats_task(id: &str) -> FetchTask {
        FetchTask::new(
            id,
            Slice::Statistics(vec!["total_patients".to_string()]),
            Some(Query::aggregate(Entity::Partner, Aggregate::DashboardStatistics).unwrap()),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let result = DashboardDefinition::new(
            "doctor",
            vec![stats_task("statistics"), stats_task("statistics")],
            Vec::new(),
            DEFAULT_RECENT_LIMIT,
            None,
        );
        assert!(matches!(result, Err(ValidationError::Duplicate { kind: "task", .. })));
    }

    #[test]
    fn test_refresh_rule_must_name_a_task() {
        let policy = RefreshPolicy::every(Duration::from_secs(30)).refresh("orders");
        let result = DashboardDefinition::new(
            "pharmacy",
            vec![stats_task("statistics")],
            Vec::new(),
            DEFAULT_RECENT_LIMIT,
            Some(policy),
        );
        assert_eq!(result.err(), Some(ValidationError::UnknownRefreshTask("orders".to_string())));
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let policy = RefreshPolicy::every(Duration::ZERO).refresh("statistics");
        let result = DashboardDefinition::new(
            "pharmacy",
            vec![stats_task("statistics")],
            Vec::new(),
            DEFAULT_RECENT_LIMIT,
            Some(policy),
        );
        assert!(matches!(result, Err(ValidationError::InvalidRefresh(_))));
    }

    #[test]
    fn test_initial_view_defaults_to_home() {
        let definition =
            DashboardDefinition::new("lab", vec![stats_task("statistics")], Vec::new(), DEFAULT_RECENT_LIMIT, None)
                .unwrap();
        assert_eq!(definition.initial_view, View::new("home"));

        let definition = definition.with_initial_view(View::new("main"));
        assert_eq!(definition.initial_view, View::new("main"));
    }

    #[test]
    fn test_schema_collects_declared_keys() {
        let charts = FetchTask::new(
            "charts",
            Slice::Charts(vec![SeriesSpec::new("admissions_weekly")]),
            Some(Query::aggregate(Entity::Outpatient, Aggregate::DashboardChartsData).unwrap()),
            Vec::new(),
        )
        .unwrap()
        .shown_in(View::new("home"));

        let definition = DashboardDefinition::new(
            "doctor",
            vec![stats_task("statistics"), charts],
            Vec::new(),
            3,
            None,
        )
        .unwrap();

        let schema = definition.schema();
        assert_eq!(schema.statistics, vec!["total_patients"]);
        assert_eq!(schema.series, vec!["admissions_weekly"]);
        assert_eq!(schema.recent_limit, 3);

        let home = View::new("home");
        let shown: Vec<&str> = definition.tasks_shown_in(&home).map(|t| t.id.as_str()).collect();
        assert_eq!(shown, vec!["charts"]);
    }
}
