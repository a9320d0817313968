// Turning raw remote results into state patches
use crate::domain::error::RemoteError;
use crate::domain::state::{RecentItem, Series, StatePatch};
use crate::domain::task::{Extract, FetchTask, RecordShape, SeriesSpec, Slice, SubRequest};
use crate::infrastructure::config::prepare_query;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Decode the result of a task's aggregate query. A `null` result yields an
/// empty patch; anything not shaped like the task's slice is malformed.
pub fn primary(task: &FetchTask, value: &Value) -> Result<StatePatch, RemoteError> {
    if value.is_null() {
        return Ok(StatePatch::default());
    }

    let mut patch = StatePatch::default();
    match &task.slice {
        Slice::Statistics(keys) => {
            let object = as_object(value)?;
            for key in keys {
                if let Some(number) = object.get(key).and_then(number) {
                    patch.statistics.insert(key.clone(), number);
                }
            }
        }
        Slice::Charts(specs) => {
            let object = as_object(value)?;
            for spec in specs {
                if let Some(raw) = object.get(&spec.key) {
                    patch.chart_series.insert(spec.key.clone(), series(spec, raw)?);
                }
            }
        }
        Slice::Recent(categories) => {
            let rows = as_rows(value)?;
            let default_category = categories.first().cloned().unwrap_or_default();
            for category in categories {
                patch.recent.insert(category.clone(), Vec::new());
            }
            for row in rows {
                let category = row
                    .get("category")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| default_category.clone());
                let Some(items) = patch.recent.get_mut(&category) else {
                    continue;
                };
                let title = row.get("title").map(label).unwrap_or_default();
                let timestamp = ["timestamp", "time", "date"]
                    .iter()
                    .find_map(|field| row.get(*field).and_then(timestamp));
                if let Some(timestamp) = timestamp {
                    let id = row.get("id").map(label).unwrap_or_default();
                    items.push(RecentItem::new(id, category, title, timestamp));
                }
            }
        }
    }

    Ok(patch)
}

/// Decode the result of one fallback sub-request into its single key.
pub fn sub_request(sub: &SubRequest, value: &Value) -> Result<StatePatch, RemoteError> {
    let key = sub.key.as_str();
    let patch = match &sub.extract {
        Extract::Count => {
            let count = number(value)
                .ok_or_else(|| RemoteError::malformed(format!("expected a count, got {value}")))?;
            StatePatch::statistic(key, count)
        }
        Extract::Sum { field } => {
            let total: f64 = as_rows(value)?
                .iter()
                .filter_map(|row| row.get(field).and_then(number))
                .sum();
            StatePatch::statistic(key, total)
        }
        Extract::GroupCounts { group_by } => {
            StatePatch::series(key, group_counts(as_rows(value)?, group_by))
        }
        Extract::Weekday { date_field } => {
            StatePatch::series(key, weekday_histogram(as_rows(value)?, date_field))
        }
        Extract::Records(shape) => StatePatch::recent(key, records(as_rows(value)?, key, shape)),
    };
    Ok(patch)
}

/// Value a sub-request contributes when its call fails.
pub fn fallback_default(sub: &SubRequest) -> StatePatch {
    let key = sub.key.as_str();
    match &sub.extract {
        Extract::Count | Extract::Sum { .. } => StatePatch::statistic(key, 0.0),
        Extract::GroupCounts { .. } => StatePatch::series(key, Series::default()),
        Extract::Weekday { .. } => StatePatch::series(key, weekday_series([0.0; 7])),
        Extract::Records(_) => StatePatch::recent(key, Vec::new()),
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, RemoteError> {
    value
        .as_object()
        .ok_or_else(|| RemoteError::malformed(format!("expected an object, got {value}")))
}

fn as_rows(value: &Value) -> Result<Vec<&Map<String, Value>>, RemoteError> {
    let items = value
        .as_array()
        .ok_or_else(|| RemoteError::malformed(format!("expected a list, got {value}")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| RemoteError::malformed(format!("expected a record, got {item}")))
        })
        .collect()
}

/// Numbers arrive as JSON numbers or numeric strings; `false` means empty.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Display text of a field: many-to-one pairs `[id, "name"]` show their name.
fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(pair) if pair.len() == 2 => label(&pair[1]),
        Value::Bool(true) => "true".to_string(),
        _ => String::new(),
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

fn series(spec: &SeriesSpec, raw: &Value) -> Result<Series, RemoteError> {
    match raw {
        Value::Array(items) if items.iter().all(|item| !item.is_object()) => {
            Ok(Series::points(items.iter().map(|item| number(item).unwrap_or(0.0)).collect()))
        }
        Value::Array(_) => {
            let rows = as_rows(raw)?;
            let value_field = spec.value_field.as_deref().unwrap_or("count");
            let points = rows
                .iter()
                .map(|row| row.get(value_field).and_then(number).unwrap_or(0.0))
                .collect();
            let labels = match &spec.label_field {
                Some(field) => rows
                    .iter()
                    .map(|row| row.get(field).map(label).unwrap_or_default())
                    .collect(),
                None => Vec::new(),
            };
            Ok(Series::new(labels, points))
        }
        Value::Object(map) if !spec.labels.is_empty() => {
            let points = spec
                .labels
                .iter()
                .map(|label| map.get(label).and_then(number).unwrap_or(0.0))
                .collect();
            Ok(Series::new(spec.labels.clone(), points))
        }
        Value::Object(map) => {
            let labels = map.keys().cloned().collect();
            let points = map.values().map(|v| number(v).unwrap_or(0.0)).collect();
            Ok(Series::new(labels, points))
        }
        other => Err(RemoteError::malformed(format!(
            "series '{}' is neither a list nor an object: {other}",
            spec.key
        ))),
    }
}

fn group_counts(rows: Vec<&Map<String, Value>>, group_by: &str) -> Series {
    let base = group_by.split(':').next().unwrap_or(group_by);
    let count_field = format!("{base}_count");

    let mut labels = Vec::with_capacity(rows.len());
    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        let count = row
            .get(&count_field)
            .or_else(|| row.get("__count"))
            .and_then(number)
            .unwrap_or(0.0);
        let name = row.get(group_by).map(label).unwrap_or_default();
        labels.push(if name.is_empty() { "Undefined".to_string() } else { name });
        points.push(count);
    }
    Series::new(labels, points)
}

fn weekday_series(buckets: [f64; 7]) -> Series {
    Series::new(
        WEEKDAYS.iter().map(|day| day.to_string()).collect(),
        buckets.to_vec(),
    )
}

fn weekday_histogram(rows: Vec<&Map<String, Value>>, date_field: &str) -> Series {
    let mut buckets = [0.0; 7];
    for row in rows {
        if let Some(at) = row.get(date_field).and_then(timestamp) {
            buckets[at.weekday().num_days_from_monday() as usize] += 1.0;
        }
    }
    weekday_series(buckets)
}

fn records(rows: Vec<&Map<String, Value>>, category: &str, shape: &RecordShape) -> Vec<RecentItem> {
    rows.into_iter()
        .filter_map(|row| {
            let at = row.get(&shape.time_field).and_then(timestamp)?;
            let fields: HashMap<String, String> =
                row.iter().map(|(k, v)| (k.clone(), label(v))).collect();
            let id = row.get("id").map(label).unwrap_or_default();
            Some(RecentItem::new(
                format!("{category}_{id}"),
                category,
                prepare_query(&shape.title, &fields),
                at,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::{Aggregate, Entity, Query};
    use serde_json::json;

    fn sub(key: &str, query: Query, extract: Extract) -> SubRequest {
        SubRequest::new(key, query, extract).unwrap()
    }

    fn read(entity: Entity) -> Query {
        Query::search_read(entity, json!([]), &[]).unwrap()
    }

    #[test]
    fn test_primary_statistics_takes_declared_numeric_keys() {
        let task = FetchTask::new(
            "statistics",
            Slice::Statistics(vec!["revenue_today".into(), "orders_today".into(), "missing".into()]),
            Some(Query::aggregate(Entity::Pharmacy, Aggregate::PharmacyStatistics).unwrap()),
            Vec::new(),
        )
        .unwrap();

        let patch = primary(
            &task,
            &json!({"revenue_today": "120.50", "orders_today": 4, "extra": 9, "low_stock": []}),
        )
        .unwrap();

        assert_eq!(patch.statistics.len(), 2);
        assert_eq!(patch.statistics["revenue_today"], 120.5);
        assert_eq!(patch.statistics["orders_today"], 4.0);
    }

    #[test]
    fn test_primary_rejects_wrong_shape_and_accepts_null() {
        let task = FetchTask::new(
            "statistics",
            Slice::Statistics(vec!["total_patients".into()]),
            Some(Query::aggregate(Entity::Partner, Aggregate::DashboardStatistics).unwrap()),
            Vec::new(),
        )
        .unwrap();

        assert!(matches!(primary(&task, &json!([1, 2])), Err(RemoteError::Malformed(_))));
        assert!(primary(&task, &Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_primary_chart_shapes() {
        let task = FetchTask::new(
            "charts",
            Slice::Charts(vec![
                SeriesSpec::new("consultations_monthly")
                    .with_fields(Some("month".into()), Some("count".into())),
                SeriesSpec::new("admissions_type")
                    .with_labels(vec!["emergency".into(), "routine".into()]),
                SeriesSpec::new("admissions_weekly"),
                SeriesSpec::new("daily_sales"),
            ]),
            Some(Query::aggregate(Entity::Outpatient, Aggregate::DashboardChartsData).unwrap()),
            Vec::new(),
        )
        .unwrap();

        let patch = primary(
            &task,
            &json!({
                "consultations_monthly": [{"month": "Jan", "count": 3}, {"month": "Feb", "count": 5}],
                "admissions_type": {"routine": 7},
                "admissions_weekly": {"0": 2, "3": 1},
                "daily_sales": [1, 2.5, "3"],
            }),
        )
        .unwrap();

        let monthly = &patch.chart_series["consultations_monthly"];
        assert_eq!(monthly.labels, vec!["Jan", "Feb"]);
        assert_eq!(monthly.points, vec![3.0, 5.0]);
        assert_eq!(patch.chart_series["admissions_type"].points, vec![0.0, 7.0]);
        assert_eq!(patch.chart_series["admissions_weekly"].labels, vec!["0", "3"]);
        assert_eq!(patch.chart_series["daily_sales"].points, vec![1.0, 2.5, 3.0]);
    }

    #[test]
    fn test_primary_recent_items_grouped_by_category() {
        let task = FetchTask::new(
            "appointments",
            Slice::Recent(vec!["appointment".into()]),
            Some(Query::aggregate(Entity::Outpatient, Aggregate::AppointmentsToday).unwrap()),
            Vec::new(),
        )
        .unwrap();

        let patch = primary(
            &task,
            &json!([
                {"id": 4, "title": "OP/004", "timestamp": "2025-03-14 09:30:00"},
                {"id": 5, "title": "OP/005"},
                {"id": 6, "category": "other", "title": "x", "date": "2025-03-14"},
            ]),
        )
        .unwrap();

        let items = &patch.recent["appointment"];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "4");
        assert_eq!(items[0].title, "OP/004");
    }

    #[test]
    fn test_count_and_sum() {
        let count = sub("active_inpatients", Query::search_count(Entity::Inpatient, json!([])).unwrap(), Extract::Count);
        let patch = sub_request(&count, &json!(7)).unwrap();
        assert_eq!(patch.statistics["active_inpatients"], 7.0);
        assert!(sub_request(&count, &json!({"count": 7})).is_err());

        let sum = sub("total_slots", read(Entity::DoctorAllocation), Extract::Sum { field: "slot_remaining".into() });
        let patch = sub_request(
            &sum,
            &json!([{"slot_remaining": 3}, {"slot_remaining": 4}, {"slot_remaining": false}]),
        )
        .unwrap();
        assert_eq!(patch.statistics["total_slots"], 7.0);
    }

    #[test]
    fn test_group_counts_reads_both_count_conventions() {
        let query = Query::read_group(
            Entity::Outpatient,
            json!([]),
            &["op_date".to_string()],
            &["op_date:month".to_string()],
        )
        .unwrap();
        let grouped = sub("consultations_monthly", query, Extract::GroupCounts { group_by: "op_date:month".into() });

        let patch = sub_request(
            &grouped,
            &json!([
                {"op_date:month": "January 2025", "op_date_count": 12},
                {"op_date:month": "February 2025", "__count": 9},
                {"op_date:month": false, "__count": 1},
            ]),
        )
        .unwrap();

        let series = &patch.chart_series["consultations_monthly"];
        assert_eq!(series.labels, vec!["January 2025", "February 2025", "Undefined"]);
        assert_eq!(series.points, vec![12.0, 9.0, 1.0]);
    }

    #[test]
    fn test_weekday_histogram_is_monday_first() {
        let weekly = sub("admissions_weekly", read(Entity::Inpatient), Extract::Weekday { date_field: "hosp_date".into() });

        // 2025-03-10 is a Monday, 2025-03-16 a Sunday.
        let patch = sub_request(
            &weekly,
            &json!([
                {"hosp_date": "2025-03-10"},
                {"hosp_date": "2025-03-10 14:00:00"},
                {"hosp_date": "2025-03-16"},
                {"hosp_date": false},
            ]),
        )
        .unwrap();

        let series = &patch.chart_series["admissions_weekly"];
        assert_eq!(series.points, vec![2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(series.labels[0], "Mon");
    }

    #[test]
    fn test_records_render_title_template() {
        let recent = sub(
            "admission",
            read(Entity::Inpatient),
            Extract::Records(RecordShape {
                title: "Admission - ${patient_id} (${name})".into(),
                time_field: "hosp_date".into(),
            }),
        );

        let patch = sub_request(
            &recent,
            &json!([
                {"id": 8, "name": "IP/008", "patient_id": [3, "Jane Roe"], "hosp_date": "2025-03-14 08:00:00"},
                {"id": 9, "name": "IP/009", "patient_id": [4, "No Date"], "hosp_date": false},
            ]),
        )
        .unwrap();

        let items = &patch.recent["admission"];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "admission_8");
        assert_eq!(items[0].title, "Admission - Jane Roe (IP/008)");
        assert_eq!(items[0].category, "admission");
    }

    #[test]
    fn test_defaults_cover_the_sub_request_key() {
        let count = sub("x", Query::search_count(Entity::Ward, json!([])).unwrap(), Extract::Count);
        assert_eq!(fallback_default(&count).statistics["x"], 0.0);

        let weekly = sub("w", read(Entity::Inpatient), Extract::Weekday { date_field: "hosp_date".into() });
        assert_eq!(fallback_default(&weekly).chart_series["w"].points, vec![0.0; 7]);
    }
}
