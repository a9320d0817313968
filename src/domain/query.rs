// Typed remote query descriptors and the entity/method dispatch table
use crate::domain::error::ValidationError;
use serde_json::{Map, Value};
use std::fmt;

/// Backend models the dashboards read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Partner,
    Outpatient,
    Inpatient,
    DoctorAllocation,
    Surgery,
    Laboratory,
    LabTest,
    LabTestLine,
    PatientLabTest,
    LabTestResult,
    Pharmacy,
    ProductTemplate,
    SaleOrder,
    Ward,
    Room,
    Employee,
}

const ENTITIES: &[(Entity, &str)] = &[
    (Entity::Partner, "res.partner"),
    (Entity::Outpatient, "hospital.outpatient"),
    (Entity::Inpatient, "hospital.inpatient"),
    (Entity::DoctorAllocation, "doctor.allocation"),
    (Entity::Surgery, "inpatient.surgery"),
    (Entity::Laboratory, "hospital.laboratory"),
    (Entity::LabTest, "lab.test"),
    (Entity::LabTestLine, "lab.test.line"),
    (Entity::PatientLabTest, "patient.lab.test"),
    (Entity::LabTestResult, "lab.test.result"),
    (Entity::Pharmacy, "hospital.pharmacy"),
    (Entity::ProductTemplate, "product.template"),
    (Entity::SaleOrder, "sale.order"),
    (Entity::Ward, "hospital.ward"),
    (Entity::Room, "patient.room"),
    (Entity::Employee, "hr.employee"),
];

impl Entity {
    pub fn parse(model: &str) -> Result<Self, ValidationError> {
        ENTITIES
            .iter()
            .find(|(_, name)| *name == model)
            .map(|(entity, _)| *entity)
            .ok_or_else(|| ValidationError::UnknownEntity(model.to_string()))
    }

    /// Model name on the wire, e.g. `hospital.inpatient`.
    pub fn model(&self) -> &'static str {
        ENTITIES
            .iter()
            .find(|(entity, _)| entity == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    pub fn supports(&self, method: Method) -> bool {
        match method {
            Method::SearchCount | Method::SearchRead | Method::ReadGroup => true,
            Method::Aggregate(aggregate) => aggregate.entity() == *self,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model())
    }
}

/// Server-side aggregation endpoints that return a whole slice in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    DashboardStatistics,
    DashboardChartsData,
    LabStatistics,
    LabChartsData,
    PharmacyStatistics,
    PharmacyChartsData,
    StockAlerts,
    PrescriptionsData,
    FinancialData,
    ReceptionStatistics,
    ReceptionChartsData,
    AppointmentsToday,
    ActiveInpatients,
}

const AGGREGATES: &[(Aggregate, &str, Entity)] = &[
    (Aggregate::DashboardStatistics, "get_dashboard_statistics", Entity::Partner),
    (Aggregate::DashboardChartsData, "get_dashboard_charts_data", Entity::Outpatient),
    (Aggregate::LabStatistics, "get_lab_statistics", Entity::Laboratory),
    (Aggregate::LabChartsData, "get_lab_charts_data", Entity::Laboratory),
    (Aggregate::PharmacyStatistics, "get_pharmacy_statistics", Entity::Pharmacy),
    (Aggregate::PharmacyChartsData, "get_pharmacy_charts_data", Entity::Pharmacy),
    (Aggregate::StockAlerts, "get_stock_alerts", Entity::Pharmacy),
    (Aggregate::PrescriptionsData, "get_prescriptions_data", Entity::Pharmacy),
    (Aggregate::FinancialData, "get_financial_data", Entity::Pharmacy),
    (Aggregate::ReceptionStatistics, "get_reception_statistics", Entity::Partner),
    (Aggregate::ReceptionChartsData, "get_reception_charts_data", Entity::Partner),
    (Aggregate::AppointmentsToday, "get_appointments_today", Entity::Outpatient),
    (Aggregate::ActiveInpatients, "get_active_inpatients", Entity::Inpatient),
];

impl Aggregate {
    fn row(&self) -> Option<&'static (Aggregate, &'static str, Entity)> {
        AGGREGATES.iter().find(|(aggregate, _, _)| aggregate == self)
    }

    pub fn name(&self) -> &'static str {
        self.row().map(|(_, name, _)| *name).unwrap_or("unknown")
    }

    /// The only entity this endpoint is exposed on.
    pub fn entity(&self) -> Entity {
        self.row().map(|(_, _, entity)| *entity).unwrap_or(Entity::Partner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    SearchCount,
    SearchRead,
    ReadGroup,
    Aggregate(Aggregate),
}

impl Method {
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        match name {
            "search_count" => Ok(Self::SearchCount),
            "search_read" => Ok(Self::SearchRead),
            "read_group" => Ok(Self::ReadGroup),
            other => AGGREGATES
                .iter()
                .find(|(_, method, _)| *method == other)
                .map(|(aggregate, _, _)| Self::Aggregate(*aggregate))
                .ok_or_else(|| ValidationError::UnknownMethod(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchCount => "search_count",
            Self::SearchRead => "search_read",
            Self::ReadGroup => "read_group",
            Self::Aggregate(aggregate) => aggregate.name(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const OPERATORS: &[&str] = &[
    "=", "!=", ">", ">=", "<", "<=", "in", "not in", "like", "ilike", "not like", "not ilike",
    "=like", "=ilike", "child_of", "parent_of",
];

/// Check that `domain` is a list of `[field, operator, value]` triples
/// optionally interleaved with the prefix operators `&`, `|` and `!`.
pub fn validate_domain(domain: &Value) -> Result<(), ValidationError> {
    let terms = domain
        .as_array()
        .ok_or_else(|| ValidationError::MalformedDomain(format!("expected a list, got {domain}")))?;

    for term in terms {
        match term {
            Value::String(op) if matches!(op.as_str(), "&" | "|" | "!") => {}
            Value::Array(triple) if triple.len() == 3 => {
                if !triple[0].is_string() {
                    return Err(ValidationError::MalformedDomain(format!(
                        "field name must be a string in {term}"
                    )));
                }
                let operator = triple[1].as_str().unwrap_or_default();
                if !OPERATORS.contains(&operator) {
                    return Err(ValidationError::MalformedDomain(format!(
                        "unknown operator in {term}"
                    )));
                }
            }
            other => {
                return Err(ValidationError::MalformedDomain(format!(
                    "unexpected term {other}"
                )));
            }
        }
    }

    Ok(())
}

/// One remote call: entity, method and its positional and keyword arguments.
///
/// Queries can only be built through the constructors below, which check the
/// method against the dispatch table and validate any domain filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    entity: Entity,
    method: Method,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
}

impl Query {
    fn checked(entity: Entity, method: Method) -> Result<(), ValidationError> {
        if entity.supports(method) {
            Ok(())
        } else {
            Err(ValidationError::MethodNotAllowed {
                entity: entity.model().to_string(),
                method: method.name().to_string(),
            })
        }
    }

    pub fn aggregate(entity: Entity, aggregate: Aggregate) -> Result<Self, ValidationError> {
        let method = Method::Aggregate(aggregate);
        Self::checked(entity, method)?;
        Ok(Self {
            entity,
            method,
            args: Vec::new(),
            kwargs: Map::new(),
        })
    }

    pub fn search_count(entity: Entity, domain: Value) -> Result<Self, ValidationError> {
        validate_domain(&domain)?;
        Ok(Self {
            entity,
            method: Method::SearchCount,
            args: vec![domain],
            kwargs: Map::new(),
        })
    }

    pub fn search_read(
        entity: Entity,
        domain: Value,
        fields: &[String],
    ) -> Result<Self, ValidationError> {
        validate_domain(&domain)?;
        Ok(Self {
            entity,
            method: Method::SearchRead,
            args: vec![domain, fields_value(fields)],
            kwargs: Map::new(),
        })
    }

    pub fn read_group(
        entity: Entity,
        domain: Value,
        fields: &[String],
        group_by: &[String],
    ) -> Result<Self, ValidationError> {
        validate_domain(&domain)?;
        if group_by.is_empty() {
            return Err(ValidationError::MalformedDomain(
                "read_group needs at least one group-by field".to_string(),
            ));
        }
        Ok(Self {
            entity,
            method: Method::ReadGroup,
            args: vec![domain, fields_value(fields), fields_value(group_by)],
            kwargs: Map::new(),
        })
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.kwargs.insert("limit".to_string(), Value::from(limit));
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.kwargs.insert("order".to_string(), Value::String(order.into()));
        self
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    /// Copy of this query with every string leaf passed through `substitute`.
    pub fn bind(&self, substitute: &dyn Fn(&str) -> String) -> Self {
        Self {
            entity: self.entity,
            method: self.method,
            args: self.args.iter().map(|arg| map_strings(arg, substitute)).collect(),
            kwargs: self
                .kwargs
                .iter()
                .map(|(key, value)| (key.clone(), map_strings(value, substitute)))
                .collect(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.method)
    }
}

fn fields_value(fields: &[String]) -> Value {
    Value::Array(fields.iter().cloned().map(Value::String).collect())
}

fn map_strings(value: &Value, substitute: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_strings(v, substitute)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), map_strings(v, substitute)))
                .collect(),
        ),
        other => other.clone(),
    }
}
