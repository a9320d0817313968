// Section shortcuts and the list actions they open
use crate::domain::error::ValidationError;
use crate::domain::query::{Entity, validate_domain};
use serde::Serialize;
use serde_json::Value;

/// Request to open a record list for an entity, filtered by a domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListAction {
    pub title: String,
    pub entity: String,
    pub domain: Value,
    pub view_modes: Vec<String>,
}

/// A dashboard shortcut such as "patients" or "inpatients".
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub key: String,
    pub title: String,
    pub entity: Entity,
    pub domain: Value,
    pub view_modes: Vec<String>,
}

impl Section {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        entity: Entity,
        domain: Value,
    ) -> Result<Self, ValidationError> {
        validate_domain(&domain)?;
        Ok(Self {
            key: key.into(),
            title: title.into(),
            entity,
            domain,
            view_modes: vec!["list".to_string(), "form".to_string()],
        })
    }

    pub fn with_view_modes(mut self, view_modes: Vec<String>) -> Self {
        if !view_modes.is_empty() {
            self.view_modes = view_modes;
        }
        self
    }

    pub fn action(&self) -> ListAction {
        ListAction {
            title: self.title.clone(),
            entity: self.entity.model().to_string(),
            domain: self.domain.clone(),
            view_modes: self.view_modes.clone(),
        }
    }
}
