// Hospital dashboards - data controllers behind the clinical dashboards
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
