// Domain layer - Dashboard state, typed queries and fetch plans
pub mod action;
pub mod dashboard;
pub mod error;
pub mod query;
pub mod refresh;
pub mod state;
pub mod task;
