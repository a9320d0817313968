// Application layer - Dashboard controller and its ports
pub mod controller;
pub mod decode;
pub mod ports;
pub mod query_service;
pub mod scheduler;
