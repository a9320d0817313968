// Infrastructure layer - External dependencies and adapters
pub mod action_router;
pub mod config;
pub mod jsonrpc_service;
