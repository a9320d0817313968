// Presentation layer - HTTP/SSE bridge for browser dashboards
pub mod app_state;
pub mod handlers;
