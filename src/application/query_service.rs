// Remote Query Service boundary used by dashboard controllers
use crate::domain::error::RemoteError;
use crate::domain::query::Query;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait RemoteQueryService: Send + Sync {
    /// Run one query and return its raw structured result.
    ///
    /// Transport failures, missing methods and unknown entities all surface
    /// as [`RemoteError`]; callers do not distinguish between them.
    async fn call(&self, query: &Query) -> Result<Value, RemoteError>;
}
