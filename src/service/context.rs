//! Caller identity and the authorization hook consulted before every record operation.

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identity of the caller, threaded explicitly into each operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: Option<i64>,
    pub role_id: Option<i64>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        CallerContext::default()
    }

    pub fn user(user_id: i64) -> Self {
        CallerContext {
            user_id: Some(user_id),
            role_id: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Retrieve,
    Update,
    Delete,
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `Err(AppError::Permission)` to deny.
    async fn check(&self, ctx: &CallerContext, table: &str, action: Action) -> Result<(), AppError>;
}

/// Default authorizer: every caller may do everything.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn check(&self, _ctx: &CallerContext, _table: &str, _action: Action) -> Result<(), AppError> {
        Ok(())
    }
}
