use crate::error::ClientError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A STIX cyber observable as returned by the `stixCyberObservables` query.
///
/// Only the properties the exporter asks for are modelled; anything else in
/// the node is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    pub id: String,
    /// Entity kind, e.g. `Hostname` or `Email-Addr`.
    pub entity_type: String,
    #[serde(default)]
    pub observable_value: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordering field accepted by `stixCyberObservables(orderBy:)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    CreatedAt,
    UpdatedAt,
}

impl OrderField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderField::CreatedAt => "created_at",
            OrderField::UpdatedAt => "updated_at",
        }
    }
}

/// Paging and ordering arguments for a list query: the newest records by
/// one field. No filters are ever sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub first: u32,
    pub order_by: OrderField,
}

impl ListOptions {
    /// A single record, newest first by `field`.
    pub fn most_recent(field: OrderField) -> Self {
        Self {
            first: 1,
            order_by: field,
        }
    }
}

/// Read-only view of the OpenCTI platform used by the collector.
///
/// Implementations must be safe to share between concurrent scrapes.
#[async_trait]
pub trait OpenCtiApi: Send + Sync {
    /// Base URL of the platform, for log context.
    fn endpoint(&self) -> &str;

    /// Succeeds only when the platform reports itself healthy.
    async fn health_check(&self) -> Result<(), ClientError>;

    async fn list_observables(&self, options: &ListOptions)
    -> Result<Vec<Observable>, ClientError>;

    /// The observable created last, `None` when the platform holds none.
    async fn most_recently_created(&self) -> Result<Option<Observable>, ClientError> {
        let observables = self
            .list_observables(&ListOptions::most_recent(OrderField::CreatedAt))
            .await?;
        Ok(observables.into_iter().next())
    }

    /// The observable updated last, `None` when the platform holds none.
    async fn most_recently_updated(&self) -> Result<Option<Observable>, ClientError> {
        let observables = self
            .list_observables(&ListOptions::most_recent(OrderField::UpdatedAt))
            .await?;
        Ok(observables.into_iter().next())
    }
}
