use crate::api::{ListOptions, Observable};
use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Properties requested for each observable node.
pub const OBSERVABLE_PROPERTIES: &str = "id entity_type observable_value created_at updated_at";

/// Build the `stixCyberObservables` query text.
pub fn list_observables_query() -> String {
    format!(
        "query StixCyberObservables($first: Int, $orderBy: StixCyberObservablesOrdering, $orderMode: OrderingMode) {{ \
         stixCyberObservables(first: $first, orderBy: $orderBy, orderMode: $orderMode) {{ \
         edges {{ node {{ {OBSERVABLE_PROPERTIES} }} }} \
         pageInfo {{ globalCount }} }} }}"
    )
}

#[derive(Debug, Serialize)]
pub struct GraphQlRequest {
    pub query: String,
    pub variables: Value,
}

impl GraphQlRequest {
    pub fn list_observables(options: &ListOptions) -> Self {
        Self {
            query: list_observables_query(),
            variables: json!({
                "first": options.first,
                "orderBy": options.order_by.as_str(),
                "orderMode": "desc",
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ObservablesData {
    #[serde(rename = "stixCyberObservables")]
    pub stix_cyber_observables: Option<Connection>,
}

#[derive(Debug, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
pub struct Edge {
    pub node: Observable,
}

impl GraphQlResponse<ObservablesData> {
    /// Unwrap the connection into its nodes, surfacing GraphQL errors.
    pub fn into_observables(self) -> Result<Vec<Observable>, ClientError> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(ClientError::GraphQl(messages.join("; ")));
        }
        let connection = self
            .data
            .ok_or(ClientError::MissingData("data"))?
            .stix_cyber_observables
            .ok_or(ClientError::MissingData("stixCyberObservables"))?;
        Ok(connection.edges.into_iter().map(|edge| edge.node).collect())
    }
}
