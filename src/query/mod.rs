//! Conversation search query and paging.
//!
//! The query always restricts results to voice conversations that have a
//! recording. Optional division and direction filters are added as separate
//! `or` conversation filters.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::RecordingService;
use crate::pipeline::PipelineError;

pub mod prompt;

pub const DEFAULT_ORDER: &str = "desc";
pub const DEFAULT_ORDER_BY: &str = "conversationStart";

/// User-facing search parameters before they are shaped into a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub start: String,
    pub end: String,
    pub order: Option<String>,
    pub order_by: Option<String>,
    pub division_id: Option<String>,
    pub originating_direction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub dimension: String,
    pub operator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Predicate {
    fn matches(dimension: &str, value: &str) -> Self {
        Self {
            dimension: dimension.to_string(),
            operator: "matches".to_string(),
            value: Some(value.to_string()),
        }
    }

    fn exists(dimension: &str) -> Self {
        Self {
            dimension: dimension.to_string(),
            operator: "exists".to_string(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(rename = "type")]
    pub kind: String,
    pub predicates: Vec<Predicate>,
}

/// Search filter in the remote service's request shape, minus paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub order: String,
    pub order_by: String,
    pub interval: String,
    pub segment_filters: Vec<QueryFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation_filters: Vec<QueryFilter>,
}

impl ConversationQuery {
    pub fn new(params: QueryParams) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let segment_filters = vec![QueryFilter {
            kind: "and".to_string(),
            predicates: vec![
                Predicate::matches("mediaType", "voice"),
                Predicate::exists("recording"),
            ],
        }];

        let mut conversation_filters = Vec::new();
        if let Some(division) = non_empty(params.division_id) {
            conversation_filters.push(QueryFilter {
                kind: "or".to_string(),
                predicates: vec![Predicate::matches("divisionId", &division)],
            });
        }
        if let Some(direction) = non_empty(params.originating_direction) {
            conversation_filters.push(QueryFilter {
                kind: "or".to_string(),
                predicates: vec![Predicate::matches("originatingDirection", &direction)],
            });
        }

        Self {
            order: non_empty(params.order).unwrap_or_else(|| DEFAULT_ORDER.to_string()),
            order_by: non_empty(params.order_by).unwrap_or_else(|| DEFAULT_ORDER_BY.to_string()),
            interval: format!("{}/{}", params.start, params.end),
            segment_filters,
            conversation_filters,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub page_size: u32,
    pub page_number: u32,
}

/// Pages through the search results and returns every conversation ID found.
///
/// Paging stops at the first page shorter than `page_size`.
pub async fn collect_conversation_ids(
    service: &dyn RecordingService,
    query: &ConversationQuery,
    page_size: u32,
) -> Result<Vec<String>, PipelineError> {
    let page_size = page_size.max(1);
    let mut ids = Vec::new();
    let mut page_number = 1;

    loop {
        let paging = Paging {
            page_size,
            page_number,
        };
        let records = service
            .search_conversations(query, paging)
            .await
            .map_err(|source| PipelineError::Search {
                page: page_number,
                source,
            })?;

        debug!(page = page_number, records = records.len(), "Fetched conversation page");

        let page_len = records.len();
        ids.extend(records.into_iter().filter_map(|r| r.conversation_id));

        if page_len < page_size as usize {
            break;
        }
        page_number += 1;
    }

    info!(total_conversations = ids.len(), "Retrieved conversation data");
    Ok(ids)
}
