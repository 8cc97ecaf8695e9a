use crate::llm::ObjectSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Search request body, serialized in the engine's native shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQueryDocument {
    pub query: QueryClause,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_filter: Option<PostFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortClause>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryClause {
    pub query_string: QueryString,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryString {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostFilter {
    pub range: TimestampRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampRange {
    #[serde(rename = "@timestamp")]
    pub timestamp: RangeBounds,
}

/// Inclusive ISO-8601 bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub gte: String,
    pub lte: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortClause {
    #[serde(rename = "@timestamp")]
    pub timestamp: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortOrder {
    pub order: String,
}

impl SearchQueryDocument {
    pub fn time_range(&self) -> Option<&RangeBounds> {
        self.post_filter.as_ref().map(|f| &f.range.timestamp)
    }

    pub fn set_time_range(&mut self, bounds: Option<RangeBounds>) {
        self.post_filter = bounds.map(|timestamp| PostFilter {
            range: TimestampRange { timestamp },
        });
    }
}

/// Schema the model output must satisfy before it is used as a query.
pub fn query_document_schema() -> ObjectSchema {
    ObjectSchema {
        name: "search_query",
        schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "object",
                    "properties": {
                        "query_string": {
                            "type": "object",
                            "properties": {
                                "query": { "type": "string", "minLength": 1 },
                                "fields": { "type": "array", "items": { "type": "string" } }
                            },
                            "required": ["query"],
                            "additionalProperties": false
                        }
                    },
                    "required": ["query_string"],
                    "additionalProperties": false
                },
                "post_filter": {
                    "type": "object",
                    "properties": {
                        "range": {
                            "type": "object",
                            "properties": {
                                "@timestamp": {
                                    "type": "object",
                                    "properties": {
                                        "gte": { "type": "string" },
                                        "lte": { "type": "string" }
                                    },
                                    "required": ["gte", "lte"]
                                }
                            },
                            "required": ["@timestamp"]
                        }
                    },
                    "required": ["range"]
                },
                "sort": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "@timestamp": {
                                "type": "object",
                                "properties": {
                                    "order": { "enum": ["asc", "desc"] }
                                },
                                "required": ["order"]
                            }
                        },
                        "required": ["@timestamp"]
                    }
                },
                "size": { "type": "integer", "minimum": 1, "maximum": 10000 }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}
