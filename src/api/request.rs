//! Purpose: Wire-shaped request and response envelopes for the item stream.
//! Exports: `ItemRequest`, `Operation`, `WriteOperation`, `ItemResponse`,
//! `ResponseBody`, `StreamError`.
//! Invariants: Every response echoes its request's correlation id verbatim.
//! Invariants: Envelope field names and tags are stable wire contract.

use serde::{Deserialize, Serialize};

use crate::core::key::Key;
use crate::core::query::SortKeyRange;
use crate::core::value::Item;

/// One operation on the shared stream, correlated by a caller-supplied id so
/// responses can be matched regardless of completion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub correlation_id: String,
    #[serde(flatten)]
    pub op: Operation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Put {
        table: String,
        item: Item,
    },
    Update {
        table: String,
        item: Item,
    },
    Get {
        table: String,
        key: Key,
    },
    Delete {
        table: String,
        key: Key,
    },
    Query {
        table: String,
        partition_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<SortKeyRange>,
    },
    TransactWrite {
        operations: Vec<WriteOperation>,
    },
}

/// A write inside an atomic batch. Reads have no transactional response
/// shape, so the batch variant is writes-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOperation {
    Put { table: String, item: Item },
    Update { table: String, item: Item },
    Delete { table: String, key: Key },
}

impl WriteOperation {
    pub fn key(&self) -> &Key {
        match self {
            WriteOperation::Put { item, .. } | WriteOperation::Update { item, .. } => &item.key,
            WriteOperation::Delete { key, .. } => key,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub correlation_id: String,
    #[serde(flatten)]
    pub result: ResponseBody,
}

impl ItemResponse {
    pub fn new(correlation_id: impl Into<String>, result: ResponseBody) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            result,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResponseBody {
    Put {
        key: Key,
    },
    Update {
        key: Key,
    },
    /// `item` is absent when the key was not found; the key is echoed
    /// either way.
    Get {
        key: Key,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item: Option<Item>,
    },
    Delete {
        key: Key,
    },
    Query {
        items: Vec<Item>,
    },
    TransactWrite {
        keys: Vec<Key>,
    },
    ValidationErrors {
        messages: Vec<String>,
    },
    StorageError {
        code: u32,
        message: String,
    },
}

/// Terminal record emitted when an unexpected failure aborts the stream.
/// Carries the triggering request's correlation id and the failure's kind
/// name; everything queued behind it is abandoned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
    pub correlation_id: String,
    pub error_type: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::{ItemRequest, ItemResponse, Operation, ResponseBody, WriteOperation};
    use crate::core::key::Key;
    use crate::core::query::{RangeBoundary, SortKeyRange};
    use crate::core::value::{Attributes, Item, Value};

    fn sample_item() -> Item {
        let mut attributes = Attributes::new();
        attributes.insert("message".to_string(), Value::from("Hello World"));
        Item::new(Key::new("user123", "profile"), attributes)
    }

    #[test]
    fn request_round_trips_through_json() {
        let request = ItemRequest {
            correlation_id: "c-1".to_string(),
            op: Operation::Query {
                table: "users".to_string(),
                partition_key: "user123".to_string(),
                limit: Some(10),
                range: Some(SortKeyRange::from(RangeBoundary::exclusive("profile09"))),
            },
        };
        let line = serde_json::to_string(&request).expect("serialize");
        let parsed: ItemRequest = serde_json::from_str(&line).expect("parse");
        assert_eq!(parsed, request);
    }

    #[test]
    fn request_tag_is_flat_and_snake_case() {
        let request = ItemRequest {
            correlation_id: "c-2".to_string(),
            op: Operation::TransactWrite {
                operations: vec![WriteOperation::Delete {
                    table: "users".to_string(),
                    key: Key::new("user123", "profile"),
                }],
            },
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["op"], "transact_write");
        assert_eq!(value["operations"][0]["op"], "delete");
    }

    #[test]
    fn query_limit_and_range_default_to_absent() {
        let parsed: ItemRequest = serde_json::from_str(
            r#"{"correlation_id":"c-3","op":"query","table":"users","partition_key":"user123"}"#,
        )
        .expect("parse");
        match parsed.op {
            Operation::Query { limit, range, .. } => {
                assert!(limit.is_none());
                assert!(range.is_none());
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn get_response_omits_missing_item() {
        let response = ItemResponse::new(
            "c-4",
            ResponseBody::Get {
                key: Key::new("user123", "profile"),
                item: None,
            },
        );
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["result"], "get");
        assert!(value.get("item").is_none());

        let found = ItemResponse::new(
            "c-4",
            ResponseBody::Get {
                key: Key::new("user123", "profile"),
                item: Some(sample_item()),
            },
        );
        let value = serde_json::to_value(&found).expect("serialize");
        assert_eq!(value["item"]["key"]["partition_key"], "user123");
    }

    #[test]
    fn write_operation_key_points_at_the_affected_key() {
        let put = WriteOperation::Put {
            table: "users".to_string(),
            item: sample_item(),
        };
        assert_eq!(put.key(), &Key::new("user123", "profile"));

        let delete = WriteOperation::Delete {
            table: "users".to_string(),
            key: Key::new("a", "b"),
        };
        assert_eq!(delete.key(), &Key::new("a", "b"));
    }
}
