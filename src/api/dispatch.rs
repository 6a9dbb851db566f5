//! Purpose: Route one decoded operation to the store and assemble the response.
//! Exports: `dispatch`.
//! Invariants: Any validation finding suppresses execution entirely.
//! Invariants: Exactly one underlying call per request (one coordinator
//! invocation for a transaction batch).
//! Invariants: Storage failures become per-request responses; anything else
//! propagates as `Err` and is stream-fatal.

use crate::api::request::{ItemRequest, ItemResponse, Operation, ResponseBody, WriteOperation};
use crate::api::validation::validate_request;
use crate::core::error::{Error, ErrorKind, error_code};
use crate::core::store::Store;

pub fn dispatch(store: &Store, request: &ItemRequest) -> Result<ItemResponse, Error> {
    let findings = validate_request(&request.op);
    if !findings.is_empty() {
        let messages = findings
            .into_iter()
            .filter_map(|finding| finding.message)
            .collect();
        return Ok(ItemResponse::new(
            &request.correlation_id,
            ResponseBody::ValidationErrors { messages },
        ));
    }

    match execute(store, &request.op) {
        Ok(result) => Ok(ItemResponse::new(&request.correlation_id, result)),
        Err(err) if err.kind() == ErrorKind::Storage => Ok(ItemResponse::new(
            &request.correlation_id,
            ResponseBody::StorageError {
                code: error_code(ErrorKind::Storage),
                message: err.wire_message(),
            },
        )),
        Err(err) => Err(err),
    }
}

fn execute(store: &Store, op: &Operation) -> Result<ResponseBody, Error> {
    match op {
        Operation::Put { table, item } => {
            store.put_item(table, item)?;
            Ok(ResponseBody::Put {
                key: item.key.clone(),
            })
        }
        Operation::Update { table, item } => {
            store.update_item(table, item)?;
            Ok(ResponseBody::Update {
                key: item.key.clone(),
            })
        }
        Operation::Get { table, key } => Ok(ResponseBody::Get {
            key: key.clone(),
            item: store.get_item(table, key)?,
        }),
        Operation::Delete { table, key } => {
            store.delete_item(table, key)?;
            Ok(ResponseBody::Delete { key: key.clone() })
        }
        Operation::Query {
            table,
            partition_key,
            limit,
            range,
        } => {
            // Absent limit means unbounded; an explicit 0 is honored.
            let limit = limit.map_or(usize::MAX, |limit| limit as usize);
            let items = store.query(table, partition_key, limit, range.as_ref())?;
            Ok(ResponseBody::Query { items })
        }
        Operation::TransactWrite { operations } => {
            let keys = operations.iter().map(|write| write.key().clone()).collect();
            store.execute_transaction(|ctx| {
                for write in operations {
                    match write {
                        WriteOperation::Put { table, item } => ctx.put(table, item)?,
                        WriteOperation::Update { table, item } => ctx.update(table, item)?,
                        WriteOperation::Delete { table, key } => ctx.delete(table, key)?,
                    }
                }
                Ok(())
            })?;
            Ok(ResponseBody::TransactWrite { keys })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::dispatch;
    use crate::api::request::{ItemRequest, Operation, ResponseBody, WriteOperation};
    use crate::core::key::Key;
    use crate::core::store::Store;
    use crate::core::value::{Attributes, Item, Value};

    fn open_store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = Store::open(temp.path().join("db")).expect("open");
        (temp, store)
    }

    fn item(pk: &str, sk: &str, pairs: &[(&str, Value)]) -> Item {
        let attributes: Attributes = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Item::new(Key::new(pk, sk), attributes)
    }

    fn request(id: &str, op: Operation) -> ItemRequest {
        ItemRequest {
            correlation_id: id.to_string(),
            op,
        }
    }

    #[test]
    fn put_echoes_key_and_correlation_id() {
        let (_temp, store) = open_store();
        let response = dispatch(
            &store,
            &request(
                "c-1",
                Operation::Put {
                    table: "users".to_string(),
                    item: item("user123", "profile", &[("n", Value::from(1.0))]),
                },
            ),
        )
        .expect("dispatch");

        assert_eq!(response.correlation_id, "c-1");
        assert_eq!(
            response.result,
            ResponseBody::Put {
                key: Key::new("user123", "profile")
            }
        );
    }

    #[test]
    fn validation_findings_suppress_execution() {
        let (_temp, store) = open_store();
        let response = dispatch(
            &store,
            &request(
                "c-2",
                Operation::Put {
                    table: "users".to_string(),
                    item: item("", "profile", &[("n", Value::from(1.0))]),
                },
            ),
        )
        .expect("dispatch");

        match response.result {
            ResponseBody::ValidationErrors { messages } => {
                assert_eq!(messages, vec!["Partition key cannot be blank"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // Nothing was written: no table resolution, no storage call.
        assert!(store.tables().is_empty());
    }

    #[test]
    fn get_reports_not_found_with_echoed_key() {
        let (_temp, store) = open_store();
        let response = dispatch(
            &store,
            &request(
                "c-3",
                Operation::Get {
                    table: "users".to_string(),
                    key: Key::new("user123", "missing"),
                },
            ),
        )
        .expect("dispatch");

        assert_eq!(
            response.result,
            ResponseBody::Get {
                key: Key::new("user123", "missing"),
                item: None,
            }
        );
    }

    #[test]
    fn query_maps_absent_limit_to_unbounded() {
        let (_temp, store) = open_store();
        for sk in ["a", "b", "c"] {
            store
                .put_item("users", &item("pk", sk, &[("n", Value::from(1.0))]))
                .expect("put");
        }

        let response = dispatch(
            &store,
            &request(
                "c-4",
                Operation::Query {
                    table: "users".to_string(),
                    partition_key: "pk".to_string(),
                    limit: None,
                    range: None,
                },
            ),
        )
        .expect("dispatch");

        match response.result {
            ResponseBody::Query { items } => assert_eq!(items.len(), 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn transact_write_returns_keys_in_operation_order() {
        let (_temp, store) = open_store();
        let response = dispatch(
            &store,
            &request(
                "c-5",
                Operation::TransactWrite {
                    operations: vec![
                        WriteOperation::Put {
                            table: "users".to_string(),
                            item: item("u1", "a", &[("n", Value::from(1.0))]),
                        },
                        WriteOperation::Delete {
                            table: "orders".to_string(),
                            key: Key::new("u1", "b"),
                        },
                    ],
                },
            ),
        )
        .expect("dispatch");

        assert_eq!(
            response.result,
            ResponseBody::TransactWrite {
                keys: vec![Key::new("u1", "a"), Key::new("u1", "b")],
            }
        );
        assert!(
            store
                .get_item("users", &Key::new("u1", "a"))
                .expect("get")
                .is_some()
        );
    }

    #[test]
    fn undecodable_record_surfaces_as_storage_error() {
        let (_temp, store) = open_store();
        let key = Key::new("user123", "corrupt");
        store
            .put_raw("users", &key, b"\xff\xfe not json")
            .expect("raw put");

        let response = dispatch(
            &store,
            &request(
                "c-6",
                Operation::Get {
                    table: "users".to_string(),
                    key: key.clone(),
                },
            ),
        )
        .expect("dispatch");

        match response.result {
            ResponseBody::StorageError { code, message } => {
                assert_eq!(code, 1);
                assert!(message.contains("deserialize"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn storage_failure_mid_batch_rolls_back_and_reports() {
        let (_temp, store) = open_store();
        // The second write updates a planted undecodable record; its
        // read-modify-write fails inside the transaction and the first write
        // must not survive.
        let corrupt = Key::new("u1", "corrupt");
        store
            .put_raw("users", &corrupt, b"\xff\xfe not json")
            .expect("raw put");

        let response = dispatch(
            &store,
            &request(
                "c-7",
                Operation::TransactWrite {
                    operations: vec![
                        WriteOperation::Put {
                            table: "users".to_string(),
                            item: item("u1", "a", &[("n", Value::from(1.0))]),
                        },
                        WriteOperation::Update {
                            table: "users".to_string(),
                            item: item("u1", "corrupt", &[("n", Value::from(2.0))]),
                        },
                    ],
                },
            ),
        )
        .expect("dispatch");

        match response.result {
            ResponseBody::StorageError { code, .. } => assert_eq!(code, 1),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(
            store
                .get_item("users", &Key::new("u1", "a"))
                .expect("get")
                .is_none()
        );
    }
}
