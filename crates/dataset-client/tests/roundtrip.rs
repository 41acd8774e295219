#![allow(clippy::unwrap_used)]

use std::collections::HashMap;

use axum::extract::Query;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use core_rowset::{ColumnDef, DatasetRecord, ResponseEnvelope, WireType};
use dataset_client::{ClientError, CommandBehavior, Connection};

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AccountRow {
    id: i64,
    name: String,
}

impl DatasetRecord for AccountRow {
    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef {
                name: "Id".to_string(),
                r#type: WireType::Int64,
            },
            ColumnDef {
                name: "Name".to_string(),
                r#type: WireType::String,
            },
        ]
    }
}

/// Serves `app` on an ephemeral local port and returns an open connection
/// pointed at its `/reports/` prefix.
async fn serve(app: Router) -> Connection {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let mut connection = Connection::new(&format!("http://{addr}/reports/")).unwrap();
    connection.open().unwrap();
    connection
}

#[tokio::test]
async fn streams_a_multi_row_response() {
    let app = Router::new().route(
        "/reports/accounts",
        post(|| async {
            Json(ResponseEnvelope::for_records(vec![
                AccountRow {
                    id: 1,
                    name: "Assets".to_string(),
                },
                AccountRow {
                    id: 2,
                    name: "Liabilities".to_string(),
                },
            ]))
        }),
    );
    let connection = serve(app).await;
    let command = connection.create_command("accounts").unwrap();
    let mut reader = command
        .execute_reader(CommandBehavior::Default)
        .await
        .unwrap();

    assert_eq!(reader.field_count(), 2);
    assert_eq!(reader.name(0), "Id");
    assert_eq!(reader.field_type(1), WireType::String);
    assert_eq!(reader.ordinal("Name"), Some(1));

    assert!(reader.read().await.unwrap());
    assert_eq!(reader.value(0).unwrap().as_i64(), Some(1));
    assert_eq!(reader.value(1).unwrap().as_str(), Some("Assets"));

    assert!(reader.read().await.unwrap());
    assert_eq!(reader.value(1).unwrap().as_str(), Some("Liabilities"));

    assert!(!reader.read().await.unwrap());
    assert!(reader.value(0).is_err());
}

#[tokio::test]
async fn scalar_value_yields_one_row() {
    let app = Router::new().route(
        "/reports/accountCount",
        post(|| async {
            Json(json!({
                "@columns": [{"name": "Count", "type": "Int32"}],
                "value": 42,
            }))
        }),
    );
    let connection = serve(app).await;
    let command = connection.create_command("accountCount").unwrap();
    let mut reader = command
        .execute_reader(CommandBehavior::Default)
        .await
        .unwrap();

    assert!(reader.read().await.unwrap());
    assert_eq!(reader.value(0).unwrap().as_i64(), Some(42));
    assert!(!reader.read().await.unwrap());
}

#[tokio::test]
async fn missing_value_section_yields_zero_rows() {
    let app = Router::new().route(
        "/reports/empty",
        post(|| async {
            Json(json!({
                "@columns": [{"name": "Id", "type": "Int64"}],
            }))
        }),
    );
    let connection = serve(app).await;
    let command = connection.create_command("empty").unwrap();
    let mut reader = command
        .execute_reader(CommandBehavior::Default)
        .await
        .unwrap();

    assert_eq!(reader.field_count(), 1);
    assert!(!reader.read().await.unwrap());
}

#[tokio::test]
async fn describe_uses_the_schema_only_flag() {
    let app = Router::new().route(
        "/reports/accounts",
        post(|Query(query): Query<HashMap<String, String>>| async move {
            assert_eq!(query.get("behavior").map(String::as_str), Some("schemaOnly"));
            Json(ResponseEnvelope::<()>::schema_only(
                AccountRow::columns(),
                vec!["from".to_string(), "to".to_string()],
            ))
        }),
    );
    let connection = serve(app).await;
    let command = connection.create_command("accounts").unwrap();
    let schema = command.describe().await.unwrap();

    assert_eq!(schema.parameters, vec!["from", "to"]);
    assert_eq!(schema.columns, AccountRow::columns());
}

#[tokio::test]
async fn parameters_are_posted_as_one_json_object() {
    let app = Router::new().route(
        "/reports/accounts",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body, json!({"from": "2024-01-01", "limit": 10}));
            Json(json!({
                "@columns": [{"name": "Ok", "type": "Boolean"}],
                "value": [[true]],
            }))
        }),
    );
    let connection = serve(app).await;
    let mut command = connection.create_command("accounts").unwrap();
    command.parameters_mut().set("from", "2024-01-01");
    command.parameters_mut().set("limit", 10);
    let mut reader = command
        .execute_reader(CommandBehavior::Default)
        .await
        .unwrap();

    assert!(reader.read().await.unwrap());
    assert_eq!(reader.value(0).unwrap().as_bool(), Some(true));
}

#[tokio::test]
async fn error_status_carries_the_response_body() {
    let app = Router::new().route(
        "/reports/broken",
        post(|| async {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "dataset exploded",
            )
        }),
    );
    let connection = serve(app).await;
    let command = connection.create_command("broken").unwrap();
    let error = command
        .execute_reader(CommandBehavior::Default)
        .await
        .unwrap_err();
    match error {
        ClientError::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "dataset exploded");
        }
        other => panic!("unexpected error: {other}"),
    }
}
