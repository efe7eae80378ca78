use axum::{
    body::to_bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use directorio::{AppError, error::INTERNAL_MESSAGE};
use serde_json::{Value, json};
use tokio::test;

async fn body_of(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[test]
async fn test_database_failure_hides_its_cause() {
    let (status, body) = body_of(AppError::Database(sqlx::Error::RowNotFound).into_response()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let parsed: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed, json!({ "error": "Error interno del servidor" }));
    assert!(!body.to_lowercase().contains("no rows"));
}

#[test]
async fn test_internal_failure_hides_its_cause() {
    let cause = "token signing failed: key rejected";
    let (status, body) = body_of(AppError::Internal(cause.to_string()).into_response()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let parsed: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed, json!({ "error": INTERNAL_MESSAGE }));
    assert!(!body.contains("signing"));
}

#[test]
async fn test_client_errors_keep_their_message() {
    let (status, body) =
        body_of(AppError::Conflict("Ya existe un contacto con este número".to_string()).into_response())
            .await;

    assert_eq!(status, StatusCode::CONFLICT);
    let parsed: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["error"], "Ya existe un contacto con este número");
}
