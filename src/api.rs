//! HTTP surface for the PDF question-answering server.
//!
//! - `POST /upload` – Multipart upload with a `file` field holding a PDF. Extracts, chunks and
//!   embeds it, then replaces the active index. Returns `{"message": "you are ready for chat!"}`.
//! - `POST /query` – `{"user_question": "..."}`. Answers from the active index and returns
//!   `{"response": "..."}`; `400` until a document has been uploaded.
//! - `GET /status` – Whether a document is indexed, and which one.
//! - `GET /metrics` – Upload and query counters.
//!
//! Errors are reported as `{"detail": "..."}`. Every origin, method and header is allowed by CORS.

use crate::rag::{DocumentUpload, IndexStatus, RagApi, RagError};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

const UPLOAD_FIELD: &str = "file";
const READY_MESSAGE: &str = "you are ready for chat!";

/// Build the HTTP router around a pipeline implementation.
///
/// `max_upload_bytes` bounds the request body accepted by `POST /upload`.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/upload", post(upload_document::<S>))
        .route("/query", post(query_document::<S>))
        .route("/status", get(get_status::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors_layer())
        .with_state(service)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
}

/// Index the uploaded PDF, replacing whatever was indexed before.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: RagApi,
{
    let mut multipart = multipart
        .map_err(|rejection| AppError::new(rejection.status(), rejection.body_text()))?;

    let upload = loop {
        let Some(field) = multipart.next_field().await.map_err(AppError::from)? else {
            return Err(AppError::unprocessable(format!(
                "Missing '{UPLOAD_FIELD}' field in multipart upload"
            )));
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(AppError::from)?;
        break DocumentUpload {
            filename,
            bytes: bytes.to_vec(),
        };
    };

    if upload.bytes.is_empty() {
        return Err(AppError::unprocessable("Uploaded file is empty"));
    }

    let outcome = service.upload(upload).await?;
    tracing::info!(
        filename = ?outcome.document.filename,
        chunks = outcome.document.chunks,
        replaced_previous = outcome.replaced_previous,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        message: READY_MESSAGE,
    }))
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    user_question: String,
}

/// Success response for `POST /query`.
#[derive(Serialize)]
struct QueryResponse {
    response: String,
}

/// Answer a question from the indexed document.
async fn query_document<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: RagApi,
{
    let Json(request) = payload.map_err(|rejection| AppError::unprocessable(rejection.body_text()))?;
    let answer = service.answer(&request.user_question).await?;
    Ok(Json(QueryResponse {
        response: answer.response,
    }))
}

/// Report whether a document is indexed.
async fn get_status<S>(State(service): State<Arc<S>>) -> Json<IndexStatus>
where
    S: RagApi,
{
    Json(service.status())
}

/// Return upload and query counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

/// Error rendered as `{"detail": ...}` with a matching status code.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(error: RagError) -> Self {
        let status = if error.is_not_ready() {
            StatusCode::BAD_REQUEST
        } else if error.is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %error, "Request failed");
        } else {
            tracing::debug!(error = %error, status = %status, "Request rejected");
        }
        Self::new(status, error.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        let status = match error.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, error.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::embedding::EmbeddingClientError;
    use crate::metrics::MetricsSnapshot;
    use crate::pdf::ExtractionError;
    use crate::rag::{
        Answer, DocumentInfo, DocumentUpload, INDEX_NOT_READY_MESSAGE, IndexError, IndexStatus,
        RagApi, RagError, UploadOutcome,
    };
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
    };
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdf-rag-test-boundary";

    #[derive(Default)]
    struct StubRag {
        uploads: Mutex<Vec<DocumentUpload>>,
        questions: Mutex<Vec<String>>,
        upload_error: Mutex<Option<RagError>>,
        answer_error: Mutex<Option<RagError>>,
    }

    #[async_trait]
    impl RagApi for StubRag {
        async fn upload(&self, upload: DocumentUpload) -> Result<UploadOutcome, RagError> {
            if let Some(error) = self.upload_error.lock().take() {
                return Err(error);
            }
            let document = DocumentInfo {
                filename: upload.filename.clone(),
                fingerprint: "f".repeat(64),
                pages: 1,
                chunks: 1,
                indexed_at: "2026-01-01T00:00:00Z".into(),
            };
            self.uploads.lock().push(upload);
            Ok(UploadOutcome {
                document,
                replaced_previous: false,
            })
        }

        async fn answer(&self, question: &str) -> Result<Answer, RagError> {
            if let Some(error) = self.answer_error.lock().take() {
                return Err(error);
            }
            self.questions.lock().push(question.to_string());
            Ok(Answer {
                response: format!("echo: {question}"),
                sources: Vec::new(),
            })
        }

        fn status(&self) -> IndexStatus {
            IndexStatus::Empty
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_indexed: 3,
                chunks_indexed: 12,
                last_chunk_count: Some(4),
                queries_answered: 7,
                query_failures: 1,
            }
        }
    }

    fn router(service: &Arc<StubRag>) -> Router {
        create_router(Arc::clone(service), 1024)
    }

    fn multipart_request(field: &str, filename: &str, contents: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn query_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn upload_forwards_file_field() {
        let service = Arc::new(StubRag::default());
        let response = router(&service)
            .oneshot(multipart_request("file", "doc.pdf", b"%PDF-1.4 body"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "message": "you are ready for chat!" })
        );
        let uploads = service.uploads.lock();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename.as_deref(), Some("doc.pdf"));
        assert_eq!(uploads[0].bytes, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn upload_without_file_field_is_unprocessable() {
        let service = Arc::new(StubRag::default());
        let response = router(&service)
            .oneshot(multipart_request("attachment", "doc.pdf", b"%PDF-1.4"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().expect("detail").contains("'file'"));
        assert!(service.uploads.lock().is_empty());
    }

    #[tokio::test]
    async fn upload_of_non_pdf_is_unprocessable() {
        let service = Arc::new(StubRag::default());
        *service.upload_error.lock() = Some(ExtractionError::NotPdf.into());
        let response = router(&service)
            .oneshot(multipart_request("file", "notes.txt", b"plain text"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "Uploaded file is not a PDF" })
        );
    }

    #[tokio::test]
    async fn upload_backend_failure_is_internal_error_with_message() {
        let service = Arc::new(StubRag::default());
        *service.upload_error.lock() = Some(
            EmbeddingClientError::ModelUnavailable("connection refused".into()).into(),
        );
        let response = router(&service)
            .oneshot(multipart_request("file", "doc.pdf", b"%PDF-1.4"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().expect("detail").contains("connection refused"));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let service = Arc::new(StubRag::default());
        let response = router(&service)
            .oneshot(multipart_request("file", "big.pdf", &vec![b'x'; 4096]))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(service.uploads.lock().is_empty());
    }

    #[tokio::test]
    async fn query_before_upload_returns_documented_400() {
        let service = Arc::new(StubRag::default());
        *service.answer_error.lock() = Some(IndexError::NotReady.into());
        let response = router(&service)
            .oneshot(query_request(r#"{"user_question": "hello?"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": INDEX_NOT_READY_MESSAGE })
        );
    }

    #[tokio::test]
    async fn query_returns_model_response() {
        let service = Arc::new(StubRag::default());
        let response = router(&service)
            .oneshot(query_request(r#"{"user_question": "What is in the file?"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "response": "echo: What is in the file?" })
        );
        assert_eq!(*service.questions.lock(), vec!["What is in the file?".to_string()]);
    }

    #[tokio::test]
    async fn malformed_query_body_is_unprocessable() {
        let service = Arc::new(StubRag::default());
        let response = router(&service)
            .oneshot(query_request(r#"{"question": "wrong field"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["detail"].is_string());
        assert!(service.questions.lock().is_empty());
    }

    #[tokio::test]
    async fn status_and_metrics_are_exposed() {
        let service = Arc::new(StubRag::default());
        let status = router(&service)
            .oneshot(Request::get("/status").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(json_body(status).await, json!({ "state": "empty" }));

        let metrics = router(&service)
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let body = json_body(metrics).await;
        assert_eq!(body["documents_indexed"], 3);
        assert_eq!(body["last_chunk_count"], 4);
        assert_eq!(body["queries_answered"], 7);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let service = Arc::new(StubRag::default());
        let response = router(&service)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/query")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
