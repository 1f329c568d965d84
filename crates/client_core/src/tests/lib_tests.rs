use std::{collections::HashMap, sync::Arc};

use super::*;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use shared::{
    domain::{ProgramStatus, ReviewStatus, UnitId},
    error::{ApiError, ErrorCode},
    protocol::ReviewDecision,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct BackendState {
    authorization: Arc<Mutex<Vec<String>>>,
    reviews: Arc<Mutex<Vec<(i64, LecturerReviewBatch)>>>,
    units: Arc<Mutex<Vec<(i64, UpdateUnitsRequest)>>>,
    uploads: Arc<Mutex<Vec<(HashMap<String, String>, Option<String>, usize)>>>,
}

fn sample_program(id: i64) -> TrainingProgram {
    TrainingProgram {
        id: ProgramId(id),
        title: format!("Program {id}"),
        subtitle: String::new(),
        description: String::new(),
        learning_outcomes: String::new(),
        tags: vec!["rust".into()],
        status: ProgramStatus::Published,
        price: 2_000_000,
        discounted_price: None,
        start_date: None,
        end_date: None,
        banner_url: None,
        syllabus_url: None,
        units: Vec::new(),
        request_id: None,
        partner_id: None,
    }
}

async fn list_programs(
    State(state): State<BackendState>,
    headers: HeaderMap,
) -> Json<ApiEnvelope<Vec<TrainingProgram>>> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        state.authorization.lock().await.push(value.to_string());
    }
    Json(ApiEnvelope::ok(vec![sample_program(1), sample_program(2)]))
}

async fn missing_lecturer(Path(id): Path<i64>) -> (StatusCode, Json<ApiEnvelope<Lecturer>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiEnvelope::failed(ApiError::new(
            ErrorCode::NotFound,
            format!("lecturer {id} not found"),
        ))),
    )
}

async fn broken_public_list() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "upstream unavailable")
}

async fn submit_review(
    State(state): State<BackendState>,
    Path(id): Path<i64>,
    Json(batch): Json<LecturerReviewBatch>,
) -> Json<serde_json::Value> {
    state.reviews.lock().await.push((id, batch));
    Json(serde_json::json!({ "success": true }))
}

async fn update_units(
    State(state): State<BackendState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUnitsRequest>,
) -> StatusCode {
    state.units.lock().await.push((id, request));
    StatusCode::OK
}

async fn rejected_partner_request() -> Json<ApiEnvelope<TrainingProgramRequest>> {
    Json(ApiEnvelope::failed(ApiError::new(
        ErrorCode::Validation,
        "title already requested",
    )))
}

async fn upload(
    State(state): State<BackendState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<ApiEnvelope<UploadResponse>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let url = format!(
        "https://cdn.example.com/{}/{}",
        query.get("kind").cloned().unwrap_or_default(),
        query.get("filename").cloned().unwrap_or_default()
    );
    state
        .uploads
        .lock()
        .await
        .push((query, content_type, body.len()));
    Json(ApiEnvelope::ok(UploadResponse { url }))
}

async fn spawn_backend() -> Result<(String, BackendState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = BackendState::default();
    let app = Router::new()
        .route("/api/admin/programs", get(list_programs))
        .route("/api/admin/lecturers/:id", get(missing_lecturer))
        .route("/api/admin/lecturers/:id/review", post(submit_review))
        .route("/api/public/programs", get(broken_public_list))
        .route("/api/programs/:id/units", put(update_units))
        .route("/api/partners/requests", post(rejected_partner_request))
        .route("/api/files/upload", post(upload))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api/"), state))
}

fn client(base_url: &str) -> HttpPortalClient {
    HttpPortalClient::with_options(
        base_url,
        ClientOptions {
            api_token: Some("admin-token".into()),
            request_timeout: Some(Duration::from_secs(5)),
        },
    )
    .expect("client")
}

#[test]
fn rejects_invalid_base_urls() {
    assert!(matches!(
        HttpPortalClient::new("not a url"),
        Err(ClientError::InvalidBaseUrl { .. })
    ));
    assert!(matches!(
        HttpPortalClient::new("ftp://portal.example.com"),
        Err(ClientError::InvalidBaseUrl { reason, .. }) if reason.contains("http")
    ));
    let client = HttpPortalClient::new("https://portal.example.com/api/").expect("valid");
    assert_eq!(client.base_url(), "https://portal.example.com/api");
}

#[tokio::test]
async fn list_unwraps_envelope_and_sends_token() {
    let (base_url, state) = spawn_backend().await.expect("spawn backend");

    let programs = client(&base_url).list_programs().await.expect("list");

    assert_eq!(programs.len(), 2);
    assert_eq!(programs[1].id, ProgramId(2));
    assert_eq!(
        state.authorization.lock().await.clone(),
        vec!["Bearer admin-token"]
    );
}

#[tokio::test]
async fn error_envelope_becomes_api_error() {
    let (base_url, _state) = spawn_backend().await.expect("spawn backend");

    let err = client(&base_url)
        .get_lecturer(LecturerId(9))
        .await
        .expect_err("not found");

    match err.downcast_ref::<ClientError>() {
        Some(ClientError::Api(exception)) => {
            assert_eq!(exception.code, ErrorCode::NotFound);
            assert_eq!(exception.message, "lecturer 9 not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn failed_mutation_envelope_is_an_error() {
    let (base_url, _state) = spawn_backend().await.expect("spawn backend");

    let err = client(&base_url)
        .create_program_request(&ProgramRequestPayload {
            title: "Rust".into(),
            ..ProgramRequestPayload::default()
        })
        .await
        .expect_err("validation");

    assert!(matches!(
        err.downcast_ref::<ClientError>(),
        Some(ClientError::Api(exception)) if exception.code == ErrorCode::Validation
    ));
}

#[tokio::test]
async fn non_envelope_failure_reports_status() {
    let (base_url, _state) = spawn_backend().await.expect("spawn backend");

    let err = client(&base_url)
        .list_public_programs()
        .await
        .expect_err("bad gateway");

    assert!(matches!(
        err.downcast_ref::<ClientError>(),
        Some(ClientError::Status(502))
    ));
}

#[tokio::test]
async fn review_is_posted_as_one_batch() {
    let (base_url, state) = spawn_backend().await.expect("spawn backend");
    let batch = LecturerReviewBatch {
        lecturer: ReviewDecision {
            id: LecturerId(5),
            status: ReviewStatus::Approved,
            note: String::new(),
        },
        degrees: vec![ReviewDecision {
            id: shared::domain::DegreeId(11),
            status: ReviewStatus::Rejected,
            note: "blurry scan".into(),
        }],
        certificates: Vec::new(),
        notify_by_email: true,
    };

    client(&base_url)
        .submit_lecturer_review(LecturerId(5), &batch)
        .await
        .expect("submit");

    let reviews = state.reviews.lock().await.clone();
    assert_eq!(reviews, vec![(5, batch)]);
}

#[tokio::test]
async fn units_update_accepts_empty_response() {
    let (base_url, state) = spawn_backend().await.expect("spawn backend");
    let units = vec![TrainingProgramUnit {
        id: UnitId(3),
        lecturer_id: LecturerId(1),
        title: "Ownership".into(),
        description: String::new(),
        duration_minutes: 120,
        order: 1,
        is_lead: true,
    }];

    client(&base_url)
        .update_program_units(ProgramId(8), &units)
        .await
        .expect("update units");

    let recorded = state.units.lock().await.clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, 8);
    assert_eq!(recorded[0].1.units, units);
}

#[tokio::test]
async fn upload_sends_raw_body_and_returns_url() {
    let (base_url, state) = spawn_backend().await.expect("spawn backend");

    let url = client(&base_url)
        .upload_file(
            UploadKind::BannerImage,
            "cover image.png",
            "image/png",
            vec![0x89, b'P', b'N', b'G'],
        )
        .await
        .expect("upload");

    assert_eq!(url, "https://cdn.example.com/banner/cover image.png");
    let uploads = state.uploads.lock().await.clone();
    let (query, content_type, size) = &uploads[0];
    assert_eq!(query.get("kind").map(String::as_str), Some("banner"));
    assert_eq!(query.get("mime_type").map(String::as_str), Some("image/png"));
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert_eq!(*size, 4);
}
