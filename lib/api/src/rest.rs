use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError, Result as ActixResult};
use fraudx_core::{ApplicationRecord, EmbeddingStore, Error, StoredCase};
use fraudx_schema::PipelineInfo;
use fraudx_similarity::DecisionEngine;
use fraudx_storage::StorageManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state behind every handler
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
    pub storage: Arc<StorageManager>,
}

impl AppState {
    pub fn new(engine: Arc<DecisionEngine>, storage: Arc<StorageManager>) -> Self {
        Self { engine, storage }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("{0}")]
    NotFound(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(Error::Encoding { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Core(Error::NotFitted { .. } | Error::StoreUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Core(Error::DuplicateCase(_)) => StatusCode::CONFLICT,
            ApiError::Core(Error::Serialization(_)) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Core(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let retryable = matches!(self, ApiError::Core(e) if e.is_retryable());
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
            "retryable": retryable,
        }))
    }
}

#[derive(Deserialize)]
struct PutCaseRequest {
    merchant_id: Option<String>,
    application: serde_json::Value,
    fraud_reason: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_ready: bool,
    cases: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline: Option<PipelineInfo>,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(state.clone()))
                .configure(RestApi::configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }

    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.route("/evaluate", web::post().to(evaluate))
            .route("/schema", web::get().to(get_schema))
            .route("/health", web::get().to(health))
            .route("/cases", web::put().to(put_case))
            .route("/model/reload", web::post().to(reload_model));
    }
}

async fn evaluate(
    state: web::Data<Arc<AppState>>,
    body: web::Json<serde_json::Value>,
) -> ActixResult<HttpResponse, ApiError> {
    let record = ApplicationRecord::from_value(body.into_inner())?;
    let decision = state.engine.evaluate(&record).await?;
    Ok(HttpResponse::Ok().json(decision))
}

async fn get_schema(state: web::Data<Arc<AppState>>) -> ActixResult<HttpResponse> {
    let config = state.engine.embedder().config();
    Ok(HttpResponse::Ok().json(config.as_ref()))
}

async fn health(state: web::Data<Arc<AppState>>) -> ActixResult<HttpResponse> {
    let embedder = state.engine.embedder();
    let pipeline = embedder.current().ok().map(|s| s.info().clone());
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        model_ready: pipeline.is_some(),
        cases: state.storage.len(),
        pipeline,
    }))
}

async fn put_case(
    state: web::Data<Arc<AppState>>,
    body: web::Json<PutCaseRequest>,
) -> ActixResult<HttpResponse, ApiError> {
    let req = body.into_inner();
    let application = ApplicationRecord::from_value(req.application)?;
    let merchant_id = req
        .merchant_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Embedded under the store's write lock so a concurrent reload cannot
    // leave this case behind on the old state.
    let embedder = state.engine.embedder().clone();
    let storage = state.storage.clone();
    let id = merchant_id.clone();
    web::block(move || {
        storage.put_with(|| {
            let embedding = embedder.embed(&application)?;
            let case = StoredCase::new(id, embedding, application);
            Ok(match req.fraud_reason {
                Some(reason) => case.with_fraud_reason(reason),
                None => case,
            })
        })
    })
    .await
    .map_err(|e| Error::StoreUnavailable(e.to_string()))??;

    info!(merchant_id = %merchant_id, "Stored case");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "result": { "merchant_id": merchant_id }
    })))
}

/// Publish the saved artifact, re-embedding the stored cases first so that
/// queries under the new state compare against vectors from the same state.
/// The publish happens under the store's write lock.
async fn reload_model(state: web::Data<Arc<AppState>>) -> ActixResult<HttpResponse, ApiError> {
    let storage = state.storage.clone();
    let artifact = web::block(move || storage.load_model())
        .await
        .map_err(|e| anyhow::anyhow!("model reload task failed: {}", e))??
        .ok_or_else(|| ApiError::NotFound("no model artifact has been saved".to_string()))?;

    let fitted = artifact.into_state()?;
    let embedder = state.engine.embedder().clone();
    if let Err(e) = embedder.check_layout(&fitted) {
        warn!(error = %e, "Rejected reloaded model");
        return Err(e.into());
    }

    let info = fitted.info().clone();
    let storage = state.storage.clone();
    let report = web::block(move || {
        storage.reembed_in_place(fitted, |fitted| {
            embedder.publish(fitted)?;
            Ok(())
        })
    })
    .await
    .map_err(|e| anyhow::anyhow!("model reload task failed: {}", e))??;

    info!(kept = report.kept, quarantined = report.quarantined, "Reloaded model");

    Ok(HttpResponse::Ok().json(serde_json::json!({ "result": info, "cases": report })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use fraudx_core::{
        FeatureGroup, FieldSpec, ModelConfig, SearchConfig, Thresholds, TransformerKind,
    };
    use fraudx_schema::{FittedEncoderState, StructuredEmbedder};
    use serde_json::json;
    use tempfile::TempDir;

    fn config() -> ModelConfig {
        ModelConfig {
            name: "merchants".to_string(),
            description: None,
            fields: vec![
                FieldSpec::string("email"),
                FieldSpec::string("phone").optional(),
                FieldSpec::string("business_name").optional(),
            ],
            feature_groups: vec![
                FeatureGroup::new("contact", ["email", "phone"], TransformerKind::hash()),
                FeatureGroup::new("name", ["business_name"], TransformerKind::OneHot),
            ],
            embedding_dim: 4,
            similarity_thresholds: Thresholds::default(),
            reducer: None,
            search: SearchConfig::default(),
        }
    }

    fn corpus() -> Vec<ApplicationRecord> {
        [
            json!({"email": "a@x.com", "business_name": "Alpha"}),
            json!({"email": "b@x.com", "phone": "555-0100"}),
        ]
        .into_iter()
        .map(|value| ApplicationRecord::from_value(value).unwrap())
        .collect()
    }

    fn state(dir: &TempDir, fitted: bool) -> Arc<AppState> {
        let config = Arc::new(config());
        let embedder = if fitted {
            let state = FittedEncoderState::fit(&config, &corpus()).unwrap();
            StructuredEmbedder::with_state(config.clone(), state).unwrap()
        } else {
            StructuredEmbedder::new(config.clone())
        };
        let storage = Arc::new(StorageManager::open(dir.path(), config.embedding_dim).unwrap());
        let engine = Arc::new(DecisionEngine::new(Arc::new(embedder), storage.clone()));
        Arc::new(AppState::new(engine, storage))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(RestApi::configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_evaluate_empty_store_approves() {
        let dir = TempDir::new().unwrap();
        let app = app!(state(&dir, true));

        let req = test::TestRequest::post()
            .uri("/evaluate")
            .set_json(json!({"email": "new@x.com"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["decision"], json!("Approve"));
        assert_eq!(body["vector_similarity"], json!(0.0));
    }

    #[actix_web::test]
    async fn test_stored_case_is_matched() {
        let dir = TempDir::new().unwrap();
        let app = app!(state(&dir, true));

        let req = test::TestRequest::put()
            .uri("/cases")
            .set_json(json!({
                "merchant_id": "m-1",
                "application": {"email": "fraud@x.com", "business_name": "Ghost LLC"},
                "fraud_reason": "synthetic identity"
            }))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::post()
            .uri("/evaluate")
            .set_json(json!({"email": "FRAUD@x.com", "business_name": "Ghost LLC"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["decision"], json!("Decline"));
        assert_eq!(body["field_matches"][0]["merchant_id"], json!("m-1"));
        assert_eq!(body["field_matches"][0]["fraud_reason"], json!("synthetic identity"));
    }

    #[actix_web::test]
    async fn test_duplicate_case_conflicts() {
        let dir = TempDir::new().unwrap();
        let app = app!(state(&dir, true));

        for expected in [StatusCode::OK, StatusCode::CONFLICT] {
            let req = test::TestRequest::put()
                .uri("/cases")
                .set_json(json!({"merchant_id": "m-1", "application": {"email": "a@x.com"}}))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), expected);
        }
    }

    #[actix_web::test]
    async fn test_error_status_mapping() {
        let dir = TempDir::new().unwrap();
        let app = app!(state(&dir, true));
        let req = test::TestRequest::post()
            .uri("/evaluate")
            .set_json(json!({"phone": "555-0100"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let dir = TempDir::new().unwrap();
        let app = app!(state(&dir, false));
        let req = test::TestRequest::post()
            .uri("/evaluate")
            .set_json(json!({"email": "a@x.com"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["retryable"], json!(false));
    }

    #[actix_web::test]
    async fn test_reload_publishes_saved_model() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, false);
        let fitted = FittedEncoderState::fit(&config(), &corpus()).unwrap();
        state.storage.save_model(&fitted).unwrap();
        let app = app!(state.clone());

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["model_ready"], json!(false));

        let req = test::TestRequest::post().uri("/model/reload").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["model_ready"], json!(true));
        assert_eq!(body["pipeline"]["corpus_size"], json!(2));
    }

    #[actix_web::test]
    async fn test_reload_reembeds_stored_cases() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, true);
        let app = app!(state.clone());

        let req = test::TestRequest::put()
            .uri("/cases")
            .set_json(json!({
                "merchant_id": "m-1",
                "application": {"email": "fraud@x.com", "business_name": "Ghost LLC"},
                "fraud_reason": "synthetic identity"
            }))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        // A refit that learns the stored business name changes its embedding
        let mut refit_corpus = corpus();
        refit_corpus.push(
            ApplicationRecord::from_value(json!({"email": "c@x.com", "business_name": "Ghost LLC"}))
                .unwrap(),
        );
        let refit = FittedEncoderState::fit(&config(), &refit_corpus).unwrap();
        let before = state.storage.memory().get("m-1").unwrap();
        assert_ne!(before.embedding, refit.assemble(&before.application).unwrap());
        state.storage.save_model(&refit).unwrap();

        let req = test::TestRequest::post().uri("/model/reload").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["cases"]["kept"], json!(1));
        assert_eq!(body["cases"]["quarantined"], json!(0));

        let stored = state.storage.memory().get("m-1").unwrap();
        assert_eq!(stored.embedding, refit.assemble(&stored.application).unwrap());

        let req = test::TestRequest::post()
            .uri("/evaluate")
            .set_json(json!({"email": "fraud@x.com", "business_name": "Ghost LLC"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["decision"], json!("Decline"));

        let req = test::TestRequest::put()
            .uri("/cases")
            .set_json(json!({"merchant_id": "m-2", "application": {"email": "later@x.com"}}))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let reopened = StorageManager::open(dir.path(), 4).unwrap();
        assert!(reopened.memory().contains("m-2"));
        let stored = reopened.memory().get("m-1").unwrap();
        assert_eq!(stored.embedding, refit.assemble(&stored.application).unwrap());
    }

    #[actix_web::test]
    async fn test_reload_with_other_layout_leaves_store_alone() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, true);
        let app = app!(state.clone());

        let req = test::TestRequest::put()
            .uri("/cases")
            .set_json(json!({"merchant_id": "m-1", "application": {"email": "a@x.com"}}))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
        let before = state.storage.memory().get("m-1").unwrap();

        let mut other = config();
        other.feature_groups[0].weight = 3.0;
        let refit = FittedEncoderState::fit(&other, &corpus()).unwrap();
        state.storage.save_model(&refit).unwrap();

        let req = test::TestRequest::post().uri("/model/reload").to_request();
        let status = test::call_service(&app, req).await.status();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(state.storage.memory().get("m-1").unwrap(), before);
    }

    #[actix_web::test]
    async fn test_reload_without_artifact() {
        let dir = TempDir::new().unwrap();
        let app = app!(state(&dir, false));
        let req = test::TestRequest::post().uri("/model/reload").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_schema() {
        let dir = TempDir::new().unwrap();
        let app = app!(state(&dir, false));
        let req = test::TestRequest::get().uri("/schema").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["embedding_dim"], json!(4));
        assert_eq!(body["fields"][0]["name"], json!("email"));
    }
}
