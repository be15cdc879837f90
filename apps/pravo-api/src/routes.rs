use axum::{
	Json, Router,
	extract::{State, rejection::JsonRejection},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};

use pravo_service::{EmbedResponse, RetrieveRequest, RetrieveResponse, ServiceError};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/retrieve-chunk", post(retrieve_chunk))
		.route("/retrieve-rules", post(retrieve_rules))
		.route("/embed", post(embed))
		.with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub version: &'static str,
	pub database_connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
	pub text: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
	let database_connected = state.service.storage_healthy().await;

	Json(HealthResponse {
		status: if database_connected { "healthy" } else { "unhealthy" },
		version: pravo_cli::VERSION,
		database_connected,
	})
}

async fn retrieve_chunk(
	State(state): State<AppState>,
	payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.retrieve_chunks(payload).await?;

	Ok(Json(response))
}

async fn retrieve_rules(
	State(state): State<AppState>,
	payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.retrieve_rules(payload).await?;

	Ok(Json(response))
}

async fn embed(
	State(state): State<AppState>,
	payload: Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<Json<EmbedResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.embed(&payload.text).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message, None),
			ServiceError::Timeout { message } =>
				json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", message, None),
			ServiceError::Provider { message } => {
				tracing::error!(%message, "Query encoder failed.");

				json_error(StatusCode::BAD_GATEWAY, "provider_error", message, None)
			},
			ServiceError::Integrity { message } => {
				tracing::error!(%message, "Corpus integrity violation.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "data_integrity", message, None)
			},
			ServiceError::Storage { message } => {
				tracing::error!(%message, "Storage failure.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message, None)
			},
		}
	}
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text(), None)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
