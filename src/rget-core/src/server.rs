//! Recorder submission API.
//!
//! - `POST /api/v1/submit` with form field `url`: the recorder downloads
//!   that `SHA256SUMS`, stores it under its record name and answers with the
//!   [`Submission`] as JSON.
//!
//! [`submit_to`] is the matching client.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::RgetError;
use crate::recorder::{Recorder, Submission};
use crate::store::AuditLog;
use crate::sums::http_client;

/// Path of the submission endpoint.
pub const SUBMIT_PATH: &str = "/api/v1/submit";

/// Form body of a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitForm {
    /// URL of the release's `SHA256SUMS`.
    pub url: String,
}

/// JSON body of a failed request.
#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`RgetError`] as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RgetError);

impl ApiError {
    /// HTTP status for the wrapped error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            RgetError::UnknownSite { .. } | RgetError::Parse { .. } | RgetError::InvalidName { .. } => {
                StatusCode::BAD_REQUEST
            }
            RgetError::Http { .. } | RgetError::Tls { .. } | RgetError::Timeout { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Storage details stay in the log.
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal service error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Router serving the submission API for `recorder`.
pub fn router<L: AuditLog + 'static>(recorder: Arc<Recorder<L>>) -> Router {
    Router::new()
        .route(SUBMIT_PATH, post(submit::<L>))
        .with_state(recorder)
}

async fn submit<L: AuditLog + 'static>(
    State(recorder): State<Arc<Recorder<L>>>,
    Form(form): Form<SubmitForm>,
) -> Result<Json<Submission>, ApiError> {
    info!(url = %form.url, "Submission");
    match recorder.submit_url(&form.url).await {
        Ok(submission) => Ok(Json(submission)),
        Err(e) => {
            warn!(url = %form.url, error = %e, "Submission rejected");
            Err(ApiError(e))
        }
    }
}

/// Serve `router` on `addr` until the process exits.
pub async fn serve(router: Router, addr: &str) -> Result<(), RgetError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Recorder listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Submit the `SHA256SUMS` at `url` to the recorder at `server`
/// (e.g. `https://recorder.merklecounty.com`).
#[instrument(skip(timeout))]
pub async fn submit_to(server: &str, url: &str, timeout: Duration) -> Result<Submission, RgetError> {
    let endpoint = format!("{}{SUBMIT_PATH}", server.trim_end_matches('/'));
    let response = http_client(timeout)?
        .post(&endpoint)
        .form(&SubmitForm { url: url.into() })
        .send()
        .await
        .map_err(|e| RgetError::http(format!("POST {endpoint} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.error)
            .unwrap_or_else(|_| "no error detail".into());
        return Err(RgetError::http(format!("POST {endpoint}: HTTP {status}: {detail}")));
    }

    response
        .json::<Submission>()
        .await
        .map_err(|e| RgetError::http(format!("decoding response from {endpoint}: {e}")))
}
