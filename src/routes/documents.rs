//! Document analysis routes — uploads (public and authenticated) and the
//! secure folder.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::auth::AuthUser;
use super::form::FormData;
use crate::error::ApiError;
use crate::rate_limit::{ClientIp, QuotaKind};
use crate::services::conversation::{AnalysisOutcome, derive_title, secure_folder_title};
use crate::services::history::{self, DocumentRecord};
use crate::services::secure_folder;
use crate::services::session::SessionUser;
use crate::state::AppState;

const SECURE_FOLDER_DENIED: &str = "Access denied. You don't have permission to analyze CVs from the secure folder. \
     Please contact an administrator for access or upload your own documents to analyze.";

fn document_info(outcome: &AnalysisOutcome) -> Value {
    json!({
        "files": outcome.files,
        "total_files": outcome.total_files(),
        "source": outcome.source.as_str(),
    })
}

/// `POST /analyze-document/public` — needs both a file slot and a request slot.
pub async fn analyze_public(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    form: FormData,
) -> Result<Json<Value>, ApiError> {
    let file_permit = state.rate_limiter.check(&ip, QuotaKind::File)?;
    let request_permit = state.rate_limiter.check(&ip, QuotaKind::Request)?;
    let orchestrator = state.orchestrator()?;

    let prompt = form.required("prompt")?.to_owned();
    let outcome = orchestrator.analyze_documents(form.files, &prompt, None).await?;

    let remaining_files = file_permit.remaining_after();
    let remaining_requests = request_permit.remaining_after();
    file_permit.increment();
    request_permit.increment();
    tracing::info!(%ip, files = outcome.total_files(), remaining_files, remaining_requests, "public document analysis");

    Ok(Json(json!({
        "response": outcome.response,
        "files_processed": outcome.files,
        "total_files": outcome.total_files(),
        "session_id": outcome.session_id,
        "rate_limit": {
            "remaining_requests": remaining_requests,
            "remaining_files": remaining_files,
            "message": format!("Upload successful! {remaining_files} file uploads remaining before sign-in required."),
        },
    })))
}

/// `POST /analyze-document` — authenticated upload analysis, persisted to history.
pub async fn analyze(
    State(state): State<AppState>,
    auth: AuthUser,
    form: FormData,
) -> Result<Json<Value>, ApiError> {
    let orchestrator = state.orchestrator()?;
    let prompt = form.required("prompt")?.to_owned();
    let user = auth.user;

    let outcome = orchestrator.analyze_documents(form.files, &prompt, Some(user.id)).await?;
    let title = derive_title(&prompt);
    history::record_analysis(
        &state.pool,
        outcome.session_id,
        user.id,
        &prompt,
        &outcome.response,
        DocumentRecord { title: &title, document_info: document_info(&outcome) },
    )
    .await?;

    Ok(Json(json!({
        "response": outcome.response,
        "files_processed": outcome.files,
        "total_files": outcome.total_files(),
        "session_id": outcome.session_id,
        "user": user.full_name,
    })))
}

async fn may_use_secure_folder(state: &AppState, user: &SessionUser) -> Result<bool, ApiError> {
    if user.is_admin() {
        return Ok(true);
    }
    Ok(secure_folder::has_grant(&state.pool, user.id).await?)
}

/// `POST /analyze-secure-folder` — admins, or users holding a grant.
pub async fn analyze_secure_folder(
    State(state): State<AppState>,
    auth: AuthUser,
    form: FormData,
) -> Result<Json<Value>, ApiError> {
    let user = auth.user;
    if !may_use_secure_folder(&state, &user).await? {
        tracing::info!(user_id = user.id, "secure folder analysis denied");
        return Err(ApiError::Forbidden(SECURE_FOLDER_DENIED.into()));
    }
    let orchestrator = state.orchestrator()?;
    let prompt = form.required("prompt")?.to_owned();

    let documents = state.secure_folder.read_all().await?;
    let outcome = orchestrator.analyze_secure_folder(documents, &prompt, user.id).await?;

    let title = secure_folder_title(&prompt);
    history::record_analysis(
        &state.pool,
        outcome.session_id,
        user.id,
        &prompt,
        &outcome.response,
        DocumentRecord { title: &title, document_info: document_info(&outcome) },
    )
    .await?;

    Ok(Json(json!({
        "response": outcome.response,
        "files_processed": outcome.files,
        "total_files": outcome.total_files(),
        "session_id": outcome.session_id,
        "source": outcome.source.as_str(),
    })))
}

/// `GET /user/secure-folder/permission`
pub async fn secure_folder_permission(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let is_admin = auth.user.is_admin();
    let has_access = may_use_secure_folder(&state, &auth.user).await?;
    Ok(Json(json!({ "has_access": has_access, "is_admin": is_admin })))
}

#[cfg(test)]
#[path = "documents_test.rs"]
mod tests;
