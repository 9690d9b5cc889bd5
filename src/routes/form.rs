//! Form decoding shared by the chat, document and admin routes.
//!
//! Browser clients post `multipart/form-data`; scripted clients may send
//! `application/x-www-form-urlencoded` or a flat JSON object. All three land
//! in the same [`FormData`]. Files arrive under `files` or `files[]` (multipart
//! only); every other field is read as text. A `session_id` that is blank or
//! not a UUID is treated as absent, which routes the request to context-free
//! chat.
//!
//! Body rejections (bad encoding, oversized upload) are converted into
//! [`ApiError`] so they render as JSON like every other failure.

use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Path, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use axum_extra::extract::WithRejection;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::services::conversation::UploadedFile;

/// `Json<T>` whose rejection renders as [`ApiError`].
pub type JsonBody<T> = WithRejection<Json<T>, ApiError>;

/// `Query<T>` whose rejection renders as [`ApiError`].
pub type QueryParams<T> = WithRejection<Query<T>, ApiError>;

/// `Path<T>` whose rejection renders as [`ApiError`].
pub type PathParam<T> = WithRejection<Path<T>, ApiError>;

#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state).await?;
            Self::read(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(object) = Json::<HashMap<String, Value>>::from_request(req, state).await?;
            let fields = object
                .into_iter()
                .filter_map(|(name, value)| match value {
                    Value::Null => None,
                    Value::String(text) => Some((name, text)),
                    other => Some((name, other.to_string())),
                })
                .collect();
            Ok(Self { fields, files: Vec::new() })
        } else {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state).await?;
            Ok(Self { fields, files: Vec::new() })
        }
    }
}

impl FormData {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            if is_file_field(&name) {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let content_type = field.content_type().map(str::to_owned);
                let data = field.bytes().await?.to_vec();
                form.files.push(UploadedFile { filename, content_type, data });
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Non-blank text field, trimmed.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] naming the missing field.
    pub fn required(&self, name: &'static str) -> Result<&str, ApiError> {
        self.text(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Validation(format!("{name} is required")))
    }

    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.text("session_id").and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }
}

fn is_file_field(name: &str) -> bool {
    matches!(name, "files" | "files[]")
}

#[cfg(test)]
#[path = "form_test.rs"]
mod tests;
