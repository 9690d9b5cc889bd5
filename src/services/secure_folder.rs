//! Secure repository — an admin-managed directory of PDFs plus per-user
//! access grants.
//!
//! Files live flat in one directory (`SECURE_FOLDER_PATH`). Filenames coming
//! from clients must be bare names: separators, `..` and hidden names are
//! rejected before any path is built.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::{PgPool, Row};

use super::conversation::{UploadedFile, has_pdf_extension};
use super::document_session::StoredDocument;

const DEFAULT_SECURE_FOLDER_PATH: &str = "./secure/cvs";

#[derive(Debug, thiserror::Error)]
pub enum SecureFolderError {
    #[error("Secure folder not found")]
    FolderMissing,

    #[error("No PDF files found in secure folder. Please contact an administrator to upload CV files.")]
    Empty,

    #[error("Failed to read any files from secure folder")]
    Unreadable,

    #[error("No files provided")]
    NoFiles,

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Only PDF files are allowed. {0} is not a PDF.")]
    NotPdf(String),

    #[error("File {0} already exists in the secure folder")]
    AlreadyExists(String),

    #[error("File {0} not found in secure folder")]
    FileMissing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecureFile {
    pub filename: String,
    pub size: u64,
    /// Last modification, unix seconds.
    pub uploaded_at: i64,
}

// =============================================================================
// FOLDER
// =============================================================================

#[derive(Debug, Clone)]
pub struct SecureFolder {
    root: PathBuf,
}

impl SecureFolder {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::var("SECURE_FOLDER_PATH").unwrap_or_else(|_| DEFAULT_SECURE_FOLDER_PATH.to_owned()))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// PDFs in the folder, sorted by name. A missing folder lists as empty.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<SecureFile>, SecureFolderError> {
        let mut files = Vec::new();
        for path in self.pdf_paths().await.unwrap_or_default() {
            let meta = tokio::fs::metadata(&path).await?;
            let uploaded_at = meta
                .modified()
                .ok()
                .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
                .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
            files.push(SecureFile { filename: file_name(&path), size: meta.len(), uploaded_at });
        }
        Ok(files)
    }

    /// Read every PDF for analysis. Unreadable files are skipped.
    ///
    /// # Errors
    ///
    /// [`SecureFolderError::FolderMissing`] / [`SecureFolderError::Empty`] when
    /// there is nothing to read, [`SecureFolderError::Unreadable`] when every
    /// read failed.
    pub async fn read_all(&self) -> Result<Vec<StoredDocument>, SecureFolderError> {
        let paths = self.pdf_paths().await.ok_or(SecureFolderError::FolderMissing)?;
        if paths.is_empty() {
            return Err(SecureFolderError::Empty);
        }

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            match tokio::fs::read(&path).await {
                Ok(data) => documents.push(StoredDocument::pdf(file_name(&path), data)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "secure folder: skipping unreadable file"),
            }
        }

        if documents.is_empty() {
            return Err(SecureFolderError::Unreadable);
        }
        Ok(documents)
    }

    /// Save an upload batch. The whole batch is validated before anything is
    /// written.
    ///
    /// # Errors
    ///
    /// Rejects empty batches, unsafe names, non-PDF names and names that
    /// already exist, on disk or earlier in the same batch.
    pub async fn store(&self, files: Vec<UploadedFile>) -> Result<Vec<SecureFile>, SecureFolderError> {
        if files.is_empty() {
            return Err(SecureFolderError::NoFiles);
        }
        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            validate_filename(&file.filename)?;
            if !has_pdf_extension(&file.filename) {
                return Err(SecureFolderError::NotPdf(file.filename.clone()));
            }
            if !seen.insert(file.filename.as_str()) || tokio::fs::try_exists(self.root.join(&file.filename)).await? {
                return Err(SecureFolderError::AlreadyExists(file.filename.clone()));
            }
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let path = self.root.join(&file.filename);
            tokio::fs::write(&path, &file.data).await?;
            tracing::info!(filename = %file.filename, size = file.data.len(), "secure folder: file stored");
            stored.push(SecureFile {
                filename: file.filename,
                size: file.data.len() as u64,
                uploaded_at: time::OffsetDateTime::now_utc().unix_timestamp(),
            });
        }
        Ok(stored)
    }

    /// # Errors
    ///
    /// Rejects unsafe names; [`SecureFolderError::FileMissing`] when absent.
    pub async fn delete(&self, filename: &str) -> Result<(), SecureFolderError> {
        validate_filename(filename)?;
        let path = self.root.join(filename);
        if !tokio::fs::try_exists(&path).await? {
            return Err(SecureFolderError::FileMissing(filename.to_owned()));
        }
        tokio::fs::remove_file(&path).await?;
        tracing::info!(%filename, "secure folder: file deleted");
        Ok(())
    }

    /// `None` when the folder does not exist.
    async fn pdf_paths(&self) -> Option<Vec<PathBuf>> {
        let mut dir = tokio::fs::read_dir(&self.root).await.ok()?;
        let mut paths = Vec::new();
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if is_file && has_pdf_extension(&file_name(&path)) {
                paths.push(path);
            }
        }
        paths.sort();
        Some(paths)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn validate_filename(filename: &str) -> Result<(), SecureFolderError> {
    let bad = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
        || filename.contains("..");
    if bad {
        return Err(SecureFolderError::InvalidFilename(filename.to_owned()));
    }
    Ok(())
}

// =============================================================================
// ACCESS GRANTS
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PermissionRow {
    pub user_id: i64,
    pub has_access: bool,
    pub user_email: String,
    pub user_name: String,
    pub granted_by: Option<i64>,
    pub granted_at: String,
}

/// Whether `user_id` holds an explicit grant. Admin access is decided by the
/// caller.
pub async fn has_grant(pool: &PgPool, user_id: i64) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT has_access FROM secure_folder_permissions WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some_and(|r| r.get::<bool, _>("has_access")))
}

/// Upsert a grant.
pub async fn set_grant(pool: &PgPool, user_id: i64, has_access: bool, granted_by: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"INSERT INTO secure_folder_permissions (user_id, has_access, granted_by)
          VALUES ($1, $2, $3)
          ON CONFLICT (user_id)
          DO UPDATE SET has_access = EXCLUDED.has_access,
                        granted_by = EXCLUDED.granted_by,
                        updated_at = now()",
    )
    .bind(user_id)
    .bind(has_access)
    .bind(granted_by)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_grants(pool: &PgPool) -> Result<Vec<PermissionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT p.user_id, p.has_access, p.granted_by, u.email, u.full_name,
                  to_char(p.created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS granted_at
           FROM secure_folder_permissions p
           JOIN users u ON u.id = p.user_id
           ORDER BY p.created_at"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| PermissionRow {
            user_id: r.get("user_id"),
            has_access: r.get("has_access"),
            user_email: r.get("email"),
            user_name: r.get("full_name"),
            granted_by: r.get("granted_by"),
            granted_at: r.get("granted_at"),
        })
        .collect())
}

#[cfg(test)]
#[path = "secure_folder_test.rs"]
mod tests;
