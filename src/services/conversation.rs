//! Conversation orchestrator — picks the context mode for each request,
//! assembles the LLM call and advances the document session.
//!
//! DESIGN
//! ======
//! Three entry points:
//! - `chat`: continue a document session when the token resolves to a session
//!   the caller may continue, otherwise run a context-free chat with a persona
//!   picked from the message.
//! - `analyze_documents`: validate an upload batch and start a new session.
//! - `analyze_secure_folder`: same, over documents read from the secure folder,
//!   with the prompt wrapped in a confidentiality preamble.
//!
//! The orchestrator never touches the database. Routes persist history and
//! settle quota around it.
//!
//! ERROR HANDLING
//! ==============
//! Validation runs before any LLM call. A failed LLM call leaves the session
//! untouched: turns are appended only after a successful response.

use std::sync::Arc;

use uuid::Uuid;

use super::document_session::{
    DocumentInfo, DocumentSessionCache, DocumentSource, NewSession, PDF_MEDIA_TYPE, StoredDocument,
};
use super::persona::{self, Persona};
use crate::llm::types::{LlmChat, LlmError, Message, Part, Role};

const TITLE_MAX_CHARS: usize = 50;
const SECURE_TITLE_MAX_CHARS: usize = 30;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("No files provided")]
    NoFiles,

    #[error("File {filename} is not a PDF. Only PDF files are supported")]
    NotPdf { filename: String },

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// PDF by declared content type. Without a declared type, a `.pdf`
    /// extension is accepted.
    #[must_use]
    pub fn is_pdf(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) => ct.eq_ignore_ascii_case(PDF_MEDIA_TYPE),
            None => has_pdf_extension(&self.filename),
        }
    }
}

pub(crate) fn has_pdf_extension(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub response: String,
    /// Set when the reply was grounded in a document session.
    pub session_id: Option<Uuid>,
    pub has_document_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub response: String,
    pub session_id: Uuid,
    pub files: Vec<DocumentInfo>,
    pub source: DocumentSource,
}

impl AnalysisOutcome {
    #[must_use]
    pub fn total_files(&self) -> usize {
        self.files.len()
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn LlmChat>,
    sessions: DocumentSessionCache,
    max_tokens: u32,
}

impl Orchestrator {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmChat>, sessions: DocumentSessionCache, max_tokens: u32) -> Self {
        Self { llm, sessions, max_tokens }
    }

    /// Answer `message`, grounded in the session behind `session_id` when the
    /// caller may continue it.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Llm`] when the provider call fails; the
    /// session transcript is left unchanged.
    pub async fn chat(
        &self,
        message: &str,
        session_id: Option<Uuid>,
        caller: Option<i64>,
    ) -> Result<ChatOutcome, ConversationError> {
        if message.trim().is_empty() {
            return Err(ConversationError::MissingField("message"));
        }

        if let Some(id) = session_id {
            if let Some(mut session) = self.sessions.lock(id).await {
                if session.is_continuable_by(caller) {
                    let mut parts: Vec<Part> = session
                        .documents()
                        .iter()
                        .map(|d| Part::Document { media_type: d.media_type.clone(), data: d.data.clone() })
                        .collect();
                    parts.extend(session.transcript().iter().map(|t| Part::Text(t.render())));
                    parts.push(Part::Text(format!("User: {message}")));

                    let reply = self
                        .llm
                        .chat(self.max_tokens, Persona::General.system_instruction(), &[Message::user(parts)])
                        .await?;

                    session.push_turn(Role::User, message);
                    session.push_turn(Role::Assistant, reply.text.clone());
                    tracing::info!(session_id = %id, turns = session.transcript().len(), "document chat turn");

                    return Ok(ChatOutcome { response: reply.text, session_id: Some(id), has_document_context: true });
                }
                tracing::info!(session_id = %id, "session owned by another user; answering without context");
            }
        }

        let persona = persona::for_chat(message);
        let reply = self
            .llm
            .chat(self.max_tokens, persona.system_instruction(), &[Message::user(vec![Part::text(message)])])
            .await?;
        tracing::debug!(persona = persona.as_str(), "context-free chat turn");

        Ok(ChatOutcome { response: reply.text, session_id: None, has_document_context: false })
    }

    /// Validate an uploaded batch, analyse it and open a new session.
    ///
    /// # Errors
    ///
    /// Rejects empty or mixed batches before any LLM call; otherwise returns
    /// [`ConversationError::Llm`] when the provider call fails.
    pub async fn analyze_documents(
        &self,
        files: Vec<UploadedFile>,
        prompt: &str,
        owner: Option<i64>,
    ) -> Result<AnalysisOutcome, ConversationError> {
        if prompt.trim().is_empty() {
            return Err(ConversationError::MissingField("prompt"));
        }
        let documents = validate_pdf_batch(files)?;
        self.analyze(documents, prompt, prompt, owner, DocumentSource::Upload).await
    }

    /// Analyse documents read from the secure folder and open a new session.
    /// Access checks happen before the documents are read.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::NoFiles`] for an empty set, or
    /// [`ConversationError::Llm`] when the provider call fails.
    pub async fn analyze_secure_folder(
        &self,
        documents: Vec<StoredDocument>,
        prompt: &str,
        owner: i64,
    ) -> Result<AnalysisOutcome, ConversationError> {
        if prompt.trim().is_empty() {
            return Err(ConversationError::MissingField("prompt"));
        }
        if documents.is_empty() {
            return Err(ConversationError::NoFiles);
        }
        let wrapped = secure_folder_prompt(prompt);
        self.analyze(documents, &wrapped, prompt, Some(owner), DocumentSource::SecureFolder).await
    }

    async fn analyze(
        &self,
        documents: Vec<StoredDocument>,
        llm_prompt: &str,
        transcript_prompt: &str,
        owner: Option<i64>,
        source: DocumentSource,
    ) -> Result<AnalysisOutcome, ConversationError> {
        let persona = persona::for_analysis(llm_prompt);
        let mut parts: Vec<Part> = documents
            .iter()
            .map(|d| Part::Document { media_type: d.media_type.clone(), data: d.data.clone() })
            .collect();
        parts.push(Part::Text(format!(
            "Based on the {} PDF document(s) provided above, please answer the following question: {llm_prompt}",
            documents.len()
        )));

        let reply = self
            .llm
            .chat(self.max_tokens, persona.system_instruction(), &[Message::user(parts)])
            .await?;

        let files: Vec<DocumentInfo> = documents.iter().map(StoredDocument::info).collect();
        let session_id = self
            .sessions
            .create(NewSession {
                documents,
                initial_prompt: transcript_prompt.to_owned(),
                initial_response: reply.text.clone(),
                owner_user_id: owner,
                source,
            })
            .await;
        tracing::info!(%session_id, files = files.len(), persona = persona.as_str(), "documents analysed");

        Ok(AnalysisOutcome { response: reply.text, session_id, files, source })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Accept a batch only if every file is a PDF. The first offending file is
/// named in the error.
///
/// # Errors
///
/// Returns [`ConversationError::NoFiles`] or [`ConversationError::NotPdf`].
pub fn validate_pdf_batch(files: Vec<UploadedFile>) -> Result<Vec<StoredDocument>, ConversationError> {
    if files.is_empty() {
        return Err(ConversationError::NoFiles);
    }
    if let Some(bad) = files.iter().find(|f| !f.is_pdf()) {
        return Err(ConversationError::NotPdf { filename: bad.filename.clone() });
    }
    Ok(files.into_iter().map(|f| StoredDocument::pdf(f.filename, f.data)).collect())
}

fn secure_folder_prompt(prompt: &str) -> String {
    format!(
        "You are analyzing CVs from a confidential recruitment process. Please provide:\n\n\
         User Request: {prompt}\n\n\
         Guidelines for CV Analysis:\n\
         - Maintain confidentiality and professionalism\n\
         - Focus on relevant skills, experience, and qualifications\n\
         - Provide comparative analysis when requested\n\
         - Respect privacy by not revealing personal details unless specifically asked\n\
         - Summarize key findings and recommendations\n\n\
         Please analyze the CVs and respond to the user's request."
    )
}

pub(crate) fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

/// Title of a persisted conversation: the first user message, cut at 50
/// characters with a trailing ellipsis.
#[must_use]
pub fn derive_title(first_message: &str) -> String {
    truncate_with_ellipsis(first_message, TITLE_MAX_CHARS)
}

/// Title of a secure-folder analysis conversation.
#[must_use]
pub fn secure_folder_title(prompt: &str) -> String {
    format!("CV Analysis: {}", truncate_with_ellipsis(prompt, SECURE_TITLE_MAX_CHARS))
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
