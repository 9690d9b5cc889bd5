//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation, quotas and auth
//! plumbing. The in-memory core (document sessions, personas, the
//! conversation orchestrator) never touches Postgres; history, accounts and
//! grants do.

pub mod admin;
pub mod auth;
pub mod conversation;
pub mod document_session;
pub mod history;
pub mod janitor;
pub mod persona;
pub mod secure_folder;
pub mod session;
