mod db;
mod error;
mod llm;
mod rate_limit;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use llm::types::LlmChat;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    if let Err(e) = services::auth::ensure_admin_from_env(&pool).await {
        tracing::error!(error = %e, "admin bootstrap failed");
    }

    // Initialize LLM client (non-fatal: LLM endpoints answer 503 if config missing).
    let (llm, max_tokens) = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            let max_tokens = client.max_tokens();
            (Some(Arc::new(client) as Arc<dyn LlmChat>), Some(max_tokens))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured, LLM features disabled");
            (None, None)
        }
    };

    let state = state::AppState::new(pool, llm, max_tokens);
    let limits = state.rate_limiter.config();
    tracing::info!(
        max_requests = limits.max_requests,
        max_files = limits.max_files,
        window_secs = limits.window.as_secs(),
        session_ttl_secs = state.sessions.ttl().as_secs(),
        secure_folder = %state.secure_folder.root().display(),
        "anonymous quotas configured"
    );

    // Spawn background expiry sweep.
    let _janitor = services::janitor::spawn_janitor_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "docchat listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server failed");
}
