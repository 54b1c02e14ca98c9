use anyhow::Context as _;
use axum::{
    extract::Extension,
    response::{IntoResponse, Redirect},
    routing::{get, get_service},
    Router,
};
use diesel::{
    r2d2::{ConnectionManager, Pool},
    SqliteConnection,
};
use std::sync::Arc;
use tera::{Context, Tera};
use time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

mod api;
mod auth;
mod classify;
mod login;
mod model;
mod notes;
mod register;
mod review;
mod schema;
mod search;
mod srs;
mod utils;

type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    // Database configuration
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://constellation.db".into());
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .build(manager)
        .context("Failed to create DB pool")?;

    // Classification service configuration
    let classifier = classify::Classifier::from_env().context("Classifier configuration")?;

    // Templates configuration
    let templates = Arc::new(Tera::new("templates/**/*.html").context("Template parsing error")?);

    // Sessions configuration
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(1)))
        .with_secure(false);

    // One live review session per account
    let review_sessions: review::SessionMap = Default::default();

    // Combined API router
    let api_router = Router::new()
        .merge(notes::notes_router(pool.clone(), classifier))
        .nest("/review", review::review_router(pool.clone(), review_sessions));

    // Auth router
    let auth_router = Router::new()
        .merge(login::auth_router(pool.clone(), templates.clone()))
        .merge(register::auth_router(pool.clone(), templates.clone()))
        .route("/logout", get(handle_logout));

    // Main application router
    let app = Router::new()
        // Pages
        .route("/", get(home))
        .route("/review", get(review_page))
        .route("/about", get(about))
        // Auth routes
        .nest("/auth", auth_router)
        // API routes
        .nest("/api", api_router)
        // Static files (star-field canvas and friends)
        .nest_service("/static", get_service(ServeDir::new("static")))
        // Shared state and layers
        .layer(Extension(templates))
        .layer(session_layer);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".into());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    log::info!("Server running on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

// Handlers for pages
async fn home(
    Extension(templates): Extension<Arc<Tera>>,
    session: tower_sessions::Session,
) -> impl IntoResponse {
    let mut context = Context::new();
    context.insert("logged_in", &utils::is_logged_in(&session).await);
    utils::render_template(&templates, "home.html", context)
}

async fn review_page(
    Extension(templates): Extension<Arc<Tera>>,
    session: tower_sessions::Session,
) -> impl IntoResponse {
    let mut context = Context::new();
    context.insert("logged_in", &utils::is_logged_in(&session).await);
    utils::render_template(&templates, "review.html", context)
}

async fn about(Extension(templates): Extension<Arc<Tera>>) -> impl IntoResponse {
    utils::render_template(&templates, "about.html", Context::new())
}

// Auth handlers
async fn handle_logout(session: tower_sessions::Session) -> Result<Redirect, auth::AuthError> {
    session.flush().await.map_err(|e| {
        log::error!("Failed to delete session: {}", e);
        auth::AuthError::Session("Failed to logout".into())
    })?;
    Ok(Redirect::to("/"))
}
