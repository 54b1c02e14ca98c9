use axum::{
    extract::{Form, State},
    response::{Html, Redirect},
    routing::get,
    Router,
};
use bcrypt::verify;
use diesel::prelude::*;
use std::sync::Arc;
use tera::Tera;

use crate::{
    auth::{set_user_session, AuthError, LoginForm},
    model::User,
    schema::users::dsl::{email, users},
    utils::render_template,
    DbPool,
};

pub async fn show_login_form(
    State((_pool, tera)): State<(DbPool, Arc<Tera>)>,
) -> Result<Html<String>, AuthError> {
    let mut context = tera::Context::new();
    context.insert("title", "Log in");
    Ok(render_template(&tera, "login.html", context))
}

#[axum::debug_handler]
pub async fn handle_login(
    State((pool, _tera)): State<(DbPool, Arc<Tera>)>,
    session: tower_sessions::Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, AuthError> {
    let mut conn = pool.get()?;

    let user = users
        .filter(email.eq(&form.email))
        .first::<User>(&mut conn)
        .optional()?;

    if let Some(user) = user {
        if verify(&form.password, &user.password)? {
            set_user_session(&session, user.user_id, &user.email).await?;
            return Ok(Redirect::to("/"));
        }
    }

    Err(AuthError::InvalidCredentials)
}

pub fn auth_router(pool: DbPool, tera: Arc<Tera>) -> Router {
    Router::new()
        .route("/login", get(show_login_form).post(handle_login))
        .with_state((pool, tera))
}
