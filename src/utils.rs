use axum::response::Html;
use tera::{Context, Tera};
use tower_sessions::Session;

pub fn render_template(tera: &Tera, template_name: &str, context: Context) -> Html<String> {
    Html(
        tera.render(template_name, &context)
            .unwrap_or_else(|_| format!("Error rendering template: {}", template_name)),
    )
}

pub async fn get_current_user_id(session: &Session) -> Option<i32> {
    session.get::<i32>("user_id").await.ok().flatten()
}

pub async fn is_logged_in(session: &Session) -> bool {
    get_current_user_id(session).await.is_some()
}
