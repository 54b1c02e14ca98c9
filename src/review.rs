use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    api::{ApiError, ApiResponse},
    model::{Card, Node},
    schema::{cards, nodes},
    srs::{
        Category, Outcome, QueueEntry, ReviewSession, ScheduledReview, SessionState,
    },
    utils, DbPool,
};

/// One live review session per account, keyed by user id. Sessions are
/// rebuilt from a fresh due fetch on /start and dropped on exhaustion
/// or explicit discard.
pub type SessionMap = Arc<Mutex<HashMap<i32, ReviewSession>>>;

pub fn review_router(pool: DbPool, sessions: SessionMap) -> Router {
    Router::new()
        .route("/start", post(start_review))
        .route("/", get(current_view).delete(discard_review))
        .route("/reveal", post(reveal_card))
        .route("/grade", post(grade_card))
        .with_state((pool, sessions))
}

#[derive(Serialize)]
pub struct CardView {
    pub front: String,
    /// Only present once the card has been revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back: Option<String>,
    pub category: Category,
}

#[derive(Serialize)]
pub struct SessionView {
    pub status: &'static str,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<CardView>,
}

fn view_of(session: &ReviewSession) -> SessionView {
    match session.state() {
        SessionState::Empty => SessionView {
            status: "empty",
            total: 0,
            position: None,
            revealed: None,
            card: None,
        },
        SessionState::Complete => SessionView {
            status: "complete",
            total: session.len(),
            position: None,
            revealed: None,
            card: None,
        },
        SessionState::Showing { index, revealed } => {
            let card = session.current().map(|entry| CardView {
                front: entry.front.clone(),
                back: revealed.then(|| entry.back.clone()),
                category: entry.category,
            });
            SessionView {
                status: "showing",
                total: session.len(),
                position: Some(index),
                revealed: Some(revealed),
                card,
            }
        }
    }
}

/// Cards whose owning node is due at `now`, joined with the node's
/// category and interval, in schedule order. Rows whose stored category
/// does not parse to the fixed set are dropped with a warning — they
/// never reach the state machine.
pub fn fetch_due_entries(
    conn: &mut SqliteConnection,
    user_id: i32,
    now: NaiveDateTime,
) -> QueryResult<Vec<QueueEntry>> {
    let rows: Vec<(Card, Node)> = cards::table
        .inner_join(nodes::table)
        .filter(nodes::user_id.eq(user_id))
        .filter(nodes::next_due_at.le(now))
        .order((nodes::next_due_at.asc(), nodes::node_id.asc()))
        .select((Card::as_select(), Node::as_select()))
        .load(conn)?;

    let entries = rows
        .into_iter()
        .filter_map(|(card, node)| match Category::parse(&node.category) {
            Some(category) => Some(QueueEntry {
                card_id: card.card_id,
                node_id: node.node_id,
                category,
                front: card.front,
                back: card.back,
                interval_days: node.interval_days,
            }),
            None => {
                log::warn!(
                    "node {} has unknown category {:?}, excluded from review",
                    node.node_id,
                    node.category
                );
                None
            }
        })
        .collect();

    Ok(entries)
}

/// Persist a graded node's new interval and due date.
pub fn write_schedule(
    conn: &mut SqliteConnection,
    user_id: i32,
    node_id: i32,
    schedule: &ScheduledReview,
) -> QueryResult<usize> {
    diesel::update(
        nodes::table
            .filter(nodes::node_id.eq(node_id))
            .filter(nodes::user_id.eq(user_id)),
    )
    .set((
        nodes::interval_days.eq(schedule.interval_days),
        nodes::next_due_at.eq(schedule.next_due_at),
    ))
    .execute(conn)
}

#[axum::debug_handler]
pub async fn start_review(
    State((pool, sessions)): State<(DbPool, SessionMap)>,
    session: tower_sessions::Session,
) -> Result<Json<SessionView>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;
    let entries = fetch_due_entries(&mut conn, user_id, Utc::now().naive_utc())?;

    let review = ReviewSession::build(entries);
    let view = view_of(&review);

    // Re-entering review mode always replaces any previous session.
    sessions.lock().await.insert(user_id, review);

    Ok(Json(view))
}

pub async fn current_view(
    State((_pool, sessions)): State<(DbPool, SessionMap)>,
    session: tower_sessions::Session,
) -> Result<Json<SessionView>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let sessions = sessions.lock().await;
    let review = sessions
        .get(&user_id)
        .ok_or_else(|| ApiError::NotFound("No active review session".into()))?;

    Ok(Json(view_of(review)))
}

pub async fn reveal_card(
    State((_pool, sessions)): State<(DbPool, SessionMap)>,
    session: tower_sessions::Session,
) -> Result<Json<SessionView>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut sessions = sessions.lock().await;
    let review = sessions
        .get_mut(&user_id)
        .ok_or_else(|| ApiError::NotFound("No active review session".into()))?;

    review.reveal()?;
    Ok(Json(view_of(review)))
}

#[derive(Deserialize)]
pub struct GradeRequest {
    pub outcome: Outcome,
}

#[derive(Serialize)]
pub struct GradeResponse {
    /// Whether the new schedule reached the database. The session
    /// advances either way; a failed write is logged and reported here
    /// so the client never shows "saved" for a dropped write.
    pub persisted: bool,
    pub interval_days: i32,
    pub next_due_at: NaiveDateTime,
    pub session: SessionView,
}

#[axum::debug_handler]
pub async fn grade_card(
    State((pool, sessions)): State<(DbPool, SessionMap)>,
    session: tower_sessions::Session,
    Json(request): Json<GradeRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let (graded, view) = {
        let mut sessions = sessions.lock().await;
        let review = sessions
            .get_mut(&user_id)
            .ok_or_else(|| ApiError::NotFound("No active review session".into()))?;
        let graded = review.grade(request.outcome)?;
        (graded, view_of(review))
    };

    log::debug!(
        "user {} graded card {} as {:?}",
        user_id,
        graded.card_id,
        graded.outcome
    );

    let persisted = match pool
        .get()
        .map_err(ApiError::from)
        .and_then(|mut conn| {
            write_schedule(&mut conn, user_id, graded.node_id, &graded.schedule)
                .map_err(ApiError::from)
        }) {
        Ok(_) => true,
        Err(e) => {
            log::error!(
                "failed to persist schedule for node {}: {}",
                graded.node_id,
                e
            );
            false
        }
    };

    Ok(Json(GradeResponse {
        persisted,
        interval_days: graded.schedule.interval_days,
        next_due_at: graded.schedule.next_due_at,
        session: view,
    }))
}

pub async fn discard_review(
    State((_pool, sessions)): State<(DbPool, SessionMap)>,
    session: tower_sessions::Session,
) -> Result<Json<ApiResponse>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    sessions.lock().await.remove(&user_id);
    Ok(Json(ApiResponse::ok("Review session discarded")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").expect("in-memory sqlite");
        diesel::sql_query(
            "CREATE TABLE users (
                user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL
            )",
        )
        .execute(&mut conn)
        .unwrap();
        diesel::sql_query(
            "CREATE TABLE nodes (
                node_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users (user_id),
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                mastered BOOLEAN NOT NULL DEFAULT 0,
                interval_days INTEGER NOT NULL DEFAULT 0,
                next_due_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL
            )",
        )
        .execute(&mut conn)
        .unwrap();
        diesel::sql_query(
            "CREATE TABLE cards (
                card_id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id INTEGER NOT NULL REFERENCES nodes (node_id),
                front TEXT NOT NULL,
                back TEXT NOT NULL
            )",
        )
        .execute(&mut conn)
        .unwrap();
        conn
    }

    fn seed_user(conn: &mut SqliteConnection) -> i32 {
        use crate::schema::users;
        diesel::insert_into(users::table)
            .values((users::email.eq("t@example.com"), users::password.eq("x")))
            .execute(conn)
            .unwrap();
        users::table
            .select(users::user_id)
            .order(users::user_id.desc())
            .first(conn)
            .unwrap()
    }

    fn seed_node(
        conn: &mut SqliteConnection,
        user_id: i32,
        category: &str,
        interval_days: i32,
        next_due_at: NaiveDateTime,
    ) -> i32 {
        diesel::insert_into(nodes::table)
            .values((
                nodes::user_id.eq(user_id),
                nodes::category.eq(category),
                nodes::content.eq("content"),
                nodes::mastered.eq(false),
                nodes::interval_days.eq(interval_days),
                nodes::next_due_at.eq(next_due_at),
                nodes::created_at.eq(next_due_at),
            ))
            .execute(conn)
            .unwrap();
        nodes::table
            .select(nodes::node_id)
            .order(nodes::node_id.desc())
            .first(conn)
            .unwrap()
    }

    fn seed_card(conn: &mut SqliteConnection, node_id: i32, front: &str) {
        diesel::insert_into(cards::table)
            .values((
                cards::node_id.eq(node_id),
                cards::front.eq(front),
                cards::back.eq("back"),
            ))
            .execute(conn)
            .unwrap();
    }

    fn now() -> NaiveDateTime {
        "2026-08-06T12:00:00".parse().unwrap()
    }

    #[test]
    fn due_fetch_returns_due_cards_in_schedule_order() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn);

        let later = seed_node(&mut conn, user, "note", 4, now() - Duration::hours(1));
        let earlier = seed_node(&mut conn, user, "code", 0, now() - Duration::days(2));
        seed_card(&mut conn, later, "later");
        seed_card(&mut conn, earlier, "earlier");

        let entries = fetch_due_entries(&mut conn, user, now()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].front, "earlier");
        assert_eq!(entries[0].category, Category::Code);
        assert_eq!(entries[0].interval_days, 0);
        assert_eq!(entries[1].front, "later");
        assert_eq!(entries[1].interval_days, 4);
    }

    #[test]
    fn due_fetch_excludes_future_and_foreign_nodes() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn);

        let due = seed_node(&mut conn, user, "note", 1, now() - Duration::days(1));
        let future = seed_node(&mut conn, user, "note", 3, now() + Duration::days(3));
        seed_card(&mut conn, due, "due");
        seed_card(&mut conn, future, "future");

        let other_user = user + 1000;
        // Fetch is scoped to the requesting account.
        let entries = fetch_due_entries(&mut conn, other_user, now()).unwrap();
        assert!(entries.is_empty());

        let entries = fetch_due_entries(&mut conn, user, now()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].front, "due");
    }

    #[test]
    fn due_fetch_drops_unparsable_categories() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn);

        let good = seed_node(&mut conn, user, "language", 2, now() - Duration::days(1));
        let bad = seed_node(&mut conn, user, "mystery", 2, now() - Duration::days(1));
        seed_card(&mut conn, good, "good");
        seed_card(&mut conn, bad, "bad");

        let entries = fetch_due_entries(&mut conn, user, now()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].front, "good");
    }

    #[test]
    fn write_schedule_updates_only_the_owned_node() {
        let mut conn = test_conn();
        let user = seed_user(&mut conn);
        let node = seed_node(&mut conn, user, "note", 4, now());

        let schedule = ScheduledReview {
            interval_days: 10,
            next_due_at: now() + Duration::days(10),
        };

        // A foreign account never touches the row.
        assert_eq!(
            write_schedule(&mut conn, user + 1, node, &schedule).unwrap(),
            0
        );
        assert_eq!(write_schedule(&mut conn, user, node, &schedule).unwrap(), 1);

        let (interval, due): (i32, NaiveDateTime) = nodes::table
            .filter(nodes::node_id.eq(node))
            .select((nodes::interval_days, nodes::next_due_at))
            .first(&mut conn)
            .unwrap();
        assert_eq!(interval, 10);
        assert_eq!(due, now() + Duration::days(10));
    }
}
