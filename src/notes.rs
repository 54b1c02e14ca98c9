use axum::{
    extract::{Json, Path, Query, State},
    routing::{delete, get, post},
    Router,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Integer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    api::{ApiError, ApiResponse},
    classify::{CardDraft, Classifier},
    model::{Card, NewCard, NewNode, Node},
    schema::{cards, nodes},
    search::{SearchEngine, MATCH_THRESHOLD},
    srs::Category,
    utils, DbPool,
};

pub fn notes_router(pool: DbPool, classifier: Classifier) -> Router {
    Router::new()
        .route("/notes", post(capture_note))
        .route("/nodes", get(list_nodes))
        .route("/nodes/{node_id}", delete(delete_node))
        .route("/stats", get(node_stats))
        .with_state((pool, classifier))
}

#[derive(Deserialize)]
pub struct CaptureRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct CapturedNote {
    pub node_id: i32,
    pub category: Category,
    pub cards: Vec<CardDraft>,
}

#[derive(Serialize)]
pub struct NodeWithCards {
    pub node_id: i32,
    pub category: Category,
    pub content: String,
    pub mastered: bool,
    pub interval_days: i32,
    pub next_due_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub cards: Vec<CardOut>,
}

#[derive(Serialize)]
pub struct CardOut {
    pub card_id: i32,
    pub front: String,
    pub back: String,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct NodeStats {
    pub total_nodes: i64,
    pub due_now: i64,
    pub code: i64,
    pub language: i64,
    pub note: i64,
}

/// Insert a freshly classified node and its cards in one transaction.
/// New nodes are immediately due: interval 0, next_due_at = now.
pub fn insert_node_with_cards(
    conn: &mut SqliteConnection,
    user_id: i32,
    category: Category,
    content: &str,
    drafts: &[CardDraft],
    now: NaiveDateTime,
) -> QueryResult<i32> {
    conn.transaction(|conn| {
        diesel::insert_into(nodes::table)
            .values(&NewNode {
                user_id,
                category: category.as_str(),
                content,
                mastered: false,
                interval_days: 0,
                next_due_at: now,
                created_at: now,
            })
            .execute(conn)?;

        let node_id = diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
            .get_result::<i32>(conn)?;

        for draft in drafts {
            diesel::insert_into(cards::table)
                .values(&NewCard {
                    node_id,
                    front: &draft.front,
                    back: &draft.back,
                })
                .execute(conn)?;
        }

        Ok(node_id)
    })
}

/// Load an account's nodes (newest first) with their cards, optionally
/// restricted to one category. Nodes whose stored category does not
/// parse are excluded from every display set.
pub fn load_nodes_with_cards(
    conn: &mut SqliteConnection,
    user_id: i32,
    category: Option<Category>,
) -> QueryResult<Vec<NodeWithCards>> {
    let mut query = nodes::table
        .filter(nodes::user_id.eq(user_id))
        .order(nodes::created_at.desc())
        .select(Node::as_select())
        .into_boxed();

    if let Some(category) = category {
        query = query.filter(nodes::category.eq(category.as_str()));
    }

    let node_rows: Vec<Node> = query.load(conn)?;

    let node_ids: Vec<i32> = node_rows.iter().map(|n| n.node_id).collect();
    let card_rows: Vec<Card> = cards::table
        .filter(cards::node_id.eq_any(&node_ids))
        .select(Card::as_select())
        .load(conn)?;

    let mut cards_by_node: HashMap<i32, Vec<CardOut>> = HashMap::new();
    for card in card_rows {
        cards_by_node.entry(card.node_id).or_default().push(CardOut {
            card_id: card.card_id,
            front: card.front,
            back: card.back,
        });
    }

    let result = node_rows
        .into_iter()
        .filter_map(|node| match Category::parse(&node.category) {
            Some(category) => Some(NodeWithCards {
                node_id: node.node_id,
                category,
                content: node.content,
                mastered: node.mastered,
                interval_days: node.interval_days,
                next_due_at: node.next_due_at,
                created_at: node.created_at,
                cards: cards_by_node.remove(&node.node_id).unwrap_or_default(),
            }),
            None => {
                log::warn!(
                    "node {} has unknown category {:?}, excluded from listing",
                    node.node_id,
                    node.category
                );
                None
            }
        })
        .collect();

    Ok(result)
}

/// Rank nodes against a search query, best match first, dropping
/// everything below the similarity threshold.
pub fn rank_nodes(query: &str, nodes: Vec<NodeWithCards>) -> Vec<NodeWithCards> {
    let normalized = SearchEngine::normalize(query);
    let mut scored: Vec<(NodeWithCards, f32)> = nodes
        .into_iter()
        .filter_map(|node| {
            let mut fields: Vec<&str> = vec![&node.content];
            for card in &node.cards {
                fields.push(&card.front);
                fields.push(&card.back);
            }
            let score = SearchEngine::score(&normalized, &fields);
            (score > MATCH_THRESHOLD).then_some((node, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(node, _)| node).collect()
}

/// Delete a node and its cards. The node delete goes first; if the
/// backend rejects it (cards still referencing it), remove the cards
/// and retry the node exactly once.
pub fn delete_node_with_fallback(conn: &mut SqliteConnection, node_id: i32) -> QueryResult<()> {
    match diesel::delete(nodes::table.filter(nodes::node_id.eq(node_id))).execute(conn) {
        Ok(_) => {
            diesel::delete(cards::table.filter(cards::node_id.eq(node_id))).execute(conn)?;
            Ok(())
        }
        Err(first) => {
            log::warn!(
                "deleting node {} failed ({}), removing its cards first",
                node_id,
                first
            );
            diesel::delete(cards::table.filter(cards::node_id.eq(node_id))).execute(conn)?;
            diesel::delete(nodes::table.filter(nodes::node_id.eq(node_id))).execute(conn)?;
            Ok(())
        }
    }
}

#[axum::debug_handler]
pub async fn capture_note(
    State((pool, classifier)): State<(DbPool, Classifier)>,
    session: tower_sessions::Session,
    Json(request): Json<CaptureRequest>,
) -> Result<Json<CapturedNote>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let content = request.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("Nothing to analyze".into()));
    }

    let classification = classifier.classify(content).await?;
    if classification.cards.is_empty() {
        return Err(ApiError::EmptyExtraction);
    }

    let mut conn = pool.get()?;
    let node_id = insert_node_with_cards(
        &mut conn,
        user_id,
        classification.category,
        content,
        &classification.cards,
        Utc::now().naive_utc(),
    )?;

    log::info!(
        "stored node {} ({}, {} cards)",
        node_id,
        classification.category.as_str(),
        classification.cards.len()
    );

    Ok(Json(CapturedNote {
        node_id,
        category: classification.category,
        cards: classification.cards,
    }))
}

pub async fn list_nodes(
    State((pool, _classifier)): State<(DbPool, Classifier)>,
    session: tower_sessions::Session,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<NodeWithCards>>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let category = match params.category.as_deref().filter(|c| !c.is_empty()) {
        Some(raw) => Some(
            Category::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("Unknown category: {}", raw)))?,
        ),
        None => None,
    };

    let mut conn = pool.get()?;
    let mut result = load_nodes_with_cards(&mut conn, user_id, category)?;

    if let Some(q) = params.q.as_deref().filter(|q| !q.trim().is_empty()) {
        result = rank_nodes(q, result);
    }

    Ok(Json(result))
}

pub async fn delete_node(
    State((pool, _classifier)): State<(DbPool, Classifier)>,
    session: tower_sessions::Session,
    Path(node_id): Path<i32>,
) -> Result<Json<ApiResponse>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;

    let owned = nodes::table
        .filter(nodes::node_id.eq(node_id))
        .filter(nodes::user_id.eq(user_id))
        .count()
        .get_result::<i64>(&mut conn)?
        > 0;

    if !owned {
        return Err(ApiError::NotFound("Node not found".into()));
    }

    delete_node_with_fallback(&mut conn, node_id)?;

    Ok(Json(ApiResponse::ok("Node deleted")))
}

pub async fn node_stats(
    State((pool, _classifier)): State<(DbPool, Classifier)>,
    session: tower_sessions::Session,
) -> Result<Json<NodeStats>, ApiError> {
    let user_id = utils::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let mut conn = pool.get()?;

    let total_nodes = nodes::table
        .filter(nodes::user_id.eq(user_id))
        .count()
        .get_result::<i64>(&mut conn)?;

    let due_now = nodes::table
        .filter(nodes::user_id.eq(user_id))
        .filter(nodes::next_due_at.le(Utc::now().naive_utc()))
        .count()
        .get_result::<i64>(&mut conn)?;

    let mut by_category = [0i64; 3];
    for (slot, category) in by_category
        .iter_mut()
        .zip([Category::Code, Category::Language, Category::Note])
    {
        *slot = nodes::table
            .filter(nodes::user_id.eq(user_id))
            .filter(nodes::category.eq(category.as_str()))
            .count()
            .get_result::<i64>(&mut conn)?;
    }

    Ok(Json(NodeStats {
        total_nodes,
        due_now,
        code: by_category[0],
        language: by_category[1],
        note: by_category[2],
    }))
}
