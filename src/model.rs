use chrono::NaiveDateTime;
use diesel::{Insertable, Queryable, Selectable};
use serde::Serialize;

use crate::schema::{cards, nodes, users};

#[derive(Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub user_id: i32,
    pub email: String,
    pub password: String,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// One classified fact; the schedule hangs off `interval_days` and
/// `next_due_at`. `mastered` is stored but never promoted to true.
#[derive(Queryable, Selectable, Serialize, Debug)]
#[diesel(table_name = nodes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Node {
    pub node_id: i32,
    pub user_id: i32,
    pub category: String,
    pub content: String,
    pub mastered: bool,
    pub interval_days: i32,
    pub next_due_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = nodes)]
pub struct NewNode<'a> {
    pub user_id: i32,
    pub category: &'a str,
    pub content: &'a str,
    pub mastered: bool,
    pub interval_days: i32,
    pub next_due_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Serialize, Debug)]
#[diesel(table_name = cards)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Card {
    pub card_id: i32,
    pub node_id: i32,
    pub front: String,
    pub back: String,
}

#[derive(Insertable)]
#[diesel(table_name = cards)]
pub struct NewCard<'a> {
    pub node_id: i32,
    pub front: &'a str,
    pub back: &'a str,
}
