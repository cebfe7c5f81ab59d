//! Fixtures shared by the test modules.

use std::sync::Arc;

use poem::test::TestResponse;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;

use crate::AppState;
use crate::config::Config;
use crate::entities::{group, post, user};
use crate::forms::CleanPost;
use crate::migration::Migrator;
use crate::store::{self, NewUser};

pub async fn db() -> DatabaseConnection {
    let db = store::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub fn config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        ..Config::default()
    }
}

pub fn state(db: DatabaseConnection) -> Arc<AppState> {
    state_with(db, config())
}

pub fn state_with(db: DatabaseConnection, config: Config) -> Arc<AppState> {
    Arc::new(AppState::new(db, config))
}

/// Post text comfortably over the minimum length, starting with `seed`.
pub fn long_text(seed: &str) -> String {
    format!("{seed} {}", "lorem ipsum ".repeat(10))
}

pub async fn user<C: sea_orm::ConnectionTrait>(db: &C, username: &str) -> user::Model {
    store::create_user(
        db,
        NewUser {
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: "!".to_string(),
        },
    )
    .await
    .unwrap()
}

pub async fn group<C: sea_orm::ConnectionTrait>(db: &C, slug: &str) -> group::Model {
    store::create_group(db, &format!("Group {slug}"), slug, "test group")
        .await
        .unwrap()
}

pub async fn post<C: sea_orm::ConnectionTrait>(
    db: &C,
    author: &user::Model,
    group_id: Option<i32>,
) -> post::Model {
    store::create_post(
        db,
        author.id,
        CleanPost {
            text: long_text(&author.username),
            group_id,
            image: None,
        },
    )
    .await
    .unwrap()
}

pub fn bearer(state: &AppState, user: &user::Model) -> String {
    format!("Bearer {}", state.tokens.issue(user).unwrap())
}

pub async fn body(resp: TestResponse) -> String {
    resp.0.into_body().into_string().await.unwrap()
}

pub async fn json(resp: TestResponse) -> serde_json::Value {
    serde_json::from_str(&body(resp).await).unwrap()
}
