//! Persistence for users, groups, posts and comments.
//!
//! Foreign-key rules (post deletion removes its comments, group deletion detaches
//! its posts) are applied here explicitly inside a transaction rather than left to
//! the database.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use tracing::{info, instrument};

use crate::entities::{comment, group, post, user};
use crate::error::{AppError, AppResult};
use crate::forms::CleanPost;

pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(url);
    options
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);
    // Every in-memory SQLite connection is its own database.
    if url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }
    Database::connect(options).await
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

#[instrument(skip(db, new_user), fields(username = %new_user.username))]
pub async fn create_user<C: ConnectionTrait>(db: &C, new_user: NewUser) -> AppResult<user::Model> {
    let am = user::ActiveModel {
        username: Set(new_user.username),
        first_name: Set(new_user.first_name),
        last_name: Set(new_user.last_name),
        password_hash: Set(new_user.password_hash),
        ..Default::default()
    };
    let created = am.insert(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("username already taken".to_string())
        } else {
            AppError::Db(e)
        }
    })?;
    info!(user_id = created.id, "user created");
    Ok(created)
}

pub async fn find_user<C: ConnectionTrait>(db: &C, username: &str) -> AppResult<user::Model> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?
        .ok_or(AppError::NotFound("user"))
}

/// Usernames for a set of user ids.
pub async fn usernames<C: ConnectionTrait>(db: &C, mut ids: Vec<i32>) -> AppResult<HashMap<i32, String>> {
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect())
}

pub async fn user_by_id<C: ConnectionTrait>(db: &C, id: i32) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("user"))
}

#[instrument(skip(db, description))]
pub async fn create_group<C: ConnectionTrait>(
    db: &C,
    title: &str,
    slug: &str,
    description: &str,
) -> AppResult<group::Model> {
    let am = group::ActiveModel {
        title: Set(title.to_owned()),
        slug: Set(slug.to_owned()),
        description: Set(description.to_owned()),
        ..Default::default()
    };
    am.insert(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("group slug {slug:?} already exists"))
        } else {
            AppError::Db(e)
        }
    })
}

pub async fn find_group<C: ConnectionTrait>(db: &C, slug: &str) -> AppResult<group::Model> {
    group::Entity::find()
        .filter(group::Column::Slug.eq(slug))
        .one(db)
        .await?
        .ok_or(AppError::NotFound("group"))
}

pub async fn list_groups<C: ConnectionTrait>(db: &C) -> AppResult<Vec<group::Model>> {
    Ok(group::Entity::find()
        .order_by_asc(group::Column::Title)
        .all(db)
        .await?)
}

/// Deletes a group. Its posts stay, with their group reference cleared.
#[instrument(skip(db))]
pub async fn delete_group(db: &DatabaseConnection, group_id: i32) -> AppResult<()> {
    let txn = db.begin().await?;
    let detached = post::Entity::update_many()
        .col_expr(post::Column::GroupId, Expr::value(Option::<i32>::None))
        .filter(post::Column::GroupId.eq(group_id))
        .exec(&txn)
        .await?;
    let res = group::Entity::delete_by_id(group_id).exec(&txn).await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound("group"));
    }
    txn.commit().await?;
    info!(detached_posts = detached.rows_affected, "group deleted");
    Ok(())
}

pub async fn find_post<C: ConnectionTrait>(db: &C, id: i32) -> AppResult<post::Model> {
    post::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("post"))
}

#[instrument(skip(db, clean))]
pub async fn create_post<C: ConnectionTrait>(
    db: &C,
    author_id: i32,
    clean: CleanPost,
) -> AppResult<post::Model> {
    let am = post::ActiveModel {
        text: Set(clean.text),
        pub_date: Set(Utc::now().into()),
        author_id: Set(author_id),
        group_id: Set(clean.group_id),
        image: Set(clean.image),
        ..Default::default()
    };
    let created = am.insert(db).await?;
    info!(post_id = created.id, "post created");
    Ok(created)
}

/// Applies an edit. An edit without an image keeps the current one.
#[instrument(skip(db, existing, clean), fields(post_id = existing.id))]
pub async fn update_post<C: ConnectionTrait>(
    db: &C,
    existing: post::Model,
    clean: CleanPost,
) -> AppResult<post::Model> {
    let mut am: post::ActiveModel = existing.into();
    am.text = Set(clean.text);
    am.group_id = Set(clean.group_id);
    if let Some(image) = clean.image {
        am.image = Set(Some(image));
    }
    Ok(am.update(db).await?)
}

/// Deletes a post together with its comments.
#[instrument(skip(db))]
pub async fn delete_post(db: &DatabaseConnection, post_id: i32) -> AppResult<()> {
    let txn = db.begin().await?;
    let comments = comment::Entity::delete_many()
        .filter(comment::Column::PostId.eq(post_id))
        .exec(&txn)
        .await?;
    let res = post::Entity::delete_by_id(post_id).exec(&txn).await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound("post"));
    }
    txn.commit().await?;
    info!(deleted_comments = comments.rows_affected, "post deleted");
    Ok(())
}

pub async fn count_posts_by<C: ConnectionTrait>(db: &C, author_id: i32) -> AppResult<u64> {
    Ok(post::Entity::find()
        .filter(post::Column::AuthorId.eq(author_id))
        .count(db)
        .await?)
}

#[instrument(skip(db, text))]
pub async fn create_comment<C: ConnectionTrait>(
    db: &C,
    post_id: i32,
    author_id: i32,
    text: String,
) -> AppResult<comment::Model> {
    let am = comment::ActiveModel {
        text: Set(text),
        created: Set(Utc::now().into()),
        post_id: Set(post_id),
        author_id: Set(author_id),
        ..Default::default()
    };
    let created = am.insert(db).await?;
    info!(comment_id = created.id, "comment added");
    Ok(created)
}

/// Comments on a post, oldest first.
pub async fn comments_for<C: ConnectionTrait>(db: &C, post_id: i32) -> AppResult<Vec<comment::Model>> {
    Ok(comment::Entity::find()
        .filter(comment::Column::PostId.eq(post_id))
        .order_by_asc(comment::Column::Id)
        .all(db)
        .await?)
}
