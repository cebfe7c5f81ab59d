//! The follow graph: directed edges between users.

use sea_orm::sea_query::SelectStatement;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Set,
};
use tracing::{info, instrument};

use crate::entities::{follow, user};
use crate::error::AppResult;
use crate::store;

/// `SELECT author_id FROM follows WHERE user_id = ?`, for use in `IN (...)` filters.
pub fn followee_ids(user_id: i32) -> SelectStatement {
    follow::Entity::find()
        .select_only()
        .column(follow::Column::AuthorId)
        .filter(follow::Column::UserId.eq(user_id))
        .into_query()
}

pub async fn is_following<C: ConnectionTrait>(db: &C, user_id: i32, author_id: i32) -> AppResult<bool> {
    let edges = follow::Entity::find()
        .filter(follow::Column::UserId.eq(user_id))
        .filter(follow::Column::AuthorId.eq(author_id))
        .count(db)
        .await?;
    Ok(edges > 0)
}

/// Adds the edge `user_id -> author_id`. Following yourself, or someone you already
/// follow, does nothing. Returns whether an edge was created.
#[instrument(skip(db))]
pub async fn follow<C: ConnectionTrait>(db: &C, user_id: i32, author_id: i32) -> AppResult<bool> {
    if user_id == author_id || is_following(db, user_id, author_id).await? {
        return Ok(false);
    }
    let am = follow::ActiveModel {
        user_id: Set(user_id),
        author_id: Set(author_id),
        ..Default::default()
    };
    match am.insert(db).await {
        Ok(_) => {
            info!("follow edge created");
            Ok(true)
        }
        // Lost a race with an identical request.
        Err(e) if store::is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Removes the edge if it exists. Returns whether one was removed.
#[instrument(skip(db))]
pub async fn unfollow<C: ConnectionTrait>(db: &C, user_id: i32, author_id: i32) -> AppResult<bool> {
    let res = follow::Entity::delete_many()
        .filter(follow::Column::UserId.eq(user_id))
        .filter(follow::Column::AuthorId.eq(author_id))
        .exec(db)
        .await?;
    if res.rows_affected > 0 {
        info!("follow edge removed");
    }
    Ok(res.rows_affected > 0)
}

/// Everyone `user_id` follows, by username.
pub async fn followees_of<C: ConnectionTrait>(db: &C, user_id: i32) -> AppResult<Vec<user::Model>> {
    Ok(user::Entity::find()
        .filter(user::Column::Id.in_subquery(followee_ids(user_id)))
        .order_by_asc(user::Column::Username)
        .all(db)
        .await?)
}
