//! Feed composition: the index, group, profile and follow feeds.
//!
//! Every feed is the posts table filtered one way or another, newest first, cut into
//! pages by [`PageWindow`].

use std::collections::HashMap;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Select};

use crate::entities::{group, post};
use crate::error::AppResult;
use crate::follow::followee_ids;
use crate::pagination::PageWindow;
use crate::schema::{AuthorView, GroupFeed, PostPage, PostView, ProfileFeed};
use crate::store;

fn newest_first(select: Select<post::Entity>) -> Select<post::Entity> {
    select
        .order_by_desc(post::Column::PubDate)
        .order_by_desc(post::Column::Id)
}

/// Renders posts with their author usernames and group slugs, keeping input order.
pub async fn post_views<C: ConnectionTrait>(db: &C, posts: Vec<post::Model>) -> AppResult<Vec<PostView>> {
    let authors = store::usernames(db, posts.iter().map(|p| p.author_id).collect()).await?;
    let mut group_ids: Vec<i32> = posts.iter().filter_map(|p| p.group_id).collect();
    group_ids.sort_unstable();
    group_ids.dedup();
    let groups: HashMap<i32, String> = if group_ids.is_empty() {
        HashMap::new()
    } else {
        group::Entity::find()
            .filter(group::Column::Id.is_in(group_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|g| (g.id, g.slug))
            .collect()
    };

    Ok(posts
        .into_iter()
        .map(|p| PostView {
            author: authors.get(&p.author_id).cloned().unwrap_or_default(),
            group: p.group_id.and_then(|id| groups.get(&id).cloned()),
            id: p.id,
            text: p.text,
            pub_date: p.pub_date,
            image: p.image,
        })
        .collect())
}

async fn page_of<C: ConnectionTrait>(
    db: &C,
    select: Select<post::Entity>,
    page: Option<&str>,
    per_page: u64,
) -> AppResult<PostPage> {
    let paginator = newest_first(select).paginate(db, per_page.max(1));
    let window = PageWindow::resolve(page, paginator.num_items().await?, per_page);
    let posts = paginator.fetch_page(window.index()).await?;
    Ok(PostPage::new(post_views(db, posts).await?, window))
}

/// Every post.
pub async fn all<C: ConnectionTrait>(db: &C, page: Option<&str>, per_page: u64) -> AppResult<PostPage> {
    page_of(db, post::Entity::find(), page, per_page).await
}

pub async fn by_group<C: ConnectionTrait>(
    db: &C,
    slug: &str,
    page: Option<&str>,
    per_page: u64,
) -> AppResult<GroupFeed> {
    let group = store::find_group(db, slug).await?;
    let select = post::Entity::find().filter(post::Column::GroupId.eq(group.id));
    Ok(GroupFeed {
        page: page_of(db, select, page, per_page).await?,
        group: group.into(),
    })
}

pub async fn by_author<C: ConnectionTrait>(
    db: &C,
    username: &str,
    page: Option<&str>,
    per_page: u64,
) -> AppResult<ProfileFeed> {
    let author = store::find_user(db, username).await?;
    let select = post::Entity::find().filter(post::Column::AuthorId.eq(author.id));
    let page = page_of(db, select, page, per_page).await?;
    Ok(ProfileFeed {
        author: AuthorView::from(&author),
        posts_count: page.count,
        page,
    })
}

/// Posts by the authors `user_id` follows. Empty when they follow nobody.
pub async fn by_followed<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    page: Option<&str>,
    per_page: u64,
) -> AppResult<PostPage> {
    let select = post::Entity::find().filter(post::Column::AuthorId.in_subquery(followee_ids(user_id)));
    page_of(db, select, page, per_page).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::{follow, testing};

    #[tokio::test]
    async fn thirteen_posts_split_ten_and_three() {
        let db = testing::db().await;
        let author = testing::user(&db, "leo").await;
        for _ in 0..13 {
            testing::post(&db, &author, None).await;
        }

        let first = all(&db, Some("1"), 10).await.unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.count, 13);
        assert!(first.has_next);

        let second = all(&db, Some("2"), 10).await.unwrap();
        assert_eq!(second.items.len(), 3);
        assert!(second.has_previous);

        let clamped = all(&db, Some("9"), 10).await.unwrap();
        assert_eq!(clamped.number, 2);
        assert_eq!(clamped.items, second.items);
    }

    #[tokio::test]
    async fn newest_post_comes_first() {
        let db = testing::db().await;
        let author = testing::user(&db, "leo").await;
        testing::post(&db, &author, None).await;
        let latest = testing::post(&db, &author, None).await;

        let page = all(&db, None, 10).await.unwrap();
        assert_eq!(page.items[0].id, latest.id);
        assert_eq!(page.items[0].author, "leo");
    }

    #[tokio::test]
    async fn group_feed_only_has_group_posts() {
        let db = testing::db().await;
        let author = testing::user(&db, "leo").await;
        let cats = testing::group(&db, "cats").await;
        let dogs = testing::group(&db, "dogs").await;
        let cat_post = testing::post(&db, &author, Some(cats.id)).await;
        testing::post(&db, &author, Some(dogs.id)).await;
        testing::post(&db, &author, None).await;

        let feed = by_group(&db, "cats", None, 10).await.unwrap();
        assert_eq!(feed.group.slug, "cats");
        assert_eq!(feed.page.items.len(), 1);
        assert_eq!(feed.page.items[0].id, cat_post.id);
        assert_eq!(feed.page.items[0].group.as_deref(), Some("cats"));
    }

    #[tokio::test]
    async fn unknown_group_or_author_is_not_found() {
        let db = testing::db().await;
        assert!(matches!(
            by_group(&db, "nope", None, 10).await,
            Err(AppError::NotFound("group"))
        ));
        assert!(matches!(
            by_author(&db, "nobody", None, 10).await,
            Err(AppError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn profile_feed_counts_all_author_posts() {
        let db = testing::db().await;
        let leo = testing::user(&db, "leo").await;
        let ann = testing::user(&db, "ann").await;
        for _ in 0..12 {
            testing::post(&db, &leo, None).await;
        }
        testing::post(&db, &ann, None).await;

        let feed = by_author(&db, "leo", None, 10).await.unwrap();
        assert_eq!(feed.posts_count, 12);
        assert_eq!(feed.page.items.len(), 10);
        assert!(feed.page.items.iter().all(|p| p.author == "leo"));
    }

    #[tokio::test]
    async fn follow_feed_has_followed_authors_only() {
        let db = testing::db().await;
        let leo = testing::user(&db, "leo").await;
        let ann = testing::user(&db, "ann").await;
        let bob = testing::user(&db, "bob").await;
        testing::post(&db, &ann, None).await;
        testing::post(&db, &ann, None).await;
        testing::post(&db, &bob, None).await;

        assert_eq!(by_followed(&db, leo.id, None, 10).await.unwrap().count, 0);

        follow::follow(&db, leo.id, ann.id).await.unwrap();
        let feed = by_followed(&db, leo.id, None, 10).await.unwrap();
        assert_eq!(feed.items.len(), 2);
        assert!(feed.items.iter().all(|p| p.author == "ann"));

        assert_eq!(by_followed(&db, bob.id, None, 10).await.unwrap().items.len(), 0);
    }
}
