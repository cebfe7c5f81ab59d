//! Request and response bodies of the HTTP API.

use chrono::{DateTime, FixedOffset};
use poem_openapi::Object;
use validator::Validate;

use crate::entities::{comment, group, user};
use crate::pagination::PageWindow;

#[derive(Debug, Clone, PartialEq, Object)]
pub struct PostView {
    pub id: i32,
    pub text: String,
    pub pub_date: DateTime<FixedOffset>,
    /// Author username.
    pub author: String,
    /// Group slug.
    pub group: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Object)]
pub struct PostPage {
    pub items: Vec<PostView>,
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PostPage {
    pub fn new(items: Vec<PostView>, window: PageWindow) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            count: window.count,
            has_next: window.has_next(),
            has_previous: window.has_previous(),
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct GroupView {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl From<group::Model> for GroupView {
    fn from(group: group::Model) -> Self {
        Self {
            title: group.title,
            slug: group.slug,
            description: group.description,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct AuthorView {
    pub username: String,
    pub full_name: String,
}

impl From<&user::Model> for AuthorView {
    fn from(user: &user::Model) -> Self {
        Self {
            username: user.username.clone(),
            full_name: user.full_name(),
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct GroupFeed {
    pub group: GroupView,
    pub page: PostPage,
}

#[derive(Debug, Clone, Object)]
pub struct ProfileFeed {
    pub author: AuthorView,
    pub posts_count: u64,
    pub page: PostPage,
}

#[derive(Debug, Clone, Object)]
pub struct CommentView {
    pub id: i32,
    pub text: String,
    pub created: DateTime<FixedOffset>,
    pub author: String,
}

impl CommentView {
    pub fn new(comment: comment::Model, author: String) -> Self {
        Self {
            id: comment.id,
            text: comment.text,
            created: comment.created,
            author,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct PostDetail {
    pub post: PostView,
    pub author: AuthorView,
    /// How many posts the author has written in total.
    pub posts_count: u64,
    pub comments: Vec<CommentView>,
}

/// Submitted post form, used for both create and edit.
#[derive(Debug, Clone, Object)]
pub struct PostForm {
    pub text: String,
    /// Group id.
    pub group: Option<i32>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Object)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Debug, Clone, Object, Validate)]
pub struct SignupForm {
    #[validate(length(max = 150, message = "Ensure this value has at most 150 characters."))]
    pub first_name: String,
    #[validate(length(max = 150, message = "Ensure this value has at most 150 characters."))]
    pub last_name: String,
    #[validate(length(min = 1, max = 150, message = "Enter a username of at most 150 characters."))]
    pub username: String,
    #[validate(length(min = 8, message = "This password is too short. It must contain at least 8 characters."))]
    #[oai(write_only)]
    pub password: String,
}

#[derive(Debug, Clone, Object)]
pub struct LoginForm {
    pub username: String,
    #[oai(write_only)]
    pub password: String,
}

#[derive(Debug, Clone, Object)]
pub struct FieldError {
    pub field: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Object)]
pub struct PostFormRejected {
    pub errors: Vec<FieldError>,
    pub form: PostForm,
}

#[derive(Debug, Clone, Object)]
pub struct CommentFormRejected {
    pub errors: Vec<FieldError>,
    pub form: CommentForm,
}

/// Signup/login rejection. The password is never echoed back.
#[derive(Debug, Clone, Object)]
pub struct CredentialsRejected {
    pub errors: Vec<FieldError>,
    pub username: String,
}

#[derive(Debug, Clone, Object)]
pub struct Session {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, Object)]
pub struct LoginPrompt {
    /// Where to go after logging in.
    pub next: Option<String>,
}
