use std::sync::Arc;

use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, OpenApi};
use validator::ValidationErrors;

use crate::AppState;
use crate::auth::{self, Viewer};
use crate::error::AppError;
use crate::schema::{
    AuthorView, CommentForm, CommentFormRejected, CommentView, CredentialsRejected, GroupFeed,
    GroupView, LoginForm, LoginPrompt, PostDetail, PostForm, PostFormRejected, PostPage, PostView,
    ProfileFeed, Session, SignupForm,
};
use crate::store::{self, NewUser};
use crate::{feed, follow, forms};

#[derive(ApiResponse)]
pub enum CreatePostResponse {
    #[oai(status = 201)]
    Created(Json<PostView>),
    #[oai(status = 422)]
    Invalid(Json<PostFormRejected>),
}

#[derive(ApiResponse)]
pub enum EditPostResponse {
    #[oai(status = 200)]
    Updated(Json<PostView>),
    #[oai(status = 422)]
    Invalid(Json<PostFormRejected>),
    /// Not the author: sent back to the post.
    #[oai(status = 302)]
    NotAuthor(#[oai(header = "Location")] String),
}

#[derive(ApiResponse)]
pub enum DeletePostResponse {
    #[oai(status = 204)]
    Deleted,
    /// Not the author: sent back to the post.
    #[oai(status = 302)]
    NotAuthor(#[oai(header = "Location")] String),
}

#[derive(ApiResponse)]
pub enum CommentResponse {
    #[oai(status = 201)]
    Created(Json<CommentView>),
    #[oai(status = 422)]
    Invalid(Json<CommentFormRejected>),
}

#[derive(ApiResponse)]
pub enum FollowResponse {
    /// Back to the author's profile.
    #[oai(status = 302)]
    Found(#[oai(header = "Location")] String),
}

#[derive(ApiResponse)]
pub enum SignupResponse {
    #[oai(status = 201)]
    Created(Json<Session>),
    #[oai(status = 422)]
    Invalid(Json<CredentialsRejected>),
}

#[derive(ApiResponse)]
pub enum LoginResponse {
    #[oai(status = 200)]
    LoggedIn(Json<Session>),
    #[oai(status = 422)]
    Invalid(Json<CredentialsRejected>),
}

fn post_url(id: i32) -> String {
    format!("/posts/{id}/")
}

fn profile_url(username: &str) -> String {
    format!("/profile/{username}/")
}

/// One cache slot per requested page. Other query parameters do not change the feed.
fn index_cache_key(page: Option<&str>) -> String {
    format!("/?page={}", page.unwrap_or_default())
}

pub struct Api {
    pub state: Arc<AppState>,
}

impl Api {
    fn per_page(&self) -> u64 {
        self.state.config.posts_per_page
    }

    async fn render_post(&self, post: crate::entities::post::Model) -> poem::Result<PostView> {
        let mut views = feed::post_views(&self.state.db, vec![post]).await?;
        views
            .pop()
            .ok_or_else(|| AppError::Internal("post rendered to nothing".into()).into())
    }
}

#[OpenApi]
impl Api {
    /// Latest posts from everyone. Served from a short-lived cache.
    #[oai(path = "/", method = "get")]
    async fn index(&self, Query(page): Query<Option<String>>) -> poem::Result<Json<PostPage>> {
        let key = index_cache_key(page.as_deref());
        if let Some(cached) = self.state.index_cache.get(&key).await {
            return Ok(Json(cached));
        }
        let posts = feed::all(&self.state.db, page.as_deref(), self.per_page()).await?;
        self.state.index_cache.insert(key, posts.clone()).await;
        Ok(Json(posts))
    }

    /// Posts in a group.
    #[oai(path = "/group/:slug/", method = "get")]
    async fn group_posts(
        &self,
        Path(slug): Path<String>,
        Query(page): Query<Option<String>>,
    ) -> poem::Result<Json<GroupFeed>> {
        let group_feed = feed::by_group(&self.state.db, &slug, page.as_deref(), self.per_page()).await?;
        Ok(Json(group_feed))
    }

    /// An author's posts.
    #[oai(path = "/profile/:username/", method = "get")]
    async fn profile(
        &self,
        Path(username): Path<String>,
        Query(page): Query<Option<String>>,
    ) -> poem::Result<Json<ProfileFeed>> {
        let profile = feed::by_author(&self.state.db, &username, page.as_deref(), self.per_page()).await?;
        Ok(Json(profile))
    }

    /// A post with its comments.
    #[oai(path = "/posts/:id/", method = "get")]
    async fn post_detail(&self, Path(id): Path<i32>) -> poem::Result<Json<PostDetail>> {
        let db = &self.state.db;
        let post = store::find_post(db, id).await?;
        let author = store::user_by_id(db, post.author_id).await?;
        let posts_count = store::count_posts_by(db, author.id).await?;

        let comments = store::comments_for(db, id).await?;
        let names = store::usernames(db, comments.iter().map(|c| c.author_id).collect()).await?;
        let comments = comments
            .into_iter()
            .map(|c| {
                let name = names.get(&c.author_id).cloned().unwrap_or_default();
                CommentView::new(c, name)
            })
            .collect();

        Ok(Json(PostDetail {
            post: self.render_post(post).await?,
            author: AuthorView::from(&author),
            posts_count,
            comments,
        }))
    }

    /// Groups a post can be filed under.
    #[oai(path = "/groups/", method = "get")]
    async fn groups(&self) -> poem::Result<Json<Vec<GroupView>>> {
        let groups = store::list_groups(&self.state.db).await?;
        Ok(Json(groups.into_iter().map(GroupView::from).collect()))
    }

    /// New post by the logged-in user.
    #[oai(path = "/create/", method = "post")]
    async fn create_post(&self, auth: Viewer, Json(form): Json<PostForm>) -> poem::Result<CreatePostResponse> {
        let db = &self.state.db;
        let clean = match forms::clean_post(db, &form, self.state.config.post_min_length).await {
            Ok(clean) => clean,
            Err(AppError::Validation(errors)) => {
                return Ok(CreatePostResponse::Invalid(Json(PostFormRejected {
                    errors: forms::field_errors(&errors),
                    form,
                })));
            }
            Err(e) => return Err(e.into()),
        };
        let created = store::create_post(db, auth.0.id, clean).await?;
        Ok(CreatePostResponse::Created(Json(self.render_post(created).await?)))
    }

    /// Edit a post. Only its author may.
    #[oai(path = "/posts/:id/edit/", method = "post")]
    async fn edit_post(
        &self,
        auth: Viewer,
        Path(id): Path<i32>,
        Json(form): Json<PostForm>,
    ) -> poem::Result<EditPostResponse> {
        let db = &self.state.db;
        let post = store::find_post(db, id).await?;
        if post.author_id != auth.0.id {
            return Ok(EditPostResponse::NotAuthor(post_url(id)));
        }
        let clean = match forms::clean_post(db, &form, self.state.config.post_min_length).await {
            Ok(clean) => clean,
            Err(AppError::Validation(errors)) => {
                return Ok(EditPostResponse::Invalid(Json(PostFormRejected {
                    errors: forms::field_errors(&errors),
                    form,
                })));
            }
            Err(e) => return Err(e.into()),
        };
        let updated = store::update_post(db, post, clean).await?;
        Ok(EditPostResponse::Updated(Json(self.render_post(updated).await?)))
    }

    /// Delete a post and its comments. Only its author may.
    #[oai(path = "/posts/:id/", method = "delete")]
    async fn delete_post(&self, auth: Viewer, Path(id): Path<i32>) -> poem::Result<DeletePostResponse> {
        let post = store::find_post(&self.state.db, id).await?;
        if post.author_id != auth.0.id {
            return Ok(DeletePostResponse::NotAuthor(post_url(id)));
        }
        store::delete_post(&self.state.db, id).await?;
        Ok(DeletePostResponse::Deleted)
    }

    #[oai(path = "/posts/:id/comment/", method = "post")]
    async fn add_comment(
        &self,
        auth: Viewer,
        Path(id): Path<i32>,
        Json(form): Json<CommentForm>,
    ) -> poem::Result<CommentResponse> {
        let db = &self.state.db;
        let post = store::find_post(db, id).await?;
        let text = match forms::clean_comment(&form) {
            Ok(text) => text,
            Err(AppError::Validation(errors)) => {
                return Ok(CommentResponse::Invalid(Json(CommentFormRejected {
                    errors: forms::field_errors(&errors),
                    form,
                })));
            }
            Err(e) => return Err(e.into()),
        };
        let comment = store::create_comment(db, post.id, auth.0.id, text).await?;
        let author = auth.0.username.clone();
        Ok(CommentResponse::Created(Json(CommentView::new(comment, author))))
    }

    /// Posts from the authors the logged-in user follows.
    #[oai(path = "/follow/", method = "get")]
    async fn follow_index(&self, auth: Viewer, Query(page): Query<Option<String>>) -> poem::Result<Json<PostPage>> {
        let posts = feed::by_followed(&self.state.db, auth.0.id, page.as_deref(), self.per_page()).await?;
        Ok(Json(posts))
    }

    #[oai(path = "/profile/:username/follow/", method = "get")]
    async fn profile_follow(&self, auth: Viewer, Path(username): Path<String>) -> poem::Result<FollowResponse> {
        let author = store::find_user(&self.state.db, &username).await?;
        follow::follow(&self.state.db, auth.0.id, author.id).await?;
        Ok(FollowResponse::Found(profile_url(&author.username)))
    }

    #[oai(path = "/profile/:username/unfollow/", method = "get")]
    async fn profile_unfollow(&self, auth: Viewer, Path(username): Path<String>) -> poem::Result<FollowResponse> {
        let author = store::find_user(&self.state.db, &username).await?;
        follow::unfollow(&self.state.db, auth.0.id, author.id).await?;
        Ok(FollowResponse::Found(profile_url(&author.username)))
    }

    /// Authors a user follows.
    #[oai(path = "/profile/:username/following/", method = "get")]
    async fn following(&self, Path(username): Path<String>) -> poem::Result<Json<Vec<AuthorView>>> {
        let user = store::find_user(&self.state.db, &username).await?;
        let followees = follow::followees_of(&self.state.db, user.id).await?;
        Ok(Json(followees.iter().map(AuthorView::from).collect()))
    }

    #[oai(path = "/auth/signup/", method = "post")]
    async fn signup(&self, Json(form): Json<SignupForm>) -> poem::Result<SignupResponse> {
        let db = &self.state.db;
        let rejected = |errors: ValidationErrors| -> poem::Result<SignupResponse> {
            Ok(SignupResponse::Invalid(Json(CredentialsRejected {
                errors: forms::field_errors(&errors),
                username: form.username.clone(),
            })))
        };
        match forms::clean_signup(db, &form).await {
            Ok(()) => {}
            Err(AppError::Validation(errors)) => return rejected(errors),
            Err(e) => return Err(e.into()),
        }

        let new_user = NewUser {
            username: form.username.clone(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            password_hash: auth::hash_password(&form.password)?,
        };
        let user = match store::create_user(db, new_user).await {
            Ok(user) => user,
            Err(AppError::Conflict(msg)) => {
                let mut errors = ValidationErrors::new();
                errors.add("username", forms::field_error("unique", msg));
                return rejected(errors);
            }
            Err(e) => return Err(e.into()),
        };
        let token = self.state.tokens.issue(&user)?;
        Ok(SignupResponse::Created(Json(Session {
            username: user.username,
            token,
        })))
    }

    /// Where unauthenticated requests get sent.
    #[oai(path = "/auth/login/", method = "get")]
    async fn login_prompt(&self, Query(next): Query<Option<String>>) -> Json<LoginPrompt> {
        Json(LoginPrompt { next })
    }

    #[oai(path = "/auth/login/", method = "post")]
    async fn login(&self, Json(form): Json<LoginForm>) -> poem::Result<LoginResponse> {
        let user = match store::find_user(&self.state.db, &form.username).await {
            Ok(user) => Some(user),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let verified = match &user {
            Some(user) => auth::verify_password(&form.password, &user.password_hash)?,
            None => false,
        };
        match user {
            Some(user) if verified => {
                let token = self.state.tokens.issue(&user)?;
                Ok(LoginResponse::LoggedIn(Json(Session {
                    username: user.username,
                    token,
                })))
            }
            _ => {
                let mut errors = ValidationErrors::new();
                errors.add(
                    "__all__",
                    forms::field_error(
                        "invalid_login",
                        "Please enter a correct username and password.".to_string(),
                    ),
                );
                Ok(LoginResponse::Invalid(Json(CredentialsRejected {
                    errors: forms::field_errors(&errors),
                    username: form.username,
                })))
            }
        }
    }
}
