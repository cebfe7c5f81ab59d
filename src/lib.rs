//! Yatube: posts, groups, comments and follows behind a JSON API.

use std::sync::Arc;

use poem::http::{StatusCode, header};
use poem::middleware::{Cors, NormalizePath, TrailingSlash};
use poem::{Endpoint, EndpointExt, Request, Response, Route};
use poem_openapi::OpenApiService;
use sea_orm::DatabaseConnection;

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod entities;
pub mod error;
pub mod feed;
pub mod follow;
pub mod forms;
pub mod migration;
pub mod pagination;
pub mod schema;
pub mod store;
#[cfg(test)]
mod testing;

use crate::auth::TokenKeys;
use crate::cache::PageCache;
use crate::config::Config;
use crate::schema::PostPage;

pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub tokens: TokenKeys,
    /// Rendered index feed pages, keyed by path and page number.
    pub index_cache: PageCache<PostPage>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        Self {
            tokens: TokenKeys::new(&config.jwt_secret, config.jwt_ttl_secs),
            index_cache: PageCache::new(config.index_cache_ttl, config.index_cache_capacity),
            db,
            config,
        }
    }
}

/// Login page for an unauthenticated request to `path_and_query`, which comes back
/// url-encoded in `next`.
pub fn login_url(path_and_query: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("next", path_and_query)
        .finish();
    format!("/auth/login/?{query}")
}

/// Sends requests the bearer scheme refused to the login page instead of a bare 401.
async fn login_redirect<E: Endpoint>(ep: Arc<E>, req: Request) -> poem::Result<Response> {
    let uri = req.uri();
    let path = uri.path().to_owned();
    let next = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| path.clone());
    let resp = ep.get_response(req).await;
    if resp.status() != StatusCode::UNAUTHORIZED || path.starts_with("/auth/") {
        return Ok(resp);
    }
    Ok(Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, login_url(&next))
        .finish())
}

/// Paths are matched without their trailing slash, so `/groups/` and `/groups` are the
/// same route. The login redirect sits outside that and sees the path as sent.
pub fn app(state: Arc<AppState>) -> impl Endpoint {
    let api = OpenApiService::new(api::Api { state: state.clone() }, "Yatube API", "1.0");
    let ui = api.swagger_ui();

    Route::new()
        .nest("/docs", ui)
        .nest("/", api)
        .data(state)
        .with(NormalizePath::new(TrailingSlash::Trim))
        .around(login_redirect)
        .with(Cors::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_encodes_the_whole_request_target() {
        assert_eq!(login_url("/create/"), "/auth/login/?next=%2Fcreate%2F");
        assert_eq!(
            login_url("/follow/?page=2&x=a b"),
            "/auth/login/?next=%2Ffollow%2F%3Fpage%3D2%26x%3Da+b"
        );
    }
}
