use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(300).unwrap();

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub posts_per_page: u64,
    /// Minimum post length, in characters.
    pub post_min_length: usize,
    pub index_cache_ttl: Duration,
    /// Most index pages kept at once.
    pub index_cache_capacity: NonZeroUsize,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://yatube.db?mode=rwc".to_string(),
            listen_addr: "0.0.0.0:3000".to_string(),
            posts_per_page: 10,
            post_min_length: 100,
            index_cache_ttl: Duration::from_secs(20),
            index_cache_capacity: DEFAULT_CACHE_CAPACITY,
            jwt_secret: "yatube-dev-secret".to_string(),
            jwt_ttl_secs: 86400,
        }
    }
}

impl Config {
    /// Defaults overlaid with environment variables. Call `dotenvy::dotenv()` first
    /// to pick up a `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            posts_per_page: parse_var("POSTS_PER_PAGE", defaults.posts_per_page)?.max(1),
            post_min_length: parse_var("POST_MIN_LENGTH", defaults.post_min_length)?,
            index_cache_ttl: Duration::from_secs(parse_var(
                "INDEX_CACHE_TTL_SECS",
                defaults.index_cache_ttl.as_secs(),
            )?),
            index_cache_capacity: parse_var("INDEX_CACHE_CAPACITY", defaults.index_cache_capacity)?,
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_ttl_secs: parse_var("JWT_TTL_SECS", defaults.jwt_ttl_secs)?,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_site_settings() {
        let config = Config::default();
        assert_eq!(config.posts_per_page, 10);
        assert_eq!(config.post_min_length, 100);
        assert_eq!(config.index_cache_ttl, Duration::from_secs(20));
        assert_eq!(config.index_cache_capacity.get(), 300);
    }

    #[test]
    fn unset_variable_falls_back() {
        let value: u64 = parse_var("YATUBE_TEST_SURELY_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!("0".parse::<NonZeroUsize>().is_err());
        assert_eq!("12".parse::<NonZeroUsize>().unwrap().get(), 12);
    }
}
