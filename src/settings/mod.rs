pub mod api_origin;
pub mod upload_limit;

use crate::db::Database;
use crate::error::DriveResult;
use std::time::Duration;
use url::Url;

pub use api_origin::{
    clear_api_origin, resolve_api_origin, set_api_origin, API_ORIGIN_ENV, DEFAULT_API_ORIGIN,
};
pub use upload_limit::{
    get_upload_limit, set_upload_limit, DEFAULT_UPLOAD_LIMIT_BYTES, MAX_UPLOAD_LIMIT_BYTES,
    MIN_UPLOAD_LIMIT_BYTES,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// HTTP 客户端配置：API 源与两类超时。
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_origin: Url,
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_origin: &str) -> DriveResult<Self> {
        Ok(Self::with_origin(api_origin::parse_origin(api_origin)?))
    }

    fn with_origin(api_origin: Url) -> Self {
        Self {
            api_origin,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    /// 按环境变量、本地设置、默认值的顺序解析。
    pub fn resolve(database: Option<&Database>) -> DriveResult<Self> {
        Ok(Self::with_origin(resolve_api_origin(database)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalises_origin_and_uses_default_timeouts() {
        let config = ClientConfig::new("https://drive.example/api").expect("config");
        assert_eq!(config.api_origin.as_str(), "https://drive.example/api/");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.upload_timeout, Duration::from_secs(600));
    }

    #[test]
    fn resolve_uses_stored_origin_unless_env_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let database = Database::at(dir.path().join("settings.db"));
        set_api_origin(&database, "https://stored.example").expect("store origin");

        let env_origin = std::env::var(API_ORIGIN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let expected = match env_origin {
            Some(value) => api_origin::parse_origin(&value).expect("env origin"),
            None => Url::parse("https://stored.example/").expect("url"),
        };

        let config = ClientConfig::resolve(Some(&database)).expect("resolve");
        assert_eq!(config.api_origin, expected);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
