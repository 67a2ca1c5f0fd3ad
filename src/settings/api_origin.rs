use crate::db::Database;
use crate::error::{DriveError, DriveResult};
use once_cell::sync::Lazy;
use url::Url;

pub const API_ORIGIN_ENV: &str = "CLOUDBOX_API_ORIGIN";
const API_ORIGIN_KEY: &str = "api_origin";
pub const DEFAULT_API_ORIGIN: &str = "http://localhost:8000";

/// 进程启动时读取一次环境变量。
static ENV_API_ORIGIN: Lazy<Option<String>> = Lazy::new(|| {
    std::env::var(API_ORIGIN_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
});

/// 解析 API 源：环境变量 > 本地设置 > 默认值。
pub fn resolve_api_origin(database: Option<&Database>) -> DriveResult<Url> {
    let stored = match database {
        Some(db) => db.get_setting(API_ORIGIN_KEY)?,
        None => None,
    };
    pick_origin(ENV_API_ORIGIN.clone(), stored)
}

pub fn set_api_origin(database: &Database, origin: &str) -> DriveResult<Url> {
    let parsed = parse_origin(origin)?;
    database.set_setting(API_ORIGIN_KEY, parsed.as_str())?;
    Ok(parsed)
}

pub fn clear_api_origin(database: &Database) -> DriveResult<()> {
    database.remove_setting(API_ORIGIN_KEY)
}

fn pick_origin(env_value: Option<String>, stored: Option<String>) -> DriveResult<Url> {
    let raw = env_value
        .or(stored)
        .unwrap_or_else(|| DEFAULT_API_ORIGIN.to_string());
    parse_origin(&raw)
}

/// 校验并规范化为以 `/` 结尾的 http(s) 地址，保证 `Url::join` 追加而不是替换末段。
pub(crate) fn parse_origin(raw: &str) -> DriveResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DriveError::Config("api origin cannot be empty".to_string()));
    }
    let mut url = Url::parse(trimmed)
        .map_err(|e| DriveError::Config(format!("invalid api origin {trimmed:?}: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(DriveError::Config(format!(
            "api origin must use http or https, got {}",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_value_wins_over_stored_value() {
        let url = pick_origin(
            Some("https://env.example".into()),
            Some("https://stored.example".into()),
        )
        .expect("origin");
        assert_eq!(url.as_str(), "https://env.example/");
    }

    #[test]
    fn falls_back_to_stored_then_default() {
        let stored = pick_origin(None, Some("https://stored.example/api".into())).expect("origin");
        assert_eq!(stored.as_str(), "https://stored.example/api/");

        let default = pick_origin(None, None).expect("origin");
        assert_eq!(default.as_str(), "http://localhost:8000/");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            parse_origin("ftp://files.example"),
            Err(DriveError::Config(_))
        ));
        assert!(matches!(parse_origin("   "), Err(DriveError::Config(_))));
    }

    #[test]
    fn persisted_origin_is_normalised() {
        let dir = tempfile::tempdir().expect("tempdir");
        let database = Database::at(dir.path().join("settings.db"));
        let saved = set_api_origin(&database, "https://drive.example/v1").expect("set");
        assert_eq!(saved.as_str(), "https://drive.example/v1/");
        assert_eq!(
            database.get_setting("api_origin").expect("get").as_deref(),
            Some("https://drive.example/v1/")
        );
        clear_api_origin(&database).expect("clear");
        assert_eq!(database.get_setting("api_origin").expect("get"), None);
    }
}
