use crate::db::Database;
use crate::error::{DriveError, DriveResult};

const UPLOAD_LIMIT_KEY: &str = "max_upload_bytes";
pub const MIN_UPLOAD_LIMIT_BYTES: u64 = 1024 * 1024;
pub const MAX_UPLOAD_LIMIT_BYTES: u64 = 5 * 1024 * 1024 * 1024;
/// 单文件上传上限，默认 1 GiB。
pub const DEFAULT_UPLOAD_LIMIT_BYTES: u64 = 1024 * 1024 * 1024;

/// 从设置表读取单文件上限；缺失时返回默认值，错误时透传。
pub fn get_upload_limit(database: &Database) -> DriveResult<u64> {
    if let Some(value) = database.get_setting(UPLOAD_LIMIT_KEY)? {
        return parse_and_clamp(&value);
    }
    Ok(DEFAULT_UPLOAD_LIMIT_BYTES)
}

/// 写入并校验单文件上限，限定在 [MIN, MAX] 区间。
pub fn set_upload_limit(database: &Database, value: u64) -> DriveResult<u64> {
    if !(MIN_UPLOAD_LIMIT_BYTES..=MAX_UPLOAD_LIMIT_BYTES).contains(&value) {
        return Err(DriveError::Validation(format!(
            "upload limit must be between {} and {} bytes",
            MIN_UPLOAD_LIMIT_BYTES, MAX_UPLOAD_LIMIT_BYTES
        )));
    }
    database.set_setting(UPLOAD_LIMIT_KEY, &value.to_string())?;
    Ok(value)
}

fn parse_and_clamp(raw: &str) -> DriveResult<u64> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| DriveError::Config(format!("invalid upload limit value: {e}")))?;
    Ok(parsed.clamp(MIN_UPLOAD_LIMIT_BYTES, MAX_UPLOAD_LIMIT_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_is_one_gib() {
        let dir = tempfile::tempdir().expect("tempdir");
        let database = Database::at(dir.path().join("limit.db"));
        assert_eq!(get_upload_limit(&database).expect("get"), 1 << 30);
    }

    #[test]
    fn set_rejects_out_of_range_and_get_clamps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let database = Database::at(dir.path().join("limit.db"));

        assert!(set_upload_limit(&database, 10).is_err());
        assert_eq!(
            set_upload_limit(&database, 2 * MIN_UPLOAD_LIMIT_BYTES).expect("set"),
            2 * MIN_UPLOAD_LIMIT_BYTES
        );
        assert_eq!(
            get_upload_limit(&database).expect("get"),
            2 * MIN_UPLOAD_LIMIT_BYTES
        );

        database
            .set_setting("max_upload_bytes", "99999999999999")
            .expect("raw set");
        assert_eq!(
            get_upload_limit(&database).expect("get"),
            MAX_UPLOAD_LIMIT_BYTES
        );
    }
}
