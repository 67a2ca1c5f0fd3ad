mod commands;
mod files;
mod folders;
mod models;
mod share;
mod tasks;

pub use commands::{execute, execute_batch, move_items, BatchOutcome, DriveCommand};
pub use files::{
    download_file, list_binned_files, list_files, preview_file, search_files, upload_file,
    UPLOAD_ENDPOINT,
};
pub use folders::{
    create_folder, fetch_folder_tree, folder_path, list_binned_folders, list_folders,
};
pub use models::{
    DownloadResult, FileEntry, FilePreview, FolderEntry, FolderPathSegment, ShareLink, TaskRecord,
};
pub use share::create_share_link;
pub use tasks::{cancel_task, list_user_tasks};

use crate::api::ApiResponse;
use crate::error::{DriveError, DriveResult};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;

/// 路径段编码：保留 id 中常见的 `-`、`_`、`.`。
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

pub(crate) fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

pub(crate) fn require_id<'a>(what: &str, id: &'a str) -> DriveResult<&'a str> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(DriveError::Validation(format!("{what} id is required")));
    }
    Ok(trimmed)
}

/// 非 2xx 转为错误，成功时解析 JSON。
pub(crate) fn parse_json<T: DeserializeOwned>(response: ApiResponse) -> DriveResult<T> {
    response.error_for_status()?.json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_keep_id_punctuation_and_escape_the_rest() {
        assert_eq!(encode_segment("3f2a-b_c.d"), "3f2a-b_c.d");
        assert_eq!(encode_segment("a/b c"), "a%2Fb%20c");
    }
}
