use super::{
    encode_segment, parse_json, require_id,
    models::{FolderEntry, FolderPathSegment},
};
use crate::api::{ApiClient, RequestOptions};
use crate::error::{DriveError, DriveResult};
use crate::folder_tree::{FolderNode, FolderTree};
use serde_json::json;

/// 列出指定文件夹下的子文件夹；`parent_id` 为空时列出根目录。
pub fn list_folders(client: &ApiClient, parent_id: Option<&str>) -> DriveResult<Vec<FolderEntry>> {
    let response = client.request(
        "/folders",
        RequestOptions::get().query_opt("parent_id", parent_id),
    )?;
    parse_json(response)
}

pub fn create_folder(
    client: &ApiClient,
    name: &str,
    parent_id: Option<&str>,
) -> DriveResult<FolderEntry> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DriveError::Validation("folder name is required".to_string()));
    }
    let response = client.request(
        "/folders",
        RequestOptions::post().json(json!({ "name": name, "parent_id": parent_id })),
    )?;
    parse_json(response)
}

/// 从根到该文件夹的面包屑路径。
pub fn folder_path(client: &ApiClient, folder_id: &str) -> DriveResult<Vec<FolderPathSegment>> {
    let folder_id = require_id("folder", folder_id)?;
    let response = client.request(
        &format!("/folders/{}/path", encode_segment(folder_id)),
        RequestOptions::get(),
    )?;
    parse_json(response)
}

/// 拉取完整文件夹树快照，供移动目标或上传目标选择使用。
pub fn fetch_folder_tree(client: &ApiClient) -> DriveResult<FolderTree> {
    let response = client.request("/folders/tree", RequestOptions::get())?;
    let roots: Vec<FolderNode> = parse_json(response)?;
    Ok(FolderTree::new(roots))
}

pub fn list_binned_folders(client: &ApiClient) -> DriveResult<Vec<FolderEntry>> {
    let response = client.request("/folders/bin", RequestOptions::get())?;
    parse_json(response)
}
