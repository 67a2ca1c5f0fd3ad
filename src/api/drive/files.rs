use super::{
    encode_segment, parse_json, require_id,
    models::{DownloadResult, FileEntry, FilePreview},
};
use crate::api::{AbortHandle, ApiClient, FilePart, RequestOptions, TransferProgress};
use crate::error::{DriveError, DriveResult};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::mpsc::Sender,
};
use tracing::debug;

pub const UPLOAD_ENDPOINT: &str = "/files/upload";

/// 列出文件夹内的文件；`folder_id` 为空时列出根目录。
pub fn list_files(client: &ApiClient, folder_id: Option<&str>) -> DriveResult<Vec<FileEntry>> {
    let response = client.request(
        "/files",
        RequestOptions::get().query_opt("folder_id", folder_id),
    )?;
    parse_json(response)
}

/// 单文件 multipart 上传到指定文件夹（为空时上传到根目录）。
pub fn upload_file(
    client: &ApiClient,
    folder_id: Option<&str>,
    part: &FilePart,
    progress: &Sender<TransferProgress>,
    abort: &AbortHandle,
) -> DriveResult<FileEntry> {
    if part.file_name.trim().is_empty() {
        return Err(DriveError::Validation("file name cannot be empty".to_string()));
    }
    let options = RequestOptions::post().query_opt("folder_id", folder_id);
    let response = client.upload(UPLOAD_ENDPOINT, options, part, progress, abort)?;
    parse_json(response)
}

/// 下载文件并保存到目标目录。
/// - overwrite=false 时若同名文件存在，自动追加序号。
pub fn download_file(
    client: &ApiClient,
    file: &FileEntry,
    target_dir: &str,
    overwrite: bool,
) -> DriveResult<DownloadResult> {
    let file_id = require_id("file", &file.id)?;
    if target_dir.trim().is_empty() {
        return Err(DriveError::Validation("target directory is required".to_string()));
    }

    let response = client
        .request(
            &format!("/files/{}/download", encode_segment(file_id)),
            RequestOptions::get().header("Accept", "*/*"),
        )?
        .error_for_status()?;

    let file_name = sanitize_file_name(&file.name);
    let destination = prepare_destination(target_dir, &file_name, overwrite)?;
    fs::write(&destination, &response.body).map_err(|e| {
        DriveError::Storage(format!("failed to write {}: {e}", destination.display()))
    })?;
    debug!(
        bytes = response.body.len(),
        path = %destination.display(),
        "saved download"
    );

    Ok(DownloadResult {
        file_name,
        saved_path: destination.to_string_lossy().into_owned(),
        bytes_downloaded: response.body.len() as u64,
    })
}

pub fn preview_file(client: &ApiClient, file_id: &str) -> DriveResult<FilePreview> {
    let file_id = require_id("file", file_id)?;
    let response = client
        .request(
            &format!("/files/{}/preview", encode_segment(file_id)),
            RequestOptions::get().header("Accept", "*/*"),
        )?
        .error_for_status()?;
    Ok(FilePreview {
        content_type: response.header("Content-Type").map(str::to_string),
        bytes: response.body,
    })
}

pub fn search_files(client: &ApiClient, query: &str) -> DriveResult<Vec<FileEntry>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let response = client.request("/files/search", RequestOptions::get().query("q", query))?;
    parse_json(response)
}

pub fn list_binned_files(client: &ApiClient) -> DriveResult<Vec<FileEntry>> {
    let response = client.request("/files/bin", RequestOptions::get())?;
    parse_json(response)
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "download.bin".to_string()
    } else {
        cleaned
    }
}

fn prepare_destination(target_dir: &str, file_name: &str, overwrite: bool) -> DriveResult<PathBuf> {
    let dir = Path::new(target_dir);
    fs::create_dir_all(dir).map_err(|e| {
        DriveError::Storage(format!("failed to create directory {}: {e}", dir.display()))
    })?;
    let candidate = dir.join(file_name);
    if overwrite || !candidate.exists() {
        return Ok(candidate);
    }

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let extension = path.extension().and_then(|e| e.to_str());
    for index in 1..1000 {
        let name = match extension {
            Some(ext) => format!("{stem} ({index}).{ext}"),
            None => format!("{stem} ({index})"),
        };
        let next = dir.join(name);
        if !next.exists() {
            return Ok(next);
        }
    }
    Err(DriveError::Storage(format!(
        "could not find a free file name for {file_name}"
    )))
}
