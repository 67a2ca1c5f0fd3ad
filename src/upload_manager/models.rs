use crate::api::drive::FileEntry;
use crate::api::{AbortHandle, FilePart, FileSource};
use crate::db::Database;
use crate::error::{DriveError, DriveResult};
use crate::settings::{get_upload_limit, DEFAULT_UPLOAD_LIMIT_BYTES};
use std::{path::Path, sync::Arc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    Queued,
    Uploading,
    Complete,
    Error,
    Cancelled,
}

impl UploadStatus {
    /// 终态不会再迁移，只等待淘汰或清除。
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadStatus::Complete | UploadStatus::Error | UploadStatus::Cancelled
        )
    }
}

/// 待上传文件：名称、字节数与可重复打开的内容来源。
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub name: String,
    pub size: u64,
    pub source: FileSource,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, size: u64, source: FileSource) -> Self {
        Self {
            name: name.into(),
            size,
            source,
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Arc<[u8]> = Arc::from(bytes.into());
        Self::new(name, bytes.len() as u64, FileSource::Bytes(bytes))
    }

    /// 读取本地文件元数据，内容在传输时才打开。
    pub fn from_path(path: impl AsRef<Path>) -> DriveResult<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| DriveError::Storage(format!("failed to stat {}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(DriveError::Validation(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                DriveError::Validation(format!("{} has no file name", path.display()))
            })?;
        Ok(Self::new(name, metadata.len(), FileSource::Path(path.to_path_buf())))
    }

    pub(crate) fn to_part(&self) -> FilePart {
        FilePart::new(self.name.clone(), self.size, self.source.clone())
    }
}

#[derive(Clone, Debug)]
pub struct UploadItem {
    pub id: String,
    pub file: UploadFile,
    /// `None` 表示上传到根目录。
    pub folder_id: Option<String>,
    pub progress: u8,
    pub bytes_sent: u64,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub finished_at: Option<i64>,
    pub(crate) abort: Option<AbortHandle>,
}

impl UploadItem {
    pub fn file_name(&self) -> &str {
        &self.file.name
    }
}

#[derive(Clone, Debug)]
pub struct RejectedFile {
    pub file_name: String,
    pub error: DriveError,
}

/// 一次入队的结果：接受的条目 id 与被拒绝的文件。
#[derive(Clone, Debug, Default)]
pub struct EnqueueReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Clone, Debug)]
pub enum UploadEvent {
    ItemUpdated(UploadItem),
    ItemRemoved { id: String },
    Rejected { file_name: String, error: DriveError },
    /// 某个文件夹的内容因上传完成而变化，界面应刷新列表。
    UploadsChanged {
        folder_id: Option<String>,
        file: FileEntry,
    },
}

/// 入队校验策略。目前只限制单文件大小。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_file_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_UPLOAD_LIMIT_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn from_settings(database: &Database) -> DriveResult<Self> {
        Ok(Self {
            max_file_bytes: get_upload_limit(database)?,
        })
    }

    pub fn validate(&self, file: &UploadFile) -> DriveResult<()> {
        if file.name.trim().is_empty() {
            return Err(DriveError::Validation("file name is required".to_string()));
        }
        if file.size > self.max_file_bytes {
            return Err(DriveError::Validation(format!(
                "{} is too large ({} bytes, limit {} bytes)",
                file.name, file.size, self.max_file_bytes
            )));
        }
        Ok(())
    }
}
