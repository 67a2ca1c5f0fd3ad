use serde::{Deserialize, Serialize};

/// 文件列表、搜索与回收站接口共用的文件摘要。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// 面包屑路径中的一段，从根到当前文件夹排列。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderPathSegment {
    pub id: String,
    pub name: String,
}

/// 服务端后台传输任务。人类可读字段由服务端格式化，客户端原样展示。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub transferred: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub transferred_human: String,
    #[serde(default)]
    pub total_human: String,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub can_cancel: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub url: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// 下载完成后的结果描述，便于提示保存路径与大小。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadResult {
    pub file_name: String,
    pub saved_path: String,
    pub bytes_downloaded: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePreview {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}
