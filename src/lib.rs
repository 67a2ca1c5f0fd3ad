pub mod api;
pub mod db;
pub mod error;
pub mod folder_tree;
pub mod logging;
pub mod settings;
pub mod task_monitor;
pub mod upload_manager;

pub use api::auth::{CredentialPair, RefreshCoordinator, SessionStore};
pub use api::drive::{DriveCommand, FileEntry, FolderEntry};
pub use api::{ApiClient, ApiResponse, HttpTransport, RequestOptions, ReqwestTransport};
pub use error::{DriveError, DriveResult};
pub use folder_tree::{
    compute_disabled_targets, FolderNode, FolderTree, ItemKind, ItemRef, MoveTarget,
};
pub use logging::init_logging;
pub use settings::ClientConfig;
pub use task_monitor::{TaskEvent, TaskMonitor};
pub use upload_manager::{UploadEvent, UploadFile, UploadItem, UploadQueue, UploadStatus};
