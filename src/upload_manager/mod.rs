pub mod core;
pub mod models;

pub use self::core::{UploadQueue, EVICTION_DELAY};
pub use models::{
    EnqueueReport, RejectedFile, UploadEvent, UploadFile, UploadItem, UploadPolicy, UploadStatus,
};
