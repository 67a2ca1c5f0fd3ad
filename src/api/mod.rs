pub mod auth;
pub mod client;
pub mod drive;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, RequestOptions};
pub use transport::{
    AbortHandle, ApiRequest, ApiResponse, FilePart, FileSource, HttpTransport, RequestBody,
    ReqwestTransport, TransferProgress,
};
