use crate::error::{DriveError, DriveResult};
use crate::settings::ClientConfig;
use reqwest::{
    blocking::{multipart, Client, RequestBuilder},
    redirect::Policy,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::{
    fs::File,
    io::{self, Cursor, Read},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc,
    },
    time::Duration,
};

/// 请求体：除文件上传外，API 只接受 JSON。
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
}

/// 完整构造好的一次 HTTP 请求，可原样重放。
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.header("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    pub(crate) fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }
}

/// 已读完响应体的 HTTP 响应。本层不解释响应内容，由调用方决定如何处理状态码。
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<Value>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> DriveResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            DriveError::Decode(format!("failed to parse HTTP {} response: {e}", self.status))
        })
    }

    /// 失败响应中给用户看的说明：`detail` 字段为字符串或 `{msg}` 列表，否则退回原文。
    pub fn detail(&self) -> String {
        if let Some(detail) = extract_detail(&self.body) {
            return detail;
        }
        let text = self.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            trimmed.to_string()
        }
    }

    /// 非 2xx 转为错误：401 为 `Unauthorized`，其余为 `Server`。
    pub fn error_for_status(self) -> DriveResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let detail = self.detail();
        if self.is_unauthorized() {
            return Err(DriveError::Unauthorized(detail));
        }
        Err(DriveError::Server {
            status: self.status,
            detail,
        })
    }
}

fn extract_detail(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    match parsed.detail? {
        Value::String(message) => Some(message),
        Value::Array(entries) => {
            let messages: Vec<&str> = entries
                .iter()
                .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// 上传内容的来源：内存字节或本地文件，可多次打开以便 401 后重放。
#[derive(Clone, Debug)]
pub enum FileSource {
    Bytes(Arc<[u8]>),
    Path(PathBuf),
}

impl FileSource {
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            FileSource::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            FileSource::Path(path) => Ok(Box::new(File::open(path)?)),
        }
    }
}

/// multipart 请求中的单个文件字段。
#[derive(Clone, Debug)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub size: u64,
    pub source: FileSource,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, size: u64, source: FileSource) -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            size,
            source,
        }
    }
}

/// 传输层确认的字节进度。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let percent = self.bytes_sent.saturating_mul(100) / self.total_bytes;
        percent.min(100) as u8
    }
}

/// 上传中止句柄：置位后请求体读取端在下一块数据前失败。
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// HTTP 传输接缝：生产实现基于阻塞 reqwest，测试中替换为内存实现。
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> DriveResult<ApiResponse>;

    /// 单文件 multipart 上传；进度写入 `progress`，被中止时返回 `DriveError::Cancelled`。
    fn send_multipart(
        &self,
        request: &ApiRequest,
        part: &FilePart,
        progress: &Sender<TransferProgress>,
        abort: &AbortHandle,
    ) -> DriveResult<ApiResponse>;
}

pub struct ReqwestTransport {
    client: Client,
    upload_client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> DriveResult<Self> {
        Ok(Self {
            client: build_blocking_client(config.request_timeout)?,
            upload_client: build_blocking_client(config.upload_timeout)?,
        })
    }
}

/// 构建一个带有统一超时与重定向策略的阻塞式 HTTP 客户端。
fn build_blocking_client(timeout: Duration) -> DriveResult<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(Policy::limited(10))
        .build()
        .map_err(|e| DriveError::Network(format!("failed to build HTTP client: {e}")))
}

fn apply_headers(mut builder: RequestBuilder, headers: &[(String, String)]) -> RequestBuilder {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn read_response(response: reqwest::blocking::Response) -> DriveResult<ApiResponse> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response
        .bytes()
        .map_err(|e| DriveError::Network(format!("failed to read response body: {e}")))?
        .to_vec();
    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &ApiRequest) -> DriveResult<ApiResponse> {
        let builder = apply_headers(
            self.client.request(request.method.clone(), &request.url),
            &request.headers,
        );
        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
        };
        let response = builder.send().map_err(|e| {
            DriveError::Network(format!("{} {} failed: {e}", request.method, request.url))
        })?;
        read_response(response)
    }

    fn send_multipart(
        &self,
        request: &ApiRequest,
        part: &FilePart,
        progress: &Sender<TransferProgress>,
        abort: &AbortHandle,
    ) -> DriveResult<ApiResponse> {
        let source = part.source.open().map_err(|e| {
            DriveError::Validation(format!("failed to open {}: {e}", part.file_name))
        })?;
        let reader = ProgressReader::new(source, part.size, abort.clone(), progress.clone());
        let file = multipart::Part::reader_with_length(reader, part.size)
            .file_name(part.file_name.clone());
        let form = multipart::Form::new().part(part.field_name.clone(), file);

        let builder = apply_headers(
            self.upload_client
                .request(request.method.clone(), &request.url),
            &request.headers,
        );
        match builder.multipart(form).send() {
            Ok(response) => read_response(response),
            Err(_) if abort.is_aborted() => Err(DriveError::Cancelled),
            Err(e) => Err(DriveError::Network(format!(
                "failed to upload {}: {e}",
                part.file_name
            ))),
        }
    }
}

/// 负责对上传请求体做进度上报与中止检测的 Reader。
struct ProgressReader {
    inner: Box<dyn Read + Send>,
    sent: u64,
    total: u64,
    abort: AbortHandle,
    progress: Sender<TransferProgress>,
}

impl ProgressReader {
    fn new(
        inner: Box<dyn Read + Send>,
        total: u64,
        abort: AbortHandle,
        progress: Sender<TransferProgress>,
    ) -> Self {
        Self {
            inner,
            sent: 0,
            total,
            abort,
            progress,
        }
    }
}

impl Read for ProgressReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // 不能用 Interrupted：读取方会把它当作可重试错误。
        if self.abort.is_aborted() {
            return Err(io::Error::new(io::ErrorKind::Other, "upload aborted"));
        }
        let read_bytes = self.inner.read(buf)?;
        if read_bytes > 0 {
            self.sent = self.sent.saturating_add(read_bytes as u64);
            let _ = self.progress.send(TransferProgress {
                bytes_sent: self.sent,
                total_bytes: self.total,
            });
        }
        Ok(read_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn detail_prefers_string_then_msg_list_then_text() {
        let plain = ApiResponse::new(400, r#"{"detail":"name taken"}"#);
        assert_eq!(plain.detail(), "name taken");

        let listed = ApiResponse::new(
            422,
            r#"{"detail":[{"msg":"field required"},{"msg":"too short"}]}"#,
        );
        assert_eq!(listed.detail(), "field required; too short");

        let raw = ApiResponse::new(502, "bad gateway");
        assert_eq!(raw.detail(), "bad gateway");

        let empty = ApiResponse::new(500, "");
        assert_eq!(empty.detail(), "HTTP 500");
    }

    #[test]
    fn error_for_status_maps_unauthorized_and_server_errors() {
        assert!(ApiResponse::new(204, "").error_for_status().is_ok());
        assert_eq!(
            ApiResponse::new(401, r#"{"detail":"token expired"}"#)
                .error_for_status()
                .unwrap_err(),
            DriveError::Unauthorized("token expired".into())
        );
        assert_eq!(
            ApiResponse::new(404, r#"{"detail":"missing"}"#)
                .error_for_status()
                .unwrap_err(),
            DriveError::Server {
                status: 404,
                detail: "missing".into()
            }
        );
    }

    #[test]
    fn progress_percent_is_clamped() {
        let half = TransferProgress {
            bytes_sent: 50,
            total_bytes: 100,
        };
        assert_eq!(half.percent(), 50);
        let over = TransferProgress {
            bytes_sent: 150,
            total_bytes: 100,
        };
        assert_eq!(over.percent(), 100);
        let empty = TransferProgress {
            bytes_sent: 0,
            total_bytes: 0,
        };
        assert_eq!(empty.percent(), 100);
    }

    #[test]
    fn progress_reader_reports_bytes_and_stops_on_abort() {
        let (tx, rx) = mpsc::channel();
        let abort = AbortHandle::new();
        let source = FileSource::Bytes(Arc::from(vec![7u8; 10]));
        let mut reader = ProgressReader::new(source.open().expect("open"), 10, abort.clone(), tx);

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).expect("read"), 4);
        assert_eq!(
            rx.try_recv().expect("progress"),
            TransferProgress {
                bytes_sent: 4,
                total_bytes: 10
            }
        );

        abort.abort();
        assert!(reader.read(&mut buf).is_err());
        assert!(rx.try_recv().is_err());
    }
}
