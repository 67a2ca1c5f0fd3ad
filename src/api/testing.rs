//! 测试用的内存传输层：按方法与路径分发到脚本化处理函数，并记录每次调用。

use super::auth::SessionStore;
use super::client::ApiClient;
use super::transport::{
    AbortHandle, ApiRequest, ApiResponse, FilePart, HttpTransport, RequestBody, TransferProgress,
};
use crate::error::{DriveError, DriveResult};
use reqwest::Method;
use serde_json::Value;
use std::io::Read;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc::Sender,
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

type Handler = Arc<dyn Fn(&ApiRequest) -> DriveResult<ApiResponse> + Send + Sync>;

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub bearer: Option<String>,
    pub accept: Option<String>,
    pub body: RequestBody,
    pub multipart: bool,
}

#[derive(Clone, Copy, Debug)]
struct UploadPacing {
    chunk_size: usize,
    delay: Duration,
}

pub(crate) struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
    pacing: Mutex<UploadPacing>,
    uploads_in_flight: AtomicUsize,
    max_uploads_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            pacing: Mutex::new(UploadPacing {
                chunk_size: 64 * 1024,
                delay: Duration::ZERO,
            }),
            uploads_in_flight: AtomicUsize::new(0),
            max_uploads_in_flight: AtomicUsize::new(0),
        })
    }

    /// 注册处理函数；同一方法与路径后注册的覆盖先注册的。
    pub fn on<F>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(&ApiRequest) -> DriveResult<ApiResponse> + Send + Sync + 'static,
    {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|route| !(route.method == method && route.path == path));
        routes.push(Route {
            method,
            path: path.to_string(),
            handler: Arc::new(handler),
        });
    }

    /// 模拟上传时每块的大小与块间延迟。
    pub fn set_upload_pacing(&self, chunk_size: usize, delay: Duration) {
        *self.pacing.lock().unwrap() = UploadPacing {
            chunk_size: chunk_size.max(1),
            delay,
        };
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| &call.method == method && call.path == path)
            .count()
    }

    pub fn max_concurrent_uploads(&self) -> usize {
        self.max_uploads_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, request: &ApiRequest, multipart: bool) {
        let url = Url::parse(&request.url).expect("fake transport received invalid url");
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method.clone(),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
            bearer: request.bearer_token().map(str::to_string),
            accept: request.header("Accept").map(str::to_string),
            body: request.body.clone(),
            multipart,
        });
    }

    fn dispatch(&self, request: &ApiRequest) -> DriveResult<ApiResponse> {
        let path = Url::parse(&request.url)
            .map(|url| url.path().to_string())
            .unwrap_or_default();
        let handler = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|route| route.method == request.method && route.path == path)
            .map(|route| route.handler.clone());
        match handler {
            Some(handler) => handler(request),
            None => Ok(ApiResponse::new(404, r#"{"detail":"Not Found"}"#)),
        }
    }

    fn simulate_upload(
        &self,
        part: &FilePart,
        progress: &Sender<TransferProgress>,
        abort: &AbortHandle,
    ) -> DriveResult<()> {
        let pacing = *self.pacing.lock().unwrap();
        let mut reader = part
            .source
            .open()
            .map_err(|e| DriveError::Network(format!("failed to open upload source: {e}")))?;
        let mut buf = vec![0u8; pacing.chunk_size];
        let mut sent = 0u64;
        loop {
            if abort.is_aborted() {
                return Err(DriveError::Cancelled);
            }
            let read = reader
                .read(&mut buf)
                .map_err(|e| DriveError::Network(format!("failed to read upload source: {e}")))?;
            if read == 0 {
                return Ok(());
            }
            sent += read as u64;
            let _ = progress.send(TransferProgress {
                bytes_sent: sent,
                total_bytes: part.size,
            });
            if !pacing.delay.is_zero() {
                thread::sleep(pacing.delay);
            }
        }
    }
}

impl HttpTransport for FakeTransport {
    fn send(&self, request: &ApiRequest) -> DriveResult<ApiResponse> {
        self.record(request, false);
        self.dispatch(request)
    }

    fn send_multipart(
        &self,
        request: &ApiRequest,
        part: &FilePart,
        progress: &Sender<TransferProgress>,
        abort: &AbortHandle,
    ) -> DriveResult<ApiResponse> {
        self.record(request, true);
        let current = self.uploads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_uploads_in_flight
            .fetch_max(current, Ordering::SeqCst);
        let result = self
            .simulate_upload(part, progress, abort)
            .and_then(|_| self.dispatch(request));
        self.uploads_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub(crate) fn test_origin() -> Url {
    Url::parse("http://fake.test/").unwrap()
}

pub(crate) fn test_client(transport: &Arc<FakeTransport>, session: SessionStore) -> ApiClient {
    ApiClient::with_transport(test_origin(), transport.clone(), session)
}

pub(crate) fn json_response(status: u16, value: Value) -> ApiResponse {
    ApiResponse::new(status, value.to_string()).with_header("Content-Type", "application/json")
}

/// 轮询直到条件成立或超时。
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
