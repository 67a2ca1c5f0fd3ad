use super::auth::{RefreshCoordinator, SessionStore};
use super::transport::{
    AbortHandle, ApiRequest, ApiResponse, FilePart, HttpTransport, RequestBody, ReqwestTransport,
    TransferProgress,
};
use crate::error::{DriveError, DriveResult};
use crate::settings::ClientConfig;
use reqwest::Method;
use serde_json::Value;
use std::sync::{mpsc::Sender, Arc};
use tracing::{debug, warn};
use url::Url;

pub(crate) const REFRESH_ENDPOINT: &str = "/auth/refresh";
/// 认证类接口的 401 表示账号或令牌本身无效，不走刷新流程。
const AUTH_PREFIX: &str = "/auth/";

/// 单次调用的选项：方法、查询参数、附加请求头与请求体。
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::with_method(Method::GET)
    }
}

impl RequestOptions {
    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get() -> Self {
        Self::with_method(Method::GET)
    }

    pub fn post() -> Self {
        Self::with_method(Method::POST)
    }

    pub fn patch() -> Self {
        Self::with_method(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::with_method(Method::DELETE)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// 值为 `None` 时不附加该参数。
    pub fn query_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

/// 带认证的请求客户端：附加 Bearer 令牌，遇到 401 时经刷新协调器刷新后重放一次。
#[derive(Clone)]
pub struct ApiClient {
    origin: Url,
    transport: Arc<dyn HttpTransport>,
    session: SessionStore,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: SessionStore) -> DriveResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(config)?);
        Ok(Self::with_transport(
            config.api_origin.clone(),
            transport,
            session,
        ))
    }

    pub fn with_transport(
        origin: Url,
        transport: Arc<dyn HttpTransport>,
        session: SessionStore,
    ) -> Self {
        let refresher = RefreshCoordinator::new(&origin, transport.clone(), session.clone());
        Self {
            origin,
            transport,
            session,
            refresher,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// 发起一次 API 调用。网络错误原样返回；非 2xx 响应也原样返回，由调用方解释。
    /// 刷新失败时清空会话并返回 `DriveError::SessionExpired`。
    pub fn request(&self, endpoint: &str, options: RequestOptions) -> DriveResult<ApiResponse> {
        let request = self.build_request(endpoint, &options)?;
        self.run_authorized(endpoint, request, |request| self.transport.send(request))
    }

    /// 上传变体：同样的认证与重放流程，进度写入 `progress`，中止后返回 `Cancelled`。
    pub fn upload(
        &self,
        endpoint: &str,
        options: RequestOptions,
        part: &FilePart,
        progress: &Sender<TransferProgress>,
        abort: &AbortHandle,
    ) -> DriveResult<ApiResponse> {
        let request = self.build_request(endpoint, &options)?;
        let response = self.run_authorized(endpoint, request, |request| {
            if abort.is_aborted() {
                return Err(DriveError::Cancelled);
            }
            self.transport
                .send_multipart(request, part, progress, abort)
        })?;
        if abort.is_aborted() {
            return Err(DriveError::Cancelled);
        }
        Ok(response)
    }

    pub fn endpoint_url(&self, endpoint: &str, query: &[(String, String)]) -> DriveResult<String> {
        let mut url = self
            .origin
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| DriveError::Config(format!("invalid endpoint {endpoint:?}: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.into())
    }

    fn build_request(&self, endpoint: &str, options: &RequestOptions) -> DriveResult<ApiRequest> {
        let url = self.endpoint_url(endpoint, &options.query)?;
        let mut headers = options.headers.clone();
        if !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("accept"))
        {
            headers.push(("Accept".to_string(), "application/json".to_string()));
        }
        Ok(ApiRequest {
            method: options.method.clone(),
            url,
            headers,
            body: options.body.clone(),
        })
    }

    fn run_authorized<F>(
        &self,
        endpoint: &str,
        mut request: ApiRequest,
        send: F,
    ) -> DriveResult<ApiResponse>
    where
        F: Fn(&ApiRequest) -> DriveResult<ApiResponse>,
    {
        let used_access = self.attach_credentials(&mut request);
        let response = send(&request)?;
        if !response.is_unauthorized() || is_refresh_exempt(endpoint) {
            return Ok(response);
        }
        let Some(used_access) = used_access else {
            return Ok(response);
        };
        match self.session.credentials() {
            // 发出时带着凭据，返回时会话已被失败的刷新或登出清空。
            None => return Err(DriveError::SessionExpired),
            Some(current) if current.refresh.is_none() && current.access == used_access => {
                return Ok(response);
            }
            Some(_) => {}
        }

        debug!(endpoint, "request unauthorized; refreshing credentials");
        if !self.refresher.refresh_after(Some(&used_access)) {
            // 只清除产生 401 的那组凭据；刷新期间重新登录得到的凭据保留并用于重放。
            let cleared = self.session.clear_if_access(&used_access);
            if cleared || !self.session.is_authenticated() {
                warn!(endpoint, "credential refresh failed; session cleared");
                return Err(DriveError::SessionExpired);
            }
            debug!(endpoint, "session replaced during refresh; replaying with new credentials");
        }

        // 只重放一次：重放后的 401 原样交给调用方。
        self.attach_credentials(&mut request);
        send(&request)
    }

    fn attach_credentials(&self, request: &mut ApiRequest) -> Option<String> {
        request.remove_header("Authorization");
        let access = self.session.access_token();
        if let Some(token) = &access {
            request
                .headers
                .push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        access
    }
}

fn is_refresh_exempt(endpoint: &str) -> bool {
    let path = format!("/{}", endpoint.trim_start_matches('/'));
    path == REFRESH_ENDPOINT || path.starts_with(AUTH_PREFIX)
}
