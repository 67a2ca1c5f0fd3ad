use super::auth::TokenResponse;
use super::session::{CredentialPair, SessionStore};
use crate::api::client::REFRESH_ENDPOINT;
use crate::api::transport::{ApiRequest, HttpTransport, RequestBody};
use crate::error::{DriveError, DriveResult};
use crate::upload_manager::core::recover_lock;
use reqwest::Method;
use serde_json::json;
use std::sync::{Arc, Condvar, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// 刷新协调器：把并发的刷新请求合并为一次网络调用（single-flight）。
/// 刷新进行中到达的调用方全部等待同一个结果。
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

struct RefreshInner {
    refresh_url: String,
    transport: Arc<dyn HttpTransport>,
    session: SessionStore,
    state: Mutex<FlightState>,
    settled: Condvar,
}

#[derive(Default)]
struct FlightState {
    refreshing: bool,
    completed_flights: u64,
    last_outcome: bool,
}

impl RefreshCoordinator {
    pub fn new(origin: &Url, transport: Arc<dyn HttpTransport>, session: SessionStore) -> Self {
        let refresh_url = origin
            .join(REFRESH_ENDPOINT.trim_start_matches('/'))
            .map(String::from)
            .unwrap_or_else(|_| format!("{origin}{}", REFRESH_ENDPOINT.trim_start_matches('/')));
        Self {
            inner: Arc::new(RefreshInner {
                refresh_url,
                transport,
                session,
                state: Mutex::new(FlightState::default()),
                settled: Condvar::new(),
            }),
        }
    }

    pub fn refresh(&self) -> bool {
        self.refresh_after(None)
    }

    /// `stale_access` 为产生 401 时使用的访问令牌；若它已被替换，说明别的调用方刚刚
    /// 刷新过，直接报告成功而不再发起网络请求。
    pub fn refresh_after(&self, stale_access: Option<&str>) -> bool {
        let mut state = recover_lock(&self.inner.state);
        if state.refreshing {
            let flight = state.completed_flights;
            while state.refreshing && state.completed_flights == flight {
                state = self
                    .inner
                    .settled
                    .wait(state)
                    .unwrap_or_else(|p| p.into_inner());
            }
            debug!(outcome = state.last_outcome, "joined in-flight credential refresh");
            return state.last_outcome;
        }

        if let (Some(stale), Some(current)) = (stale_access, self.inner.session.access_token()) {
            if stale != current {
                debug!("access token already rotated; skipping refresh");
                return true;
            }
        }

        let Some(refresh_token) = self.inner.session.refresh_token() else {
            return false;
        };
        state.refreshing = true;
        drop(state);

        let mut flight = FlightGuard {
            inner: &self.inner,
            outcome: false,
        };
        info!("refreshing access token");
        match self.exchange(&refresh_token) {
            Ok(credentials) => {
                flight.outcome = self.inner.session.rotate(&refresh_token, credentials);
                if !flight.outcome {
                    warn!("session changed during refresh; discarding new credentials");
                }
            }
            Err(err) => warn!(error = %err, "credential refresh failed"),
        }
        flight.outcome
    }

    pub fn is_refreshing(&self) -> bool {
        recover_lock(&self.inner.state).refreshing
    }

    fn exchange(&self, refresh_token: &str) -> DriveResult<CredentialPair> {
        let request = ApiRequest {
            method: Method::POST,
            url: self.inner.refresh_url.clone(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            body: RequestBody::Json(json!({ "refresh_token": refresh_token })),
        };
        let response = self.inner.transport.send(&request)?.error_for_status()?;
        let payload: TokenResponse = response.json()?;
        if payload.access_token.trim().is_empty() {
            return Err(DriveError::Decode(
                "missing access_token in refresh response".to_string(),
            ));
        }
        Ok(CredentialPair {
            access: payload.access_token,
            refresh: payload
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
        })
    }
}

/// 无论成功、失败还是 panic，都把状态还原为 Idle 并唤醒等待者。
struct FlightGuard<'a> {
    inner: &'a RefreshInner,
    outcome: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = recover_lock(&self.inner.state);
        state.refreshing = false;
        state.completed_flights = state.completed_flights.wrapping_add(1);
        state.last_outcome = self.outcome;
        drop(state);
        self.inner.settled.notify_all();
    }
}
