use crate::db::{AuthTokenRecord, Database};
use crate::upload_manager::core::recover_lock;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// 访问令牌与刷新令牌，两者总是作为一个整体被替换。
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: Option<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: access.into(),
            refresh,
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &self.refresh.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// 凭据持久化接口，方便替换存储实现或编写单测。
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<CredentialPair>;
    fn save(&self, credentials: &CredentialPair);
    fn clear(&self);
}

/// 默认的 SQLite 实现。
pub struct SqliteCredentialStore {
    database: Database,
}

impl SqliteCredentialStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn load(&self) -> Option<CredentialPair> {
        match self.database.load_auth_record() {
            Ok(record) => record.map(|r| CredentialPair::new(r.access_token, r.refresh_token)),
            Err(err) => {
                warn!(error = %err, "failed to load persisted credentials");
                None
            }
        }
    }

    fn save(&self, credentials: &CredentialPair) {
        let record = AuthTokenRecord::new(credentials.access.clone(), credentials.refresh.clone());
        if let Err(err) = self.database.upsert_auth_record(&record) {
            warn!(error = %err, "failed to persist credentials");
        }
    }

    fn clear(&self) {
        if let Err(err) = self.database.clear_auth_record() {
            warn!(error = %err, "failed to clear persisted credentials");
        }
    }
}

/// 仅驻留内存的实现。
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<CredentialPair>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<CredentialPair> {
        recover_lock(&self.slot).clone()
    }

    fn save(&self, credentials: &CredentialPair) {
        *recover_lock(&self.slot) = Some(credentials.clone());
    }

    fn clear(&self) {
        *recover_lock(&self.slot) = None;
    }
}

/// 会话存储：登录到登出期间持有当前凭据对。
/// 只有登录、刷新协调器与登出会写入，其余组件只读。
#[derive(Clone, Default)]
pub struct SessionStore {
    credentials: Arc<Mutex<Option<CredentialPair>>>,
    store: Option<Arc<dyn CredentialStore>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定持久化后端，并恢复上次保存的凭据。
    pub fn with_store(store: Arc<dyn CredentialStore>) -> Self {
        let restored = store.load();
        Self {
            credentials: Arc::new(Mutex::new(restored)),
            store: Some(store),
        }
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().as_ref().map(|pair| pair.access.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().as_ref().and_then(|pair| pair.refresh.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    pub fn login(&self, credentials: CredentialPair) {
        let mut slot = self.lock();
        if let Some(store) = &self.store {
            store.save(&credentials);
        }
        *slot = Some(credentials);
    }

    /// 刷新成功后整体替换凭据对；若期间已登出或被他人轮换（刷新令牌不再匹配）则放弃。
    pub(crate) fn rotate(&self, expected_refresh: &str, credentials: CredentialPair) -> bool {
        let mut slot = self.lock();
        let matches = slot
            .as_ref()
            .and_then(|pair| pair.refresh.as_deref())
            .map(|current| current == expected_refresh)
            .unwrap_or(false);
        if !matches {
            return false;
        }
        if let Some(store) = &self.store {
            store.save(&credentials);
        }
        *slot = Some(credentials);
        true
    }

    pub fn clear(&self) {
        let mut slot = self.lock();
        if let Some(store) = &self.store {
            store.clear();
        }
        *slot = None;
    }

    /// 仅当当前访问令牌仍是 `access` 时登出；已被重新登录替换则保持不动。
    pub(crate) fn clear_if_access(&self, access: &str) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().map(|pair| pair.access.as_str()) != Some(access) {
            return false;
        }
        if let Some(store) = &self.store {
            store.clear();
        }
        *slot = None;
        true
    }

    fn lock(&self) -> MutexGuard<'_, Option<CredentialPair>> {
        recover_lock(&self.credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_rotate_and_clear() {
        let session = SessionStore::new();
        assert!(!session.is_authenticated());

        session.login(CredentialPair::new("a1", Some("r1".into())));
        assert_eq!(session.access_token().as_deref(), Some("a1"));

        assert!(!session.rotate("other", CredentialPair::new("a2", Some("r2".into()))));
        assert_eq!(session.access_token().as_deref(), Some("a1"));

        assert!(session.rotate("r1", CredentialPair::new("a2", Some("r2".into()))));
        assert_eq!(
            session.credentials(),
            Some(CredentialPair::new("a2", Some("r2".into())))
        );

        session.clear();
        assert_eq!(session.credentials(), None);
        assert!(!session.rotate("r2", CredentialPair::new("a3", None)));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn persisted_credentials_survive_a_new_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let database = Database::at(dir.path().join("session.db"));

        let first = SessionStore::with_store(Arc::new(SqliteCredentialStore::new(database.clone())));
        first.login(CredentialPair::new("a1", Some("r1".into())));

        let second = SessionStore::with_store(Arc::new(SqliteCredentialStore::new(database.clone())));
        assert_eq!(second.refresh_token().as_deref(), Some("r1"));

        second.clear();
        let third = SessionStore::with_store(Arc::new(SqliteCredentialStore::new(database)));
        assert!(!third.is_authenticated());
    }

    #[test]
    fn clear_if_access_keeps_a_newer_login() {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = SessionStore::with_store(store.clone());
        session.login(CredentialPair::new("a1", Some("r1".into())));
        session.login(CredentialPair::new("a2", Some("r2".into())));

        assert!(!session.clear_if_access("a1"));
        assert_eq!(session.access_token().as_deref(), Some("a2"));
        assert_eq!(store.load().map(|pair| pair.access).as_deref(), Some("a2"));

        assert!(session.clear_if_access("a2"));
        assert!(!session.is_authenticated());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn memory_store_mirrors_login_rotate_and_clear() {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = SessionStore::with_store(store.clone());
        assert!(!session.is_authenticated());

        session.login(CredentialPair::new("a1", Some("r1".into())));
        assert_eq!(store.load(), Some(CredentialPair::new("a1", Some("r1".into()))));

        assert!(session.rotate("r1", CredentialPair::new("a2", Some("r2".into()))));
        assert_eq!(store.load(), Some(CredentialPair::new("a2", Some("r2".into()))));

        let restored = SessionStore::with_store(store.clone());
        assert_eq!(restored.access_token().as_deref(), Some("a2"));

        session.clear();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let pair = CredentialPair::new("secret-access", Some("secret-refresh".into()));
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains("secret"));
    }
}
