#[allow(clippy::module_inception)]
mod auth;
mod refresh;
mod session;

pub use auth::{forgot_password, login, logout, reset_password, signup, verify_email, AuthMessage};
pub use refresh::RefreshCoordinator;
pub use session::{
    CredentialPair, CredentialStore, MemoryCredentialStore, SessionStore, SqliteCredentialStore,
};
