use super::session::CredentialPair;
use crate::api::client::{ApiClient, RequestOptions};
use crate::error::{DriveError, DriveResult};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const LOGIN_PATH: &str = "/auth/login";
const SIGNUP_PATH: &str = "/auth/signup";
const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";
const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
const RESET_PASSWORD_PATH: &str = "/auth/reset-password";

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) refresh_token: Option<String>,
}

/// 账户类接口（注册、验证邮箱、找回密码）返回的提示信息。
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct AuthMessage {
    #[serde(default)]
    pub message: String,
}

/// 邮箱密码登录，成功后写入会话。
pub fn login(client: &ApiClient, email: &str, password: &str) -> DriveResult<CredentialPair> {
    let email = require("email", email)?;
    require("password", password)?;

    let response = client
        .request(
            LOGIN_PATH,
            RequestOptions::post().json(json!({ "email": email, "password": password })),
        )?
        .error_for_status()?;
    let payload: TokenResponse = response.json()?;
    let credentials = CredentialPair::new(payload.access_token, payload.refresh_token);
    client.session().login(credentials.clone());
    info!("signed in");
    Ok(credentials)
}

pub fn signup(
    client: &ApiClient,
    email: &str,
    password: &str,
    display_name: Option<&str>,
) -> DriveResult<AuthMessage> {
    let email = require("email", email)?;
    require("password", password)?;
    let mut body = json!({ "email": email, "password": password });
    if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
        body["name"] = json!(name);
    }
    post_for_message(client, SIGNUP_PATH, body)
}

pub fn verify_email(client: &ApiClient, token: &str) -> DriveResult<AuthMessage> {
    let token = require("verification token", token)?;
    post_for_message(client, VERIFY_EMAIL_PATH, json!({ "token": token }))
}

pub fn forgot_password(client: &ApiClient, email: &str) -> DriveResult<AuthMessage> {
    let email = require("email", email)?;
    post_for_message(client, FORGOT_PASSWORD_PATH, json!({ "email": email }))
}

pub fn reset_password(
    client: &ApiClient,
    token: &str,
    new_password: &str,
) -> DriveResult<AuthMessage> {
    let token = require("reset token", token)?;
    require("new password", new_password)?;
    post_for_message(
        client,
        RESET_PASSWORD_PATH,
        json!({ "token": token, "new_password": new_password }),
    )
}

/// 登出只清理本地会话。
pub fn logout(client: &ApiClient) {
    client.session().clear();
    info!("signed out");
}

fn post_for_message(
    client: &ApiClient,
    endpoint: &str,
    body: serde_json::Value,
) -> DriveResult<AuthMessage> {
    let response = client
        .request(endpoint, RequestOptions::post().json(body))?
        .error_for_status()?;
    if response.body.is_empty() {
        return Ok(AuthMessage::default());
    }
    response.json()
}

fn require<'a>(field: &str, value: &'a str) -> DriveResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DriveError::Validation(format!("{field} is required")));
    }
    Ok(trimmed)
}
