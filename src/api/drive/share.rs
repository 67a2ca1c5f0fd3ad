use super::{encode_segment, parse_json, require_id, models::ShareLink};
use crate::api::{ApiClient, RequestOptions};
use crate::error::{DriveError, DriveResult};
use serde::Serialize;

/// 分享链接最长有效期（30 天）。
const MAX_EXPIRY_HOURS: u32 = 24 * 30;

#[derive(Debug, Serialize)]
struct CreateShareRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in_hours: Option<u32>,
}

/// 为文件创建分享链接；不传有效期时由服务端决定。
pub fn create_share_link(
    client: &ApiClient,
    file_id: &str,
    expires_in_hours: Option<u32>,
) -> DriveResult<ShareLink> {
    let file_id = require_id("file", file_id)?;
    if let Some(hours) = expires_in_hours {
        if hours == 0 || hours > MAX_EXPIRY_HOURS {
            return Err(DriveError::Validation(format!(
                "share link expiry must be between 1 and {MAX_EXPIRY_HOURS} hours"
            )));
        }
    }

    let body = serde_json::to_value(CreateShareRequest { expires_in_hours })
        .map_err(|e| DriveError::Decode(format!("failed to encode share request: {e}")))?;
    let response = client.request(
        &format!("/files/{}/share", encode_segment(file_id)),
        RequestOptions::post().json(body),
    )?;
    parse_json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{CredentialPair, SessionStore};
    use crate::api::testing::{json_response, test_client, FakeTransport};
    use crate::api::RequestBody;
    use reqwest::Method;
    use serde_json::json;

    #[test]
    fn creates_link_with_optional_expiry() {
        let transport = FakeTransport::new();
        transport.on(Method::POST, "/files/f1/share", |_| {
            Ok(json_response(
                200,
                json!({ "url": "http://fake.test/s/abc", "expires_at": "2026-01-01T00:00:00Z" }),
            ))
        });
        let session = SessionStore::new();
        session.login(CredentialPair::new("a1", None));
        let client = test_client(&transport, session);

        let link = create_share_link(&client, "f1", Some(48)).expect("share");
        assert_eq!(link.url, "http://fake.test/s/abc");
        create_share_link(&client, "f1", None).expect("share without expiry");

        let calls = transport.calls();
        assert_eq!(calls[0].body, RequestBody::Json(json!({ "expires_in_hours": 48 })));
        assert_eq!(calls[1].body, RequestBody::Json(json!({})));
    }

    #[test]
    fn rejects_out_of_range_expiry() {
        let transport = FakeTransport::new();
        let client = test_client(&transport, SessionStore::new());

        assert!(matches!(
            create_share_link(&client, "f1", Some(0)),
            Err(DriveError::Validation(_))
        ));
        assert!(matches!(
            create_share_link(&client, "f1", Some(MAX_EXPIRY_HOURS + 1)),
            Err(DriveError::Validation(_))
        ));
        assert!(transport.calls().is_empty());
    }
}
