use super::{encode_segment, parse_json, require_id, models::TaskRecord};
use crate::api::{ApiClient, RequestOptions};
use crate::error::DriveResult;

/// 服务端为该用户维护的后台传输任务列表。
pub fn list_user_tasks(client: &ApiClient, user_id: &str) -> DriveResult<Vec<TaskRecord>> {
    let user_id = require_id("user", user_id)?;
    let response = client.request(
        &format!("/tasks/user/{}", encode_segment(user_id)),
        RequestOptions::get(),
    )?;
    parse_json(response)
}

pub fn cancel_task(client: &ApiClient, task_id: &str) -> DriveResult<()> {
    let task_id = require_id("task", task_id)?;
    client
        .request(
            &format!("/tasks/{}/cancel", encode_segment(task_id)),
            RequestOptions::post(),
        )?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{CredentialPair, SessionStore};
    use crate::api::testing::{json_response, test_client, FakeTransport};
    use crate::error::DriveError;
    use reqwest::Method;
    use serde_json::json;

    #[test]
    fn lists_and_cancels_tasks() {
        let transport = FakeTransport::new();
        transport.on(Method::GET, "/tasks/user/u1", |_| {
            Ok(json_response(
                200,
                json!([{
                    "id": "t1",
                    "name": "movie.mkv",
                    "status": "running",
                    "percent": 42.5,
                    "transferred": 425,
                    "total": 1000,
                    "transferred_human": "425 B",
                    "total_human": "1000 B",
                    "speed": "10 B/s",
                    "eta": "57s",
                    "can_cancel": true
                }]),
            ))
        });
        transport.on(Method::POST, "/tasks/t1/cancel", |_| {
            Ok(json_response(200, json!({ "message": "cancelled" })))
        });
        let session = SessionStore::new();
        session.login(CredentialPair::new("a1", None));
        let client = test_client(&transport, session);

        let tasks = list_user_tasks(&client, "u1").expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].can_cancel);
        assert_eq!(tasks[0].eta.as_deref(), Some("57s"));

        cancel_task(&client, "t1").expect("cancel");
        assert_eq!(transport.count(&Method::POST, "/tasks/t1/cancel"), 1);
        assert!(matches!(cancel_task(&client, ""), Err(DriveError::Validation(_))));
    }
}
