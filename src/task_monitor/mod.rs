//! 服务端后台任务轮询：固定间隔拉取任务列表，停止或释放时结束轮询线程。

use crate::api::drive::{cancel_task, list_user_tasks, TaskRecord};
use crate::api::ApiClient;
use crate::error::{DriveError, DriveResult};
use crate::upload_manager::core::recover_lock;
use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub enum TaskEvent {
    Updated(Vec<TaskRecord>),
    PollFailed(DriveError),
}

pub struct TaskMonitor {
    client: ApiClient,
    shared: Arc<MonitorShared>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct MonitorShared {
    latest: Mutex<Vec<TaskRecord>>,
    subscribers: Mutex<Vec<Sender<TaskEvent>>>,
}

impl TaskMonitor {
    pub fn start(client: ApiClient, user_id: &str) -> DriveResult<Self> {
        Self::start_with_interval(client, user_id, DEFAULT_POLL_INTERVAL)
    }

    pub fn start_with_interval(
        client: ApiClient,
        user_id: &str,
        interval: Duration,
    ) -> DriveResult<Self> {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(DriveError::Validation("user id is required".to_string()));
        }
        let shared = Arc::new(MonitorShared::default());
        let (stop_tx, stop_rx) = mpsc::channel();

        let poll_client = client.clone();
        let poll_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("task-monitor".to_string())
            .spawn(move || poll_loop(poll_client, user_id, interval, poll_shared, stop_rx))
            .map_err(|e| DriveError::Config(format!("failed to spawn task monitor: {e}")))?;

        Ok(Self {
            client,
            shared,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// 最近一次成功拉取的任务列表。
    pub fn latest(&self) -> Vec<TaskRecord> {
        recover_lock(&self.shared.latest).clone()
    }

    pub fn subscribe(&self) -> Receiver<TaskEvent> {
        let (tx, rx) = mpsc::channel();
        recover_lock(&self.shared.subscribers).push(tx);
        rx
    }

    pub fn cancel(&self, task_id: &str) -> DriveResult<()> {
        cancel_task(&self.client, task_id)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// 停止轮询并等待线程退出，可重复调用。
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("task monitor thread panicked");
            }
        }
    }
}

impl Drop for TaskMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    client: ApiClient,
    user_id: String,
    interval: Duration,
    shared: Arc<MonitorShared>,
    stop_rx: Receiver<()>,
) {
    info!(user_id = %user_id, ?interval, "task monitor started");
    loop {
        match list_user_tasks(&client, &user_id) {
            Ok(tasks) => {
                debug!(count = tasks.len(), "task list refreshed");
                *recover_lock(&shared.latest) = tasks.clone();
                shared.broadcast(TaskEvent::Updated(tasks));
            }
            Err(err) => {
                warn!(error = %err, "task poll failed");
                let expired = err.requires_reauthentication();
                shared.broadcast(TaskEvent::PollFailed(err));
                // 会话失效后继续轮询只会反复失败。
                if expired {
                    break;
                }
            }
        }
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(user_id = %user_id, "task monitor stopped");
}

impl MonitorShared {
    fn broadcast(&self, event: TaskEvent) {
        let mut subs = recover_lock(&self.subscribers);
        subs.retain(|sender| sender.send(event.clone()).is_ok());
    }
}
