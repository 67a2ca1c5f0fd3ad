use super::models::{
    EnqueueReport, RejectedFile, UploadEvent, UploadFile, UploadItem, UploadPolicy, UploadStatus,
};
use crate::api::drive::{upload_file, FileEntry};
use crate::api::{AbortHandle, ApiClient, TransferProgress};
use crate::db::current_timestamp_millis;
use crate::error::{DriveError, DriveResult};
use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
        Arc, Mutex, MutexGuard, Weak,
    },
    thread,
    time::Duration,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 终态条目保留多久后自动移除。
pub const EVICTION_DELAY: Duration = Duration::from_secs(5);
const EVENT_CHANNEL_CAP: usize = 256;
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 串行上传队列：任意时刻最多一个条目处于 uploading。
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    client: ApiClient,
    policy: UploadPolicy,
    eviction_delay: Duration,
    state: Mutex<QueueState>,
    subscribers: Mutex<Vec<SyncSender<UploadEvent>>>,
}

#[derive(Default)]
struct QueueState {
    items: Vec<UploadItem>,
    // 与条目状态分开记录：被清除但尚未结束中止的传输仍占用这个位置。
    transfer_active: bool,
    // clear() 递增，使之前安排的淘汰失效。
    epoch: u64,
}

impl UploadQueue {
    pub fn new(client: ApiClient) -> Self {
        Self::with_options(client, UploadPolicy::default(), EVICTION_DELAY)
    }

    pub fn with_options(client: ApiClient, policy: UploadPolicy, eviction_delay: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                client,
                policy,
                eviction_delay,
                state: Mutex::new(QueueState::default()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn policy(&self) -> UploadPolicy {
        self.inner.policy
    }

    /// 逐个校验后入队；超限文件单独拒绝，其余照常排队。
    pub fn enqueue(&self, files: Vec<UploadFile>, folder_id: Option<&str>) -> EnqueueReport {
        let folder_id = folder_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let mut report = EnqueueReport::default();
        let mut events = Vec::new();
        {
            let mut state = recover_lock(&self.inner.state);
            for file in files {
                if let Err(error) = self.inner.policy.validate(&file) {
                    warn!(file = %file.name, size = file.size, %error, "upload rejected");
                    events.push(UploadEvent::Rejected {
                        file_name: file.name.clone(),
                        error: error.clone(),
                    });
                    report.rejected.push(RejectedFile {
                        file_name: file.name,
                        error,
                    });
                    continue;
                }
                let item = UploadItem {
                    id: Uuid::new_v4().to_string(),
                    file,
                    folder_id: folder_id.clone(),
                    progress: 0,
                    bytes_sent: 0,
                    status: UploadStatus::Queued,
                    error_message: None,
                    created_at: current_timestamp_millis(),
                    finished_at: None,
                    abort: None,
                };
                report.accepted.push(item.id.clone());
                events.push(UploadEvent::ItemUpdated(item.clone()));
                state.items.push(item);
            }
        }
        self.inner.broadcast_all(events);
        self.inner.process_next();
        report
    }

    pub fn snapshot(&self) -> Vec<UploadItem> {
        recover_lock(&self.inner.state).items.clone()
    }

    pub fn item(&self, id: &str) -> Option<UploadItem> {
        recover_lock(&self.inner.state)
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// 仍有传输在进行（包括已被清除、正在等待中止生效的传输）。
    pub fn has_active_transfer(&self) -> bool {
        recover_lock(&self.inner.state).transfer_active
    }

    /// 排队中的条目直接取消，不产生网络请求；上传中的条目发出中止，
    /// 传输层确认后才转为 cancelled。终态条目保持不变。
    pub fn cancel(&self, id: &str) -> DriveResult<()> {
        let mut state = recover_lock(&self.inner.state);
        let item = state
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| DriveError::Validation(format!("upload {id} not found")))?;
        match item.status {
            UploadStatus::Queued => {
                item.status = UploadStatus::Cancelled;
                item.finished_at = Some(current_timestamp_millis());
                let updated = item.clone();
                let epoch = state.epoch;
                drop(state);
                debug!(id = %id, "queued upload cancelled");
                self.inner.broadcast(UploadEvent::ItemUpdated(updated));
                QueueInner::schedule_eviction(&self.inner, id.to_string(), epoch);
            }
            UploadStatus::Uploading => {
                if let Some(abort) = &item.abort {
                    abort.abort();
                }
                debug!(id = %id, "abort requested for active upload");
            }
            _ => {}
        }
        Ok(())
    }

    /// 取消并立即移除条目。
    pub fn remove(&self, id: &str) -> bool {
        let mut state = recover_lock(&self.inner.state);
        let Some(pos) = state.items.iter().position(|item| item.id == id) else {
            return false;
        };
        let item = state.items.remove(pos);
        drop(state);
        if let Some(abort) = &item.abort {
            abort.abort();
        }
        self.inner.broadcast(UploadEvent::ItemRemoved { id: item.id });
        self.inner.process_next();
        true
    }

    /// 清空整个队列：中止当前传输，取消所有待执行的淘汰。
    pub fn clear(&self) {
        let mut state = recover_lock(&self.inner.state);
        state.epoch = state.epoch.wrapping_add(1);
        let removed: Vec<UploadItem> = state.items.drain(..).collect();
        drop(state);
        for item in &removed {
            if let Some(abort) = &item.abort {
                abort.abort();
            }
        }
        info!(removed = removed.len(), "upload queue cleared");
        self.inner.broadcast_all(
            removed
                .into_iter()
                .map(|item| UploadEvent::ItemRemoved { id: item.id })
                .collect(),
        );
    }

    /// 只移除终态条目。
    pub fn clear_finished(&self) -> usize {
        let mut state = recover_lock(&self.inner.state);
        let mut removed = Vec::new();
        state.items.retain(|item| {
            if item.status.is_terminal() {
                removed.push(item.id.clone());
                false
            } else {
                true
            }
        });
        drop(state);
        let count = removed.len();
        self.inner.broadcast_all(
            removed
                .into_iter()
                .map(|id| UploadEvent::ItemRemoved { id })
                .collect(),
        );
        count
    }

    pub fn subscribe(&self) -> Receiver<UploadEvent> {
        let (tx, rx) = mpsc::sync_channel(EVENT_CHANNEL_CAP);
        recover_lock(&self.inner.subscribers).push(tx);
        rx
    }
}

impl QueueInner {
    /// 没有活动传输时取出最早的排队条目并启动传输。
    fn process_next(self: &Arc<Self>) {
        let mut state = recover_lock(&self.state);
        if state.transfer_active {
            return;
        }
        let Some(item) = state
            .items
            .iter_mut()
            .find(|item| item.status == UploadStatus::Queued)
        else {
            return;
        };
        let abort = AbortHandle::new();
        item.status = UploadStatus::Uploading;
        item.abort = Some(abort.clone());
        let started = item.clone();
        state.transfer_active = true;
        drop(state);

        info!(
            id = %started.id,
            file = %started.file.name,
            size = started.file.size,
            "upload started"
        );
        self.broadcast(UploadEvent::ItemUpdated(started.clone()));

        let queue = Arc::clone(self);
        thread::spawn(move || {
            let result = queue.run_transfer(&started, &abort);
            queue.finish_transfer(&started.id, result, &abort);
        });
    }

    fn run_transfer(&self, item: &UploadItem, abort: &AbortHandle) -> DriveResult<FileEntry> {
        let part = item.file.to_part();
        let (tx, rx) = mpsc::channel::<TransferProgress>();
        thread::scope(|scope| {
            let client = &self.client;
            let part = &part;
            let folder_id = item.folder_id.as_deref();
            let worker =
                scope.spawn(move || upload_file(client, folder_id, part, &tx, abort));
            // 传输层可能仍持有 Sender 的克隆，不能只靠断开来判断结束。
            loop {
                match rx.recv_timeout(PROGRESS_POLL_INTERVAL) {
                    Ok(progress) => self.record_progress(&item.id, progress),
                    Err(RecvTimeoutError::Timeout) if worker.is_finished() => break,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            for progress in rx.try_iter() {
                self.record_progress(&item.id, progress);
            }
            worker.join().unwrap_or_else(|_| {
                Err(DriveError::Network("upload worker panicked".to_string()))
            })
        })
    }

    fn record_progress(&self, id: &str, progress: TransferProgress) {
        let mut state = recover_lock(&self.state);
        let Some(item) = state
            .items
            .iter_mut()
            .find(|item| item.id == id && item.status == UploadStatus::Uploading)
        else {
            return;
        };
        item.bytes_sent = progress.bytes_sent;
        let percent = progress.percent();
        if percent == item.progress {
            return;
        }
        item.progress = percent;
        let updated = item.clone();
        drop(state);
        self.broadcast(UploadEvent::ItemUpdated(updated));
    }

    fn finish_transfer(
        self: &Arc<Self>,
        id: &str,
        result: DriveResult<FileEntry>,
        abort: &AbortHandle,
    ) {
        let mut state = recover_lock(&self.state);
        state.transfer_active = false;
        let epoch = state.epoch;
        let mut events = Vec::new();
        if let Some(item) = state.items.iter_mut().find(|item| item.id == id) {
            item.abort = None;
            item.finished_at = Some(current_timestamp_millis());
            match result {
                // 中止先于传输返回时按取消处理，即使服务端已经收完。
                _ if abort.is_aborted() => {
                    item.status = UploadStatus::Cancelled;
                    info!(id = %id, "upload cancelled");
                }
                Err(err) if err.is_cancellation() => {
                    item.status = UploadStatus::Cancelled;
                    info!(id = %id, "upload cancelled");
                }
                Ok(entry) => {
                    item.status = UploadStatus::Complete;
                    item.progress = 100;
                    item.bytes_sent = item.file.size;
                    info!(id = %id, file_id = %entry.id, "upload complete");
                    events.push(UploadEvent::UploadsChanged {
                        folder_id: item.folder_id.clone(),
                        file: entry,
                    });
                }
                Err(err) => {
                    warn!(id = %id, error = %err, "upload failed");
                    item.status = UploadStatus::Error;
                    item.error_message = Some(err.to_string());
                }
            }
            events.insert(0, UploadEvent::ItemUpdated(item.clone()));
        } else {
            debug!(id = %id, "transfer finished for an item that was already removed");
        }
        let evict = !events.is_empty();
        drop(state);

        self.broadcast_all(events);
        if evict {
            Self::schedule_eviction(self, id.to_string(), epoch);
        }
        self.process_next();
    }

    fn schedule_eviction(queue: &Arc<Self>, id: String, epoch: u64) {
        let delay = queue.eviction_delay;
        let weak: Weak<Self> = Arc::downgrade(queue);
        thread::spawn(move || {
            thread::sleep(delay);
            let Some(queue) = weak.upgrade() else {
                return;
            };
            let mut state = recover_lock(&queue.state);
            if state.epoch != epoch {
                return;
            }
            let Some(pos) = state
                .items
                .iter()
                .position(|item| item.id == id && item.status.is_terminal())
            else {
                return;
            };
            state.items.remove(pos);
            drop(state);
            debug!(id = %id, "evicted finished upload");
            queue.broadcast(UploadEvent::ItemRemoved { id });
        });
    }

    fn broadcast(&self, event: UploadEvent) {
        self.broadcast_all(vec![event]);
    }

    fn broadcast_all(&self, events: Vec<UploadEvent>) {
        if events.is_empty() {
            return;
        }
        let mut subs = recover_lock(&self.subscribers);
        for event in events {
            subs.retain(|sender| match sender.try_send(event.clone()) {
                Ok(_) => true,
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
        }
    }
}

/// 锁中毒时取回内部数据继续使用。
pub(crate) fn recover_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}
