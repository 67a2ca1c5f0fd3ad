use super::{encode_segment, require_id};
use crate::api::{ApiClient, ApiResponse, RequestOptions};
use crate::error::{DriveError, DriveResult};
use crate::folder_tree::{ensure_valid_move, FolderTree, ItemKind, ItemRef, MoveTarget};
use serde_json::json;
use tracing::{info, warn};

/// 对单个文件或文件夹执行的操作。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriveCommand {
    Star { item: ItemRef, starred: bool },
    Bin(ItemRef),
    Restore(ItemRef),
    Delete(ItemRef),
    Rename { item: ItemRef, name: String },
    Move { item: ItemRef, destination: MoveTarget },
}

impl DriveCommand {
    pub fn item(&self) -> &ItemRef {
        match self {
            DriveCommand::Star { item, .. }
            | DriveCommand::Rename { item, .. }
            | DriveCommand::Move { item, .. } => item,
            DriveCommand::Bin(item) | DriveCommand::Restore(item) | DriveCommand::Delete(item) => {
                item
            }
        }
    }

    fn action(&self) -> &'static str {
        match self {
            DriveCommand::Star { .. } => "star",
            DriveCommand::Bin(_) => "bin",
            DriveCommand::Restore(_) => "restore",
            DriveCommand::Delete(_) => "delete",
            DriveCommand::Rename { .. } => "rename",
            DriveCommand::Move { .. } => "move",
        }
    }

    fn validate(&self) -> DriveResult<()> {
        require_id("item", &self.item().id)?;
        match self {
            DriveCommand::Rename { name, .. } if name.trim().is_empty() => {
                Err(DriveError::Validation("new name cannot be empty".to_string()))
            }
            DriveCommand::Move {
                item,
                destination: MoveTarget::Folder(target),
            } if item.is_folder() && item.id == *target => Err(DriveError::Validation(
                "cannot move a folder into itself".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn endpoint(&self) -> String {
        let item = self.item();
        let collection = match item.kind {
            ItemKind::File => "files",
            ItemKind::Folder => "folders",
        };
        let id = encode_segment(item.id.trim());
        match self {
            DriveCommand::Delete(_) => format!("/{collection}/{id}"),
            _ => format!("/{collection}/{id}/{}", self.action()),
        }
    }

    fn options(&self) -> RequestOptions {
        match self {
            DriveCommand::Star { starred, .. } => {
                RequestOptions::patch().json(json!({ "starred": starred }))
            }
            DriveCommand::Bin(_) | DriveCommand::Restore(_) => RequestOptions::post(),
            DriveCommand::Delete(_) => RequestOptions::delete(),
            DriveCommand::Rename { name, .. } => {
                RequestOptions::patch().json(json!({ "name": name.trim() }))
            }
            DriveCommand::Move { item, destination } => {
                // 文件的父级字段为 folder_id，文件夹为 parent_id；null 表示根目录。
                let field = match item.kind {
                    ItemKind::File => "folder_id",
                    ItemKind::Folder => "parent_id",
                };
                RequestOptions::patch().json(json!({ field: destination.folder_id() }))
            }
        }
    }
}

/// 执行单条命令，非 2xx 转为错误。
pub fn execute(client: &ApiClient, command: &DriveCommand) -> DriveResult<ApiResponse> {
    command.validate()?;
    client
        .request(&command.endpoint(), command.options())?
        .error_for_status()
}

/// 批量执行的结果：成功的条目与各自失败原因。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchOutcome {
    pub succeeded: Vec<ItemRef>,
    pub failed: Vec<(ItemRef, DriveError)>,
}

impl BatchOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 逐条执行；单条失败不影响后续，会话失效时立即停止。
pub fn execute_batch(client: &ApiClient, commands: &[DriveCommand]) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for command in commands {
        match execute(client, command) {
            Ok(_) => outcome.succeeded.push(command.item().clone()),
            Err(err) => {
                warn!(
                    action = command.action(),
                    item = %command.item().id,
                    error = %err,
                    "drive command failed"
                );
                let stop = err.requires_reauthentication();
                outcome.failed.push((command.item().clone(), err));
                if stop {
                    break;
                }
            }
        }
    }
    outcome
}

/// 先用文件夹树快照做环路预检，通过后再逐条发出移动请求。
pub fn move_items(
    client: &ApiClient,
    tree: &FolderTree,
    items: &[ItemRef],
    destination: &MoveTarget,
) -> DriveResult<BatchOutcome> {
    ensure_valid_move(tree, items, destination)?;
    let commands: Vec<DriveCommand> = items
        .iter()
        .map(|item| DriveCommand::Move {
            item: item.clone(),
            destination: destination.clone(),
        })
        .collect();
    let outcome = execute_batch(client, &commands);
    info!(
        moved = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        destination = destination.folder_id().unwrap_or("root"),
        "move batch finished"
    );
    Ok(outcome)
}
