use super::{FolderNode, FolderTree, ItemKind, ItemRef, MoveTarget};
use crate::error::{DriveError, DriveResult};
use std::collections::{HashSet, VecDeque};

/// 计算本次移动不可选的目标文件夹：每个被移动文件夹自身及其全部后代。
/// 文件不贡献任何 id。快照中找不到的文件夹只禁用它自己。
pub fn compute_disabled_targets(tree: &FolderTree, moved_items: &[ItemRef]) -> HashSet<String> {
    let mut disabled = HashSet::new();
    for item in moved_items
        .iter()
        .filter(|item| item.kind == ItemKind::Folder)
    {
        // 已作为另一个被移动文件夹的后代访问过，其子树也已在集合中。
        if disabled.contains(&item.id) {
            continue;
        }
        disabled.insert(item.id.clone());
        let Some(start) = tree.find(&item.id) else {
            continue;
        };
        let mut queue: VecDeque<&FolderNode> = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            disabled.insert(node.id.clone());
            queue.extend(node.children.iter());
        }
    }
    disabled
}

/// 根目录总是合法目标。
pub fn is_valid_target(tree: &FolderTree, moved_items: &[ItemRef], target: &MoveTarget) -> bool {
    match target {
        MoveTarget::Root => true,
        MoveTarget::Folder(id) => !compute_disabled_targets(tree, moved_items).contains(id),
    }
}

/// 客户端预检：目标必须存在于快照中且不在禁用集合里。服务端仍会独立校验。
pub fn ensure_valid_move(
    tree: &FolderTree,
    moved_items: &[ItemRef],
    target: &MoveTarget,
) -> DriveResult<()> {
    if moved_items.is_empty() {
        return Err(DriveError::Validation("nothing selected to move".to_string()));
    }
    let MoveTarget::Folder(id) = target else {
        return Ok(());
    };
    if !tree.contains(id) {
        return Err(DriveError::Validation(format!(
            "destination folder {id} no longer exists"
        )));
    }
    if compute_disabled_targets(tree, moved_items).contains(id) {
        return Err(DriveError::Validation(
            "cannot move a folder into itself or one of its subfolders".to_string(),
        ));
    }
    Ok(())
}
