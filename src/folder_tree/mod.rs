mod guard;

pub use guard::{compute_disabled_targets, ensure_valid_move, is_valid_target};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 移动目标选择器里代表根目录的合成 id。
pub const ROOT_ID: &str = "root";

/// 文件夹树节点，子节点保持服务端返回的顺序。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, children: Vec<FolderNode>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children,
        }
    }

    pub fn leaf(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, Vec::new())
    }
}

/// 一次交互期间的只读文件夹森林快照，不与服务端保持同步。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderTree {
    roots: Vec<FolderNode>,
}

impl FolderTree {
    pub fn new(roots: Vec<FolderNode>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[FolderNode] {
        &self.roots
    }

    /// 广度优先查找节点。
    pub fn find(&self, id: &str) -> Option<&FolderNode> {
        let mut queue: VecDeque<&FolderNode> = self.roots.iter().collect();
        while let Some(node) = queue.pop_front() {
            if node.id == id {
                return Some(node);
            }
            queue.extend(node.children.iter());
        }
        None
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut queue: VecDeque<&FolderNode> = self.roots.iter().collect();
        while let Some(node) = queue.pop_front() {
            count += 1;
            queue.extend(node.children.iter());
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemKind {
    File,
    Folder,
}

/// 对一个文件或文件夹的引用。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub id: String,
    pub kind: ItemKind,
}

impl ItemRef {
    pub fn file(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::File,
        }
    }

    pub fn folder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Folder,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }
}

/// 移动目标：根目录或某个文件夹。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MoveTarget {
    Root,
    Folder(String),
}

impl MoveTarget {
    /// `None` 与合成根 id 都映射到根目录。
    pub fn from_id(id: Option<&str>) -> Self {
        match id {
            None => MoveTarget::Root,
            Some(id) if id == ROOT_ID || id.trim().is_empty() => MoveTarget::Root,
            Some(id) => MoveTarget::Folder(id.to_string()),
        }
    }

    pub fn folder_id(&self) -> Option<&str> {
        match self {
            MoveTarget::Root => None,
            MoveTarget::Folder(id) => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FolderTree {
        FolderTree::new(vec![
            FolderNode::new(
                "docs",
                "Docs",
                vec![FolderNode::new(
                    "tax",
                    "Tax",
                    vec![FolderNode::leaf("2024", "2024")],
                )],
            ),
            FolderNode::leaf("photos", "Photos"),
        ])
    }

    #[test]
    fn find_walks_whole_forest() {
        let tree = sample();
        assert_eq!(tree.find("2024").map(|n| n.name.as_str()), Some("2024"));
        assert!(tree.contains("photos"));
        assert!(!tree.contains("missing"));
        assert_eq!(tree.len(), 4);
        assert!(!tree.is_empty());
        assert!(FolderTree::default().is_empty());
    }

    #[test]
    fn deserializes_nested_nodes_without_children_field() {
        let nodes: Vec<FolderNode> = serde_json::from_str(
            r#"[{"id":"a","name":"A","children":[{"id":"b","name":"B"}]}]"#,
        )
        .expect("parse");
        let tree = FolderTree::new(nodes);
        assert_eq!(tree.find("b"), Some(&FolderNode::leaf("b", "B")));
    }

    #[test]
    fn move_target_from_id() {
        assert_eq!(MoveTarget::from_id(None), MoveTarget::Root);
        assert_eq!(MoveTarget::from_id(Some(ROOT_ID)), MoveTarget::Root);
        assert_eq!(
            MoveTarget::from_id(Some("f1")).folder_id(),
            Some("f1")
        );
    }
}
