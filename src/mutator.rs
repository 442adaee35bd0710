// The six tree operations. Each one takes the current tree by reference and
// returns a new tree; the caller's tree is never touched.

use serde::Deserialize;
use tracing::instrument;

use crate::errors::{DeskError, Result};
use crate::vtree::{
    join_path, split_path, validate_name, Node, VirtualFileTree, MAX_TREE_DEPTH,
};

/// A tree operation as sent by the editor.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum TreeOp {
    CreateFile { dir_path: String, name: String },
    CreateFolder { dir_path: String, name: String },
    Rename { path: String, new_name: String },
    Delete { path: String },
    Move { from_path: String, to_dir_path: String },
    UpdateContent { path: String, content: String },
}

/// Where an operation moved a path to, if it moved anything.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Relocation {
    None,
    Moved { from: String, to: String },
    Removed(String),
}

impl TreeOp {
    pub(crate) fn apply(&self, tree: &VirtualFileTree) -> Result<VirtualFileTree> {
        match self {
            TreeOp::CreateFile { dir_path, name } => tree.create_file(dir_path, name),
            TreeOp::CreateFolder { dir_path, name } => tree.create_folder(dir_path, name),
            TreeOp::Rename { path, new_name } => tree.rename_node(path, new_name),
            TreeOp::Delete { path } => tree.delete_node(path),
            TreeOp::Move {
                from_path,
                to_dir_path,
            } => tree.move_node(from_path, to_dir_path),
            TreeOp::UpdateContent { path, content } => tree.update_file_content(path, content),
        }
    }

    /// Describes how a successful operation relocated existing paths.
    pub(crate) fn relocation(&self) -> Result<Relocation> {
        match self {
            TreeOp::Rename { path, new_name } => {
                let segments = split_path(path)?;
                let parent = segments[..segments.len().saturating_sub(1)].join("/");
                Ok(Relocation::Moved {
                    from: segments.join("/"),
                    to: join_path(&parent, new_name),
                })
            }
            TreeOp::Move {
                from_path,
                to_dir_path,
            } => {
                let segments = split_path(from_path)?;
                let name = segments.last().copied().unwrap_or_default();
                let dest = split_path(to_dir_path)?.join("/");
                Ok(Relocation::Moved {
                    from: segments.join("/"),
                    to: join_path(&dest, name),
                })
            }
            TreeOp::Delete { path } => Ok(Relocation::Removed(split_path(path)?.join("/"))),
            _ => Ok(Relocation::None),
        }
    }
}

fn split_parent<'a>(segments: &'a [&'a str]) -> Result<(&'a [&'a str], &'a str)> {
    match segments.split_last() {
        Some((name, parent)) => Ok((parent, name)),
        None => Err(DeskError::invalid_operation("The project root has no parent")),
    }
}

fn require_depth(dir_segments: &[&str], node: &Node) -> Result<()> {
    if dir_segments.len() + node.depth() > MAX_TREE_DEPTH {
        return Err(DeskError::invalid_operation(format!(
            "Folders cannot nest deeper than {} levels",
            MAX_TREE_DEPTH
        )));
    }
    Ok(())
}

fn require_directory(tree: &VirtualFileTree, dir_path: &str, segments: &[&str]) -> Result<()> {
    match tree.resolve_segments(segments)? {
        Node::Directory(_) => Ok(()),
        Node::File(_) => Err(DeskError::not_found(format!(
            "{} is not a folder",
            dir_path
        ))),
    }
}

impl VirtualFileTree {
    #[instrument(skip(self))]
    pub(crate) fn create_file(&self, dir_path: &str, name: &str) -> Result<VirtualFileTree> {
        self.create(dir_path, name, Node::empty_file())
    }

    #[instrument(skip(self))]
    pub(crate) fn create_folder(&self, dir_path: &str, name: &str) -> Result<VirtualFileTree> {
        self.create(dir_path, name, Node::empty_directory())
    }

    fn create(&self, dir_path: &str, name: &str, node: Node) -> Result<VirtualFileTree> {
        validate_name(name)?;
        let segments = split_path(dir_path)?;
        require_directory(self, dir_path, &segments)?;
        if segments.is_empty() && !node.is_directory() {
            return Err(DeskError::invalid_operation(format!(
                "Cannot create file {} at the project root",
                name
            )));
        }
        require_depth(&segments, &node)?;
        let mut next = self.clone();
        let folder = next.directory_mut(&segments)?;
        if folder.contains(name) {
            let msg = format!("{} already exists", join_path(&segments.join("/"), name));
            tracing::info!("{}", msg);
            return Err(DeskError::conflict(msg));
        }
        folder.push(name.to_string(), node);
        Ok(next)
    }

    #[instrument(skip(self))]
    pub(crate) fn rename_node(&self, path: &str, new_name: &str) -> Result<VirtualFileTree> {
        validate_name(new_name)?;
        let segments = split_path(path)?;
        if segments.is_empty() {
            return Err(DeskError::invalid_operation(
                "The project root cannot be renamed",
            ));
        }
        self.resolve_segments(&segments)?;
        let (parent, name) = split_parent(&segments)?;
        if name == new_name {
            return Ok(self.clone());
        }
        let mut next = self.clone();
        let folder = next.directory_mut(parent)?;
        if folder.contains(new_name) {
            let msg = format!(
                "{} already exists",
                join_path(&parent.join("/"), new_name)
            );
            tracing::info!("{}", msg);
            return Err(DeskError::conflict(msg));
        }
        folder.rename(name, new_name.to_string());
        Ok(next)
    }

    #[instrument(skip(self))]
    pub(crate) fn delete_node(&self, path: &str) -> Result<VirtualFileTree> {
        let segments = split_path(path)?;
        if segments.is_empty() {
            return Err(DeskError::invalid_operation(
                "The project root cannot be removed",
            ));
        }
        self.resolve_segments(&segments)?;
        let (parent, name) = split_parent(&segments)?;
        let mut next = self.clone();
        next.directory_mut(parent)?.remove(name);
        tracing::info!("Removed {} from tree", path);
        Ok(next)
    }

    #[instrument(skip(self))]
    pub(crate) fn move_node(&self, from_path: &str, to_dir_path: &str) -> Result<VirtualFileTree> {
        let source = split_path(from_path)?;
        let dest = split_path(to_dir_path)?;
        if source.is_empty() {
            return Err(DeskError::invalid_operation(
                "The project root cannot be moved",
            ));
        }
        let node = self.resolve_segments(&source)?.clone();
        if dest.len() >= source.len() && dest[..source.len()] == source[..] {
            let msg = format!("Cannot move {} into itself ({})", from_path, to_dir_path);
            tracing::info!("{}", msg);
            return Err(DeskError::invalid_operation(msg));
        }
        require_directory(self, to_dir_path, &dest)?;
        let (parent, name) = split_parent(&source)?;
        if dest.is_empty() && !node.is_directory() {
            return Err(DeskError::invalid_operation(format!(
                "Cannot move file {} to the project root",
                from_path
            )));
        }
        require_depth(&dest, &node)?;

        let mut next = self.clone();
        if next.directory_mut(&dest)?.contains(name) {
            let msg = format!("{} already exists", join_path(&dest.join("/"), name));
            tracing::info!("{}", msg);
            return Err(DeskError::conflict(msg));
        }
        next.directory_mut(parent)?.remove(name);
        next.directory_mut(&dest)?.push(name.to_string(), node);
        Ok(next)
    }

    #[instrument(skip(self, content))]
    pub(crate) fn update_file_content(&self, path: &str, content: &str) -> Result<VirtualFileTree> {
        let segments = split_path(path)?;
        match self.resolve_segments(&segments) {
            Ok(Node::File(_)) => (),
            _ => {
                return Err(DeskError::not_found(format!(
                    "No file found at {}",
                    path
                )))
            }
        }
        let (parent, name) = split_parent(&segments)?;
        let mut next = self.clone();
        let folder = next.directory_mut(parent)?;
        if let Some(entry) = folder.get_mut(name) {
            *entry = Node::File(content.into());
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeskErrorType;
    use std::sync::Arc;

    fn sample() -> VirtualFileTree {
        serde_json::from_str(
            r#"{
                "src": {
                    "App.jsx": "app",
                    "components": {"Button.jsx": "btn", "forms": {"Input.jsx": "input"}}
                },
                "public": {"index.html": "<div id='root'></div>"}
            }"#,
        )
        .unwrap()
    }

    fn same_node(a: &VirtualFileTree, b: &VirtualFileTree, path: &str) -> bool {
        match (a.resolve(path).unwrap(), b.resolve(path).unwrap()) {
            (Node::Directory(x), Node::Directory(y)) => Arc::ptr_eq(x, y),
            (Node::File(x), Node::File(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    #[test]
    fn test_create_file() {
        let tree = sample();
        let next = tree.create_file("src", "a.jsx").unwrap();
        assert_eq!(next.read_file("src/a.jsx").unwrap(), "");
        assert!(!tree.exists("src/a.jsx"));
    }

    #[test]
    fn test_create_file_twice_conflicts() {
        let tree = sample().create_file("src", "a.jsx").unwrap();
        let err = tree.create_file("src", "a.jsx").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NameConflict);
        let listing = tree.list("src").unwrap();
        assert_eq!(listing.files.iter().filter(|f| *f == "a.jsx").count(), 1);
    }

    #[test]
    fn test_create_in_missing_or_file_parent() {
        let tree = sample();
        let err = tree.create_file("lib", "a.jsx").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
        let err = tree.create_folder("src/App.jsx", "x").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
    }

    #[test]
    fn test_root_only_holds_folders() {
        let tree = sample();
        let err = tree.create_file("", "README.md").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidOperation);
        let next = tree.create_folder("", "assets").unwrap();
        assert!(next.resolve("assets").unwrap().is_directory());
        let err = tree.move_node("src/App.jsx", "").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidOperation);
    }

    #[test]
    fn test_create_folder_rejects_bad_names() {
        let tree = sample();
        let err = tree.create_folder("src", "a/b").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidPath);
        let err = tree.create_folder("src", "").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidPath);
    }

    #[test]
    fn test_rename() {
        let tree = sample();
        let next = tree.rename_node("src/App.jsx", "Main.jsx").unwrap();
        assert_eq!(next.read_file("src/Main.jsx").unwrap(), "app");
        assert!(!next.exists("src/App.jsx"));
        // Renamed entries keep their display position.
        assert_eq!(next.list("src").unwrap().files, vec!["Main.jsx"]);
        assert_eq!(tree.read_file("src/App.jsx").unwrap(), "app");
    }

    #[test]
    fn test_rename_conflict_and_missing() {
        let tree = sample().create_file("src", "Other.jsx").unwrap();
        let err = tree.rename_node("src/App.jsx", "Other.jsx").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NameConflict);
        let err = tree.rename_node("src/Nope.jsx", "x.jsx").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
    }

    #[test]
    fn test_delete_subtree() {
        let tree = sample();
        let next = tree.delete_node("src/components").unwrap();
        assert!(!next.exists("src/components"));
        assert!(!next.exists("src/components/Button.jsx"));
        assert!(!next.exists("src/components/forms/Input.jsx"));
        assert!(next.exists("src/App.jsx"));
        assert!(tree.exists("src/components/forms/Input.jsx"));
        let err = next.delete_node("src/components").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
    }

    #[test]
    fn test_move_file_and_folder() {
        let tree = sample();
        let next = tree.move_node("src/App.jsx", "public").unwrap();
        assert_eq!(next.read_file("public/App.jsx").unwrap(), "app");
        assert!(!next.exists("src/App.jsx"));

        let next = tree.move_node("src/components/forms", "src").unwrap();
        assert_eq!(next.read_file("src/forms/Input.jsx").unwrap(), "input");
        assert!(same_node(&tree, &next, "src/components/Button.jsx"));
    }

    #[test]
    fn test_move_into_itself_fails() {
        let tree = sample();
        for dest in ["src/components", "src/components/forms"] {
            let err = tree.move_node("src/components", dest).unwrap_err();
            assert_eq!(err.error_type, DeskErrorType::InvalidOperation);
        }
        let err = tree.move_node("src/App.jsx", "src/App.jsx").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidOperation);
        assert_eq!(tree, sample());
    }

    #[test]
    fn test_move_conflict_and_missing() {
        let tree = sample().create_file("public", "App.jsx").unwrap();
        let err = tree.move_node("src/App.jsx", "public").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NameConflict);
        let err = tree.move_node("src/App.jsx", "nowhere").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
        let err = tree.move_node("src/Gone.jsx", "public").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
    }

    #[test]
    fn test_move_prefix_sibling_is_not_a_cycle() {
        let tree = sample().create_folder("", "src2").unwrap();
        let next = tree.move_node("src", "src2").unwrap();
        assert!(next.exists("src2/src/App.jsx"));
    }

    #[test]
    fn test_update_content() {
        let tree = sample();
        let next = tree.update_file_content("src/App.jsx", "new").unwrap();
        assert_eq!(next.read_file("src/App.jsx").unwrap(), "new");
        assert_eq!(tree.read_file("src/App.jsx").unwrap(), "app");
        let err = tree.update_file_content("src/components", "x").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
    }

    #[test]
    fn test_untouched_paths_are_shared() {
        let tree = sample();
        let ops = vec![
            TreeOp::CreateFile {
                dir_path: "src/components".into(),
                name: "Card.jsx".into(),
            },
            TreeOp::UpdateContent {
                path: "src/components/Button.jsx".into(),
                content: "changed".into(),
            },
            TreeOp::Rename {
                path: "src/App.jsx".into(),
                new_name: "Main.jsx".into(),
            },
            TreeOp::Delete {
                path: "src/components/forms".into(),
            },
        ];
        let mut current = tree.clone();
        for op in ops {
            let next = op.apply(&current).unwrap();
            assert!(same_node(&current, &next, "public"));
            assert!(same_node(&current, &next, "public/index.html"));
            current = next;
        }
        assert_eq!(tree, sample());
    }

    #[test]
    fn test_op_from_json() {
        let op: TreeOp =
            serde_json::from_str(r#"{"op": "move", "from_path": "src/a.jsx", "to_dir_path": "lib"}"#)
                .unwrap();
        assert_eq!(
            op.relocation().unwrap(),
            Relocation::Moved {
                from: "src/a.jsx".into(),
                to: "lib/a.jsx".into()
            }
        );
    }

    #[test]
    fn test_create_folder_depth_limit() {
        let mut tree = VirtualFileTree::new().create_folder("", "d").unwrap();
        let mut path = "d".to_string();
        for _ in 1..MAX_TREE_DEPTH {
            tree = tree.create_folder(&path, "d").unwrap();
            path.push_str("/d");
        }
        assert_eq!(tree.depth(), MAX_TREE_DEPTH);
        let err = tree.create_folder(&path, "d").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidOperation);
        assert!(tree.create_file(&path, "deep.jsx").is_ok());
    }

    #[test]
    fn test_move_depth_limit() {
        let mut tree = VirtualFileTree::new().create_folder("", "d").unwrap();
        let mut path = "d".to_string();
        for _ in 1..MAX_TREE_DEPTH - 1 {
            tree = tree.create_folder(&path, "d").unwrap();
            path.push_str("/d");
        }
        let tree = tree
            .create_folder("", "lib")
            .and_then(|t| t.create_folder("lib", "inner"))
            .unwrap();
        let err = tree.move_node("lib", &path).unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidOperation);
        let next = tree.move_node("lib/inner", &path).unwrap();
        assert_eq!(next.depth(), MAX_TREE_DEPTH);
    }
}
