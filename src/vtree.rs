// Definition of the virtual project tree. Folders map names to children and keep
// the order children were added in, files hold their text contents.

// Trees are values. Every node is reference counted, so copying a tree is cheap
// and a mutation only copies the folders along the path it touches.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::errors::{DeskError, Result};

/// Deepest folder nesting a tree may have. Stored records nest one level per
/// folder and the decoder gives up well past this.
pub(crate) const MAX_TREE_DEPTH: usize = 64;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^/\x00]+$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    File(Arc<str>),
    Directory(Arc<Directory>),
}

impl Node {
    pub(crate) fn empty_file() -> Node {
        Node::File(Arc::from(""))
    }

    pub(crate) fn empty_directory() -> Node {
        Node::Directory(Arc::new(Directory::default()))
    }

    pub(crate) fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    /// Folder levels this node adds: 0 for a file, 1 for an empty folder.
    pub(crate) fn depth(&self) -> usize {
        match self {
            Node::File(_) => 0,
            Node::Directory(d) => 1 + d.iter().map(|(_, child)| child.depth()).max().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Directory {
    entries: Vec<(String, Node)>,
}

impl Directory {
    pub(crate) fn get(&self, name: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, node)| node)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.entries
            .iter_mut()
            .find(|(entry, _)| entry == name)
            .map(|(_, node)| node)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Appends a child. Callers check for name conflicts first.
    pub(crate) fn push(&mut self, name: String, node: Node) {
        debug_assert!(!self.contains(&name));
        self.entries.push((name, node));
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Node> {
        let index = self.entries.iter().position(|(entry, _)| entry == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Renames a child in place, keeping its display position.
    pub(crate) fn rename(&mut self, name: &str, new_name: String) -> bool {
        match self.entries.iter_mut().find(|(entry, _)| entry == name) {
            Some(entry) => {
                entry.0 = new_name;
                true
            }
            None => false,
        }
    }
}

/// Files and folders directly inside a folder, in display order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct Listing {
    pub(crate) folders: Vec<String>,
    pub(crate) files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VirtualFileTree {
    root: Node,
}

impl Default for VirtualFileTree {
    fn default() -> Self {
        VirtualFileTree {
            root: Node::empty_directory(),
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name == "." || name == ".." || !NAME_PATTERN.is_match(name) {
        return Err(DeskError::invalid_path(format!(
            "`{}` is not a valid file or folder name",
            name
        )));
    }
    Ok(())
}

/// Splits a project path into its segments. Leading and trailing slashes are
/// ignored and the empty path is the root.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    for segment in &segments {
        if segment.is_empty() {
            return Err(DeskError::invalid_path(format!(
                "Path {} contains an empty segment",
                path
            )));
        }
        validate_name(segment)?;
    }
    Ok(segments)
}

pub(crate) fn normalize_path(path: &str) -> Result<String> {
    Ok(split_path(path)?.join("/"))
}

pub(crate) fn join_path(dir_path: &str, name: &str) -> String {
    if dir_path.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir_path, name)
    }
}

impl VirtualFileTree {
    pub(crate) fn new() -> VirtualFileTree {
        VirtualFileTree::default()
    }

    pub(crate) fn root(&self) -> &Directory {
        match &self.root {
            Node::Directory(d) => d,
            Node::File(_) => unreachable!("tree root is always a directory"),
        }
    }

    pub(crate) fn resolve(&self, path: &str) -> Result<&Node> {
        let segments = split_path(path)?;
        self.resolve_segments(&segments)
    }

    pub(crate) fn resolve_segments(&self, segments: &[&str]) -> Result<&Node> {
        let mut current = &self.root;
        for (depth, segment) in segments.iter().enumerate() {
            let folder = match current {
                Node::Directory(d) => d,
                Node::File(_) => {
                    let msg = format!("{} is a file", segments[..depth].join("/"));
                    tracing::info!("{}", msg);
                    return Err(DeskError::invalid_path(msg));
                }
            };
            current = match folder.get(segment) {
                Some(child) => child,
                None => {
                    let msg = format!("Path {} does not exist", segments[..=depth].join("/"));
                    tracing::info!("{}", msg);
                    return Err(DeskError::not_found(msg));
                }
            };
        }
        Ok(current)
    }

    /// Deepest folder nesting below the root.
    pub(crate) fn depth(&self) -> usize {
        self.root()
            .iter()
            .map(|(_, child)| child.depth())
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    pub(crate) fn read_file(&self, path: &str) -> Result<&str> {
        match self.resolve(path)? {
            Node::File(contents) => Ok(contents),
            Node::Directory(_) => Err(DeskError::not_found(format!("{} is a folder", path))),
        }
    }

    pub(crate) fn list(&self, dir_path: &str) -> Result<Listing> {
        let folder = match self.resolve(dir_path)? {
            Node::Directory(d) => d,
            Node::File(_) => {
                return Err(DeskError::invalid_path(format!("Path {} is a file", dir_path)))
            }
        };
        let mut folders = Vec::new();
        let mut files = Vec::new();
        for (name, child) in folder.iter() {
            match child {
                Node::Directory(_) => folders.push(name.to_string()),
                Node::File(_) => files.push(name.to_string()),
            }
        }
        Ok(Listing { folders, files })
    }

    /// Walks to the folder at `segments`, copying each folder on the way that
    /// is still shared with another tree.
    pub(crate) fn directory_mut(&mut self, segments: &[&str]) -> Result<&mut Directory> {
        let mut current = match &mut self.root {
            Node::Directory(d) => Arc::make_mut(d),
            Node::File(_) => unreachable!("tree root is always a directory"),
        };
        for segment in segments {
            current = match current.get_mut(segment) {
                Some(Node::Directory(d)) => Arc::make_mut(d),
                Some(Node::File(_)) => {
                    return Err(DeskError::invalid_path(format!("{} is a file", segment)))
                }
                None => {
                    return Err(DeskError::not_found(format!(
                        "Folder {} does not exist",
                        segment
                    )))
                }
            };
        }
        Ok(current)
    }
}

impl Serialize for Directory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, node) in &self.entries {
            map.serialize_entry(name, node)?;
        }
        map.end()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Node::File(contents) => serializer.serialize_str(contents),
            Node::Directory(d) => d.serialize(serializer),
        }
    }
}

impl Serialize for VirtualFileTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("file contents or a mapping of folder entries")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Node, E> {
        Ok(Node::File(Arc::from(v)))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Node, E> {
        Ok(Node::File(Arc::from(v)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Node, A::Error> {
        let mut folder = Directory::default();
        while let Some((name, node)) = access.next_entry::<String, Node>()? {
            validate_name(&name).map_err(|e| de::Error::custom(e.message))?;
            if folder.contains(&name) {
                return Err(de::Error::custom(format!("duplicate entry `{}`", name)));
            }
            folder.entries.push((name, node));
        }
        Ok(Node::Directory(Arc::new(folder)))
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Node, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

impl<'de> Deserialize<'de> for VirtualFileTree {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<VirtualFileTree, D::Error> {
        let root = Node::deserialize(deserializer)?;
        match &root {
            Node::File(_) => Err(de::Error::custom("project files must be a folder mapping")),
            Node::Directory(d) => {
                if let Some((name, _)) = d.iter().find(|(_, child)| !child.is_directory()) {
                    return Err(de::Error::custom(format!(
                        "`{}` is a file, only folders may live at the project root",
                        name
                    )));
                }
                let tree = VirtualFileTree { root };
                if tree.depth() > MAX_TREE_DEPTH {
                    return Err(de::Error::custom(format!(
                        "folders nest deeper than {} levels",
                        MAX_TREE_DEPTH
                    )));
                }
                Ok(tree)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::DeskErrorType;

    /// `root/a/.../a` where the last `a` is a file and `depth` counts the
    /// folders. Built without the depth checks.
    pub(crate) fn nested_tree(depth: usize) -> VirtualFileTree {
        let mut node = Node::File(Arc::from("leaf"));
        for name in std::iter::repeat("a").take(depth).chain(std::iter::once("root")) {
            let mut folder = Directory::default();
            folder.push(name.to_string(), node);
            node = Node::Directory(Arc::new(folder));
        }
        VirtualFileTree { root: node }
    }

    fn sample() -> VirtualFileTree {
        serde_json::from_str(
            r#"{"src": {"App.jsx": "app", "components": {"Button.jsx": "btn"}}, "public": {"index.html": "<div/>"}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve() {
        let tree = sample();
        assert_eq!(tree.read_file("src/components/Button.jsx").unwrap(), "btn");
        assert!(tree.resolve("src/components").unwrap().is_directory());
        assert!(tree.resolve("").unwrap().is_directory());
    }

    #[test]
    fn test_resolve_missing() {
        let tree = sample();
        let err = tree.resolve("src/Missing.jsx").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
    }

    #[test]
    fn test_resolve_through_file() {
        let tree = sample();
        let err = tree.resolve("src/App.jsx/inner").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidPath);
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/src/App.jsx/").unwrap(), vec!["src", "App.jsx"]);
        assert!(split_path("").unwrap().is_empty());
        let err = split_path("src//App.jsx").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidPath);
        assert!(split_path("src/../etc").is_err());
    }

    #[test]
    fn test_list_keeps_display_order() {
        let tree = sample();
        let listing = tree.list("src").unwrap();
        assert_eq!(listing.files, vec!["App.jsx"]);
        assert_eq!(listing.folders, vec!["components"]);
        let root = tree.list("").unwrap();
        assert_eq!(root.folders, vec!["src", "public"]);
    }

    #[test]
    fn test_serialized_form_keeps_order() {
        let tree = sample();
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(
            json,
            r#"{"src":{"App.jsx":"app","components":{"Button.jsx":"btn"}},"public":{"index.html":"<div/>"}}"#
        );
    }

    #[test]
    fn test_root_files_rejected() {
        let result = serde_json::from_str::<VirtualFileTree>(r#"{"README.md": "hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_depth() {
        assert_eq!(sample().depth(), 2);
        assert_eq!(VirtualFileTree::new().depth(), 0);
        assert_eq!(nested_tree(3).depth(), 3);
    }

    #[test]
    fn test_too_deep_rejected_on_load() {
        let deep = serde_json::to_string(&nested_tree(MAX_TREE_DEPTH + 1)).unwrap();
        assert!(serde_json::from_str::<VirtualFileTree>(&deep).is_err());
        let ok = serde_json::to_string(&nested_tree(MAX_TREE_DEPTH)).unwrap();
        assert!(serde_json::from_str::<VirtualFileTree>(&ok).is_ok());
    }

    #[test]
    fn test_cbor_round_trip() {
        let tree = sample();
        let mut bytes = Vec::new();
        ciborium::into_writer(&tree, &mut bytes).unwrap();
        let decoded: VirtualFileTree = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(decoded, tree);
    }
}
