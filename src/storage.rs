// Persistence for published projects and their comments. The service only needs
// four things from a store: upsert by key, list everything newest first, list
// comments for one project oldest first, and insert a comment.

use chrono::{DateTime, Utc};
use ciborium::{from_reader, into_writer};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use sled::Db;
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::{DeskError, Result};
use crate::vtree::{VirtualFileTree, MAX_TREE_DEPTH};

const PROJECT_PREFIX: &str = "project/";
const PROJECT_KEY_PREFIX: &str = "project_key/";
const COMMENT_PREFIX: &str = "comment/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct ProjectRecord {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) project_name: String,
    pub(crate) license: String,
    pub(crate) files: VirtualFileTree,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct CommentRecord {
    pub(crate) id: String,
    pub(crate) project_id: String,
    pub(crate) user_id: String,
    pub(crate) content: String,
    pub(crate) created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewProject {
    pub(crate) owner_id: String,
    pub(crate) project_name: String,
    pub(crate) license: String,
    pub(crate) files: VirtualFileTree,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NewComment {
    pub(crate) user_id: String,
    pub(crate) content: String,
}

pub(crate) trait ProjectStore: Send + Sync {
    /// Inserts or replaces the project stored under `(owner_id, project_name)`.
    /// A replaced project keeps its id and creation time.
    fn upsert_project(&self, project: NewProject) -> Result<ProjectRecord>;
    fn get_project(&self, id: &str) -> Result<ProjectRecord>;
    fn find_project(&self, owner_id: &str, project_name: &str) -> Result<ProjectRecord>;
    /// Every project, newest first.
    fn list_projects(&self) -> Result<Vec<ProjectRecord>>;
    /// Comments on one project, oldest first.
    fn list_comments(&self, project_id: &str) -> Result<Vec<CommentRecord>>;
    fn insert_comment(&self, project_id: &str, comment: NewComment) -> Result<CommentRecord>;
}

pub(crate) struct SledStore {
    db: Db,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    into_writer(value, &mut bytes).map_err(|e| {
        tracing::error!("Failed to serialize record: {}", e);
        DeskError::from(e)
    })?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    from_reader(bytes).map_err(|e| {
        tracing::error!("Failed to deserialize record: {}", e);
        DeskError::from(e)
    })
}

fn project_key(id: &str) -> String {
    format!("{}{}", PROJECT_PREFIX, id)
}

fn owner_key(owner_id: &str, project_name: &str) -> String {
    format!("{}{}\u{1f}{}", PROJECT_KEY_PREFIX, owner_id, project_name)
}

fn comment_prefix(project_id: &str) -> String {
    format!("{}{}/", COMMENT_PREFIX, project_id)
}

impl SledStore {
    #[instrument]
    pub(crate) fn open(path: &Path) -> Result<SledStore> {
        let db = sled::open(path).map_err(|e| {
            tracing::error!("Sled failed to open database at {}: {}", path.display(), e);
            DeskError::persistence(format!("Failed to open database at {}", path.display()))
        })?;
        Ok(SledStore { db })
    }

    #[cfg(test)]
    pub(crate) fn temporary() -> SledStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledStore { db }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Records that no longer decode are logged and left out.
    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, bytes) = entry?;
            match decode(&bytes) {
                Ok(record) => records.push(record),
                Err(_) => tracing::error!(
                    "Skipping unreadable record {}",
                    String::from_utf8_lossy(&key)
                ),
            }
        }
        Ok(records)
    }
}

impl ProjectStore for SledStore {
    #[instrument(skip(self, project), fields(owner_id = %project.owner_id, project_name = %project.project_name))]
    fn upsert_project(&self, project: NewProject) -> Result<ProjectRecord> {
        if project.files.depth() > MAX_TREE_DEPTH {
            return Err(DeskError::invalid_operation(format!(
                "Folders cannot nest deeper than {} levels",
                MAX_TREE_DEPTH
            )));
        }
        let key = owner_key(&project.owner_id, &project.project_name);
        let now = Utc::now();

        // Lookup and both writes commit together; a racing save of the same
        // key retries against the winner's record.
        let result = self
            .db
            .transaction(|tx| -> ConflictableTransactionResult<ProjectRecord, DeskError> {
                let existing: Option<ProjectRecord> = match tx.get(key.as_bytes())? {
                    Some(id) => match tx.get(project_key(&String::from_utf8_lossy(&id)).as_bytes())? {
                        Some(bytes) => {
                            Some(decode(&bytes).map_err(ConflictableTransactionError::Abort)?)
                        }
                        None => None,
                    },
                    None => None,
                };
                let (id, created_at) = match existing {
                    Some(record) => (record.id, record.created_at),
                    None => (Uuid::new_v4().to_string(), now),
                };
                let record = ProjectRecord {
                    id,
                    owner_id: project.owner_id.clone(),
                    project_name: project.project_name.clone(),
                    license: project.license.clone(),
                    files: project.files.clone(),
                    created_at,
                    updated_at: now,
                };
                let bytes = encode(&record).map_err(ConflictableTransactionError::Abort)?;
                tx.insert(project_key(&record.id).as_bytes(), bytes)?;
                tx.insert(key.as_bytes(), record.id.as_bytes())?;
                Ok(record)
            });
        let record = result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => DeskError::from(e),
        })?;
        self.db.flush()?;
        tracing::info!("Saved project {} as {}", record.project_name, record.id);
        Ok(record)
    }

    fn get_project(&self, id: &str) -> Result<ProjectRecord> {
        self.read(&project_key(id))?
            .ok_or_else(|| DeskError::not_found(format!("Project {} does not exist", id)))
    }

    fn find_project(&self, owner_id: &str, project_name: &str) -> Result<ProjectRecord> {
        match self.db.get(owner_key(owner_id, project_name).as_bytes())? {
            Some(id) => self.get_project(&String::from_utf8_lossy(&id)),
            None => Err(DeskError::not_found(format!(
                "{} has no project named {}",
                owner_id, project_name
            ))),
        }
    }

    #[instrument(skip(self))]
    fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let mut projects: Vec<ProjectRecord> = self.scan(PROJECT_PREFIX)?;
        projects.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(projects)
    }

    #[instrument(skip(self))]
    fn list_comments(&self, project_id: &str) -> Result<Vec<CommentRecord>> {
        self.scan(&comment_prefix(project_id))
    }

    #[instrument(skip(self, comment), fields(user_id = %comment.user_id))]
    fn insert_comment(&self, project_id: &str, comment: NewComment) -> Result<CommentRecord> {
        if comment.content.trim().is_empty() {
            return Err(DeskError::bad_request("Comment is empty"));
        }
        if comment.user_id.trim().is_empty() {
            return Err(DeskError::bad_request("Comments need a user id"));
        }
        self.get_project(project_id)?;
        // sled ids only grow, so keys sort in insertion order.
        let sequence = self.db.generate_id()?;
        let record = CommentRecord {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            user_id: comment.user_id,
            content: comment.content,
            created_at: Utc::now(),
        };
        let key = format!("{}{:020}", comment_prefix(project_id), sequence);
        self.db.insert(key.as_bytes(), encode(&record)?)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeskErrorType;
    use crate::project::Project;
    use crate::vtree::tests::nested_tree;
    use std::sync::{Arc, Barrier};

    fn new_project(owner: &str, name: &str) -> NewProject {
        NewProject {
            owner_id: owner.to_string(),
            project_name: name.to_string(),
            license: "MIT".to_string(),
            files: Project::seed().tree,
        }
    }

    fn comment(user: &str, content: &str) -> NewComment {
        NewComment {
            user_id: user.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_upsert_keeps_identity() {
        let store = SledStore::temporary();
        let first = store.upsert_project(new_project("ada", "Demo")).unwrap();
        let mut changed = new_project("ada", "Demo");
        changed.license = "Apache-2.0".to_string();
        changed.files = changed.files.delete_node("public").unwrap();
        let second = store.upsert_project(changed).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        let stored = store.get_project(&first.id).unwrap();
        assert_eq!(stored.license, "Apache-2.0");
        assert!(!stored.files.exists("public"));
        assert_eq!(store.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_is_keyed_by_owner_and_name() {
        let store = SledStore::temporary();
        let a = store.upsert_project(new_project("ada", "Demo")).unwrap();
        let b = store.upsert_project(new_project("bob", "Demo")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.find_project("bob", "Demo").unwrap().id, b.id);
        let err = store.find_project("bob", "Other").unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
    }

    #[test]
    fn test_list_newest_first() {
        let store = SledStore::temporary();
        let first = store.upsert_project(new_project("ada", "One")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.upsert_project(new_project("ada", "Two")).unwrap();
        let ids: Vec<String> = store
            .list_projects()
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_comments_oldest_first_per_project() {
        let store = SledStore::temporary();
        let a = store.upsert_project(new_project("ada", "One")).unwrap();
        let b = store.upsert_project(new_project("ada", "Two")).unwrap();
        for n in 0..12 {
            store
                .insert_comment(&a.id, comment("bob", &format!("comment {}", n)))
                .unwrap();
        }
        store.insert_comment(&b.id, comment("eve", "elsewhere")).unwrap();
        let comments = store.list_comments(&a.id).unwrap();
        assert_eq!(comments.len(), 12);
        assert_eq!(comments[0].content, "comment 0");
        assert_eq!(comments[11].content, "comment 11");
        assert!(comments.iter().all(|c| c.project_id == a.id));
    }

    #[test]
    fn test_comment_validation() {
        let store = SledStore::temporary();
        let a = store.upsert_project(new_project("ada", "One")).unwrap();
        let err = store.insert_comment(&a.id, comment("bob", "   ")).unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::BadRequest);
        let err = store.insert_comment("missing", comment("bob", "hi")).unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::NotFound);
    }

    #[test]
    fn test_too_deep_tree_is_not_saved() {
        let store = SledStore::temporary();
        let mut project = new_project("ada", "Deep");
        project.files = nested_tree(MAX_TREE_DEPTH + 1);
        let err = store.upsert_project(project).unwrap_err();
        assert_eq!(err.error_type, DeskErrorType::InvalidOperation);
        assert!(store.list_projects().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_record_does_not_hide_the_rest() {
        let store = SledStore::temporary();
        let good = store.upsert_project(new_project("ada", "Good")).unwrap();
        store
            .db
            .insert(project_key("broken").as_bytes(), &b"not cbor"[..])
            .unwrap();
        let projects = store.list_projects().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, good.id);
    }

    #[test]
    fn test_concurrent_saves_share_one_record() {
        let store = Arc::new(SledStore::temporary());
        for round in 0..20 {
            let name = format!("Demo{}", round);
            let barrier = Arc::new(Barrier::new(8));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    let barrier = barrier.clone();
                    let name = name.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.upsert_project(new_project("ada", &name)).unwrap().id
                    })
                })
                .collect();
            let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert!(ids.iter().all(|id| id == &ids[0]));
        }
        assert_eq!(store.list_projects().unwrap().len(), 20);
    }
}
