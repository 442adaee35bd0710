// Editing sessions. A session owns one working copy of a project, the path open
// in the editor, the last run's diagnostics and the live preview handle. All
// changes go through the session so the selection and the preview stay in step
// with the tree.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

use crate::errors::{DeskError, Result};
use crate::mutator::{Relocation, TreeOp};
use crate::pipeline::BuildPipeline;
use crate::previews::{PreviewHandle, PreviewSurface};
use crate::project::Project;
use crate::storage::{NewProject, ProjectRecord, ProjectStore};
use crate::vtree::{normalize_path, Listing, Node};

const DEFAULT_SELECTION: &str = "src/App.jsx";

/// What sessions need from the rest of the service.
pub(crate) struct Services {
    pub(crate) store: Arc<dyn ProjectStore>,
    pub(crate) previews: Arc<PreviewSurface>,
    pub(crate) pipeline: BuildPipeline,
    pub(crate) require_license: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct RunReport {
    pub(crate) success: bool,
    pub(crate) preview_url: Option<String>,
    pub(crate) diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SessionView {
    pub(crate) session_id: String,
    pub(crate) owner_id: String,
    pub(crate) project: Project,
    pub(crate) selected: Option<String>,
    pub(crate) diagnostics: Vec<String>,
    pub(crate) preview_url: Option<String>,
}

pub(crate) struct Session {
    id: String,
    owner_id: String,
    project: Project,
    selected: Option<String>,
    diagnostics: Vec<String>,
    preview: Option<PreviewHandle>,
}

/// Rewrites `path` if it is `from` or lives under it.
fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    path.strip_prefix(from)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| format!("{}/{}", to, rest))
}

fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .map_or(false, |rest| rest.starts_with('/'))
}

impl Session {
    pub(crate) fn new(id: String, owner_id: String, project: Project) -> Session {
        let selected = match project.tree.resolve(DEFAULT_SELECTION) {
            Ok(Node::File(_)) => Some(DEFAULT_SELECTION.to_string()),
            _ => None,
        };
        Session {
            id,
            owner_id,
            project,
            selected,
            diagnostics: Vec::new(),
            preview: None,
        }
    }

    pub(crate) fn project(&self) -> &Project {
        &self.project
    }

    pub(crate) fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub(crate) fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub(crate) fn preview(&self) -> Option<&PreviewHandle> {
        self.preview.as_ref()
    }

    pub(crate) fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            project: self.project.clone(),
            selected: self.selected.clone(),
            diagnostics: self.diagnostics.clone(),
            preview_url: self.preview.as_ref().map(|p| p.url.clone()),
        }
    }

    /// Applies one tree operation and moves the selection along with it.
    #[instrument(skip(self), fields(session = %self.id))]
    pub(crate) fn apply(&mut self, op: &TreeOp) -> Result<()> {
        let tree = op.apply(&self.project.tree)?;
        let relocation = op.relocation()?;
        self.project.tree = tree;
        if let Some(selected) = self.selected.take() {
            self.selected = match relocation {
                Relocation::Moved { from, to } => {
                    Some(rebase(&selected, &from, &to).unwrap_or(selected))
                }
                Relocation::Removed(path) if is_within(&selected, &path) => None,
                _ => Some(selected),
            };
        }
        Ok(())
    }

    /// Opens a file in the editor, or clears the selection with `None`.
    pub(crate) fn select(&mut self, path: Option<&str>) -> Result<()> {
        self.selected = match path {
            None => None,
            Some(path) => match self.project.tree.resolve(path)? {
                Node::File(_) => Some(normalize_path(path)?),
                Node::Directory(_) => {
                    return Err(DeskError::invalid_operation(format!(
                        "{} is a folder and cannot be opened",
                        path
                    )))
                }
            },
        };
        Ok(())
    }

    pub(crate) fn read_file(&self, path: &str) -> Result<String> {
        self.project.tree.read_file(path).map(String::from)
    }

    pub(crate) fn list(&self, dir_path: &str) -> Result<Listing> {
        self.project.tree.list(dir_path)
    }

    pub(crate) fn set_name(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(DeskError::bad_request("Project name cannot be empty"));
        }
        self.project.name = name.trim().to_string();
        Ok(())
    }

    pub(crate) fn set_license(&mut self, license: &str) {
        self.project.license = license.to_string();
    }

    /// Builds the tree and swaps in a fresh preview. A failed build keeps the
    /// old preview and records the compiler's message.
    #[instrument(skip(self, services), fields(session = %self.id))]
    pub(crate) fn run(&mut self, services: &Services) -> RunReport {
        match services.pipeline.build(&self.project.tree) {
            Ok(document) => {
                let handle = services.previews.publish(document);
                if let Some(previous) = self.preview.replace(handle) {
                    services.previews.release(&previous);
                }
                self.diagnostics.clear();
                RunReport {
                    success: true,
                    preview_url: self.preview.as_ref().map(|p| p.url.clone()),
                    diagnostics: Vec::new(),
                }
            }
            Err(e) => {
                tracing::info!("Build failed: {}", e);
                self.diagnostics = vec![e.message];
                RunReport {
                    success: false,
                    preview_url: self.preview.as_ref().map(|p| p.url.clone()),
                    diagnostics: self.diagnostics.clone(),
                }
            }
        }
    }

    #[instrument(skip(self, services), fields(session = %self.id))]
    pub(crate) fn save(&self, services: &Services) -> Result<ProjectRecord> {
        if services.require_license && !self.project.has_license() {
            return Err(DeskError::invalid_operation(
                "Please add a license before saving",
            ));
        }
        let result = services.store.upsert_project(NewProject {
            owner_id: self.owner_id.clone(),
            project_name: self.project.name.clone(),
            license: self.project.license.clone(),
            files: self.project.tree.clone(),
        });
        if let Err(e) = &result {
            tracing::error!("Failed to save project {}: {}", self.project.name, e);
        }
        result
    }

    pub(crate) fn release_preview(&mut self, previews: &PreviewSurface) {
        if let Some(handle) = self.preview.take() {
            previews.release(&handle);
        }
    }
}

pub(crate) fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_used: Instant,
}

pub(crate) struct SessionManager {
    sessions: HashMap<String, SessionSlot>,
    services: Arc<Services>,
}

impl SessionManager {
    pub(crate) fn new(services: Arc<Services>) -> SessionManager {
        SessionManager {
            sessions: HashMap::new(),
            services,
        }
    }

    pub(crate) fn services(&self) -> Arc<Services> {
        self.services.clone()
    }

    fn insert(&mut self, owner_id: &str, project: Project) -> Arc<Mutex<Session>> {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(Session::new(
            id.clone(),
            owner_id.to_string(),
            project,
        )));
        self.sessions.insert(
            id.clone(),
            SessionSlot {
                session: session.clone(),
                last_used: Instant::now(),
            },
        );
        tracing::info!("Opened session {} for {}", id, owner_id);
        session
    }

    /// Starts a session on the seed project.
    #[instrument(skip(self))]
    pub(crate) fn open(&mut self, owner_id: &str) -> Result<Arc<Mutex<Session>>> {
        if owner_id.trim().is_empty() {
            return Err(DeskError::bad_request("owner_id is required"));
        }
        Ok(self.insert(owner_id, Project::seed()))
    }

    /// Starts a session on a stored project, replacing the seed tree wholesale.
    #[instrument(skip(self))]
    pub(crate) fn open_stored(
        &mut self,
        owner_id: &str,
        project_name: &str,
    ) -> Result<Arc<Mutex<Session>>> {
        let record = self.services.store.find_project(owner_id, project_name)?;
        let project = Project {
            name: record.project_name,
            license: record.license,
            tree: record.files,
        };
        Ok(self.insert(owner_id, project))
    }

    /// Looks a session up and marks it as used.
    pub(crate) fn get(&mut self, id: &str) -> Result<Arc<Mutex<Session>>> {
        let slot = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| DeskError::not_found(format!("Session {} does not exist", id)))?;
        slot.last_used = Instant::now();
        Ok(slot.session.clone())
    }

    /// Forgets a session without touching its lock. The caller releases its
    /// preview once it holds the session.
    #[instrument(skip(self))]
    pub(crate) fn remove(&mut self, id: &str) -> Result<Arc<Mutex<Session>>> {
        let slot = self
            .sessions
            .remove(id)
            .ok_or_else(|| DeskError::not_found(format!("Session {} does not exist", id)))?;
        tracing::info!("Closed session {}", id);
        Ok(slot.session)
    }

    pub(crate) fn close(&mut self, id: &str) -> Result<()> {
        let session = self.remove(id)?;
        lock_session(&session).release_preview(&self.services.previews);
        Ok(())
    }

    /// Closes sessions nobody has used for `max_idle`. Sessions a request is
    /// holding right now are left alone.
    #[instrument(skip(self))]
    pub(crate) fn expire_idle(&mut self, max_idle: Duration) -> usize {
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, slot)| {
                slot.last_used.elapsed() >= max_idle && Arc::strong_count(&slot.session) == 1
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            if let Err(e) = self.close(id) {
                tracing::error!("Failed to expire session {}: {}", id, e);
            }
        }
        if !idle.is_empty() {
            tracing::info!("Expired {} idle sessions", idle.len());
        }
        idle.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }
}
