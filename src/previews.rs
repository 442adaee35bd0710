// The execution surface hands out one URL per rendered document. The browser
// loads it in an iframe; the sandbox header keeps scripts on and everything
// else off.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub(crate) const SANDBOX_POLICY: &str = "sandbox allow-scripts";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct PreviewHandle {
    pub(crate) id: String,
    pub(crate) url: String,
}

pub(crate) struct PreviewSurface {
    base_path: String,
    documents: Mutex<HashMap<String, Arc<str>>>,
}

impl PreviewSurface {
    pub(crate) fn new(base_path: &str) -> PreviewSurface {
        PreviewSurface {
            base_path: base_path.trim_end_matches('/').to_string(),
            documents: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn publish(&self, document: String) -> PreviewHandle {
        let id = Uuid::new_v4().to_string();
        let url = format!("{}/{}", self.base_path, id);
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), Arc::from(document));
        tracing::info!("Published preview {}", id);
        PreviewHandle { id, url }
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<str>> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub(crate) fn release(&self, handle: &PreviewHandle) -> bool {
        let removed = self
            .documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.id)
            .is_some();
        if removed {
            tracing::info!("Released preview {}", handle.id);
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.documents.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_release() {
        let surface = PreviewSurface::new("/previews/");
        let handle = surface.publish("<html></html>".to_string());
        assert_eq!(handle.url, format!("/previews/{}", handle.id));
        assert_eq!(&*surface.get(&handle.id).unwrap(), "<html></html>");
        assert!(surface.release(&handle));
        assert!(surface.get(&handle.id).is_none());
        assert!(!surface.release(&handle));
        assert_eq!(surface.len(), 0);
    }
}
