use serde::{Deserialize, Serialize};

use crate::vtree::VirtualFileTree;

pub(crate) const SEED_PROJECT_NAME: &str = "MyApp";

const SEED_APP: &str = "import React from 'react';\nexport default function App() { return <h1>Hello World!</h1>; }";
const SEED_INDEX: &str = "import ReactDOM from 'react-dom';\nimport App from './App';\nReactDOM.render(<App />, document.getElementById('root'));";
const SEED_HTML: &str = "<div id='root'></div>";

/// A project being edited. The tree is serialized as `files`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Project {
    #[serde(rename = "project_name")]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) license: String,
    #[serde(rename = "files")]
    pub(crate) tree: VirtualFileTree,
}

impl Project {
    /// The layout every new editing session starts from.
    pub(crate) fn seed() -> Project {
        let tree = VirtualFileTree::new()
            .create_folder("", "src")
            .and_then(|t| t.create_file("src", "App.jsx"))
            .and_then(|t| t.update_file_content("src/App.jsx", SEED_APP))
            .and_then(|t| t.create_file("src", "index.jsx"))
            .and_then(|t| t.update_file_content("src/index.jsx", SEED_INDEX))
            .and_then(|t| t.create_folder("", "public"))
            .and_then(|t| t.create_file("public", "index.html"))
            .and_then(|t| t.update_file_content("public/index.html", SEED_HTML))
            .unwrap_or_default();
        Project {
            name: SEED_PROJECT_NAME.to_string(),
            license: String::new(),
            tree,
        }
    }

    pub(crate) fn has_license(&self) -> bool {
        !self.license.trim().is_empty()
    }
}
