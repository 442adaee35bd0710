use once_cell::sync::Lazy;
use regex::Regex;

use crate::transpile::{CompiledScript, ScriptKind};

static SCRIPT_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(script)").unwrap());

pub(crate) const REACT_UMD: &str = "https://unpkg.com/react@18/umd/react.development.js";
pub(crate) const REACT_DOM_UMD: &str =
    "https://unpkg.com/react-dom@18/umd/react-dom.development.js";
pub(crate) const BABEL_STANDALONE: &str = "https://unpkg.com/@babel/standalone/babel.min.js";

/// Scripts the compiled code expects to find as globals, and where it mounts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RuntimeConfig {
    pub(crate) mount_id: String,
    pub(crate) scripts: Vec<String>,
    pub(crate) babel_script: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            mount_id: "root".to_string(),
            scripts: vec![REACT_UMD.to_string(), REACT_DOM_UMD.to_string()],
            babel_script: BABEL_STANDALONE.to_string(),
        }
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// `<!--` would let a later `<script` swallow the closing tag.
fn escape_inline_script(code: &str) -> String {
    let code = code.replace("<!--", "<\\!--");
    SCRIPT_CLOSE.replace_all(&code, "<\\/$1").into_owned()
}

/// Builds the preview page: a mount point, the runtime script tags, and the
/// compiled code inline.
pub(crate) fn render_document(compiled: &CompiledScript, runtime: &RuntimeConfig) -> String {
    let mut html = String::from("<!DOCTYPE html>\n<html>\n  <head><meta charset=\"UTF-8\" /></head>\n  <body>\n");
    html.push_str(&format!(
        "    <div id=\"{}\"></div>\n",
        escape_attribute(&runtime.mount_id)
    ));
    let mut scripts: Vec<&str> = runtime.scripts.iter().map(String::as_str).collect();
    if compiled.kind == ScriptKind::DeferredBabel {
        scripts.push(&runtime.babel_script);
    }
    for src in scripts {
        html.push_str(&format!(
            "    <script crossorigin src=\"{}\"></script>\n",
            escape_attribute(src)
        ));
    }
    let open_tag = match compiled.kind {
        ScriptKind::Compiled => "<script>",
        ScriptKind::DeferredBabel => "<script type=\"text/babel\">",
    };
    html.push_str("    ");
    html.push_str(open_tag);
    html.push_str(&escape_inline_script(&compiled.code));
    html.push_str("</script>\n  </body>\n</html>\n");
    html
}
