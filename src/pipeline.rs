use std::sync::Arc;
use tracing::instrument;

use crate::aggregate::aggregate;
use crate::render::{render_document, RuntimeConfig};
use crate::transpile::{CompileError, Target, Transpiler};
use crate::vtree::VirtualFileTree;

/// Tree in, preview document out.
pub(crate) struct BuildPipeline {
    transpiler: Arc<dyn Transpiler>,
    source_extension: String,
    runtime: RuntimeConfig,
}

impl BuildPipeline {
    pub(crate) fn new(
        transpiler: Arc<dyn Transpiler>,
        source_extension: String,
        runtime: RuntimeConfig,
    ) -> BuildPipeline {
        BuildPipeline {
            transpiler,
            source_extension,
            runtime,
        }
    }

    #[instrument(skip(self, tree))]
    pub(crate) fn build(&self, tree: &VirtualFileTree) -> Result<String, CompileError> {
        let unit = aggregate(tree, &self.source_extension);
        tracing::info!("Aggregated {} bytes of source", unit.len());
        let compiled = self
            .transpiler
            .compile(&unit, Target::BrowserComponent)?;
        Ok(render_document(&compiled, &self.runtime))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transpile::{CompiledScript, ScriptKind};

    /// Uppercases the unit, or fails when it contains `syntax error`.
    pub(crate) struct ShoutingTranspiler;

    impl Transpiler for ShoutingTranspiler {
        fn compile(&self, source: &str, _target: Target) -> Result<CompiledScript, CompileError> {
            if source.contains("syntax error") {
                return Err(CompileError::new("Unexpected token (1:7)"));
            }
            Ok(CompiledScript {
                code: source.to_uppercase(),
                kind: ScriptKind::Compiled,
            })
        }
    }

    pub(crate) fn shouting_pipeline() -> BuildPipeline {
        BuildPipeline::new(
            Arc::new(ShoutingTranspiler),
            ".jsx".to_string(),
            RuntimeConfig::default(),
        )
    }

    #[test]
    fn test_build() {
        let tree: VirtualFileTree = serde_json::from_str(
            r#"{"src": {"App.jsx": "app()", "index.jsx": "mount()"}, "public": {"index.html": "<p/>"}}"#,
        )
        .unwrap();
        let doc = shouting_pipeline().build(&tree).unwrap();
        assert!(doc.contains("<script>APP()\nMOUNT()\n</script>"));
        assert!(!doc.contains("<p/>"));
    }

    #[test]
    fn test_build_failure() {
        let tree: VirtualFileTree =
            serde_json::from_str(r#"{"src": {"App.jsx": "syntax error"}}"#).unwrap();
        let err = shouting_pipeline().build(&tree).unwrap_err();
        assert_eq!(err.message, "Unexpected token (1:7)");
    }
}
