// The seam between the build pipeline and whatever turns component source into
// browser script. Nothing here parses source; implementations hand the unit to
// an engine and report what it said.

use std::io::Write;
use std::process::{Command, Stdio};
use tracing::instrument;

use crate::errors::{DeskError, DeskErrorType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Target {
    BrowserComponent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ScriptKind {
    /// Ready to run as a plain script.
    Compiled,
    /// Still component source; compiled by the Babel runtime inside the page.
    DeferredBabel,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledScript {
    pub(crate) code: String,
    pub(crate) kind: ScriptKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompileError {
    pub(crate) message: String,
}

impl CompileError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        CompileError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<CompileError> for DeskError {
    fn from(error: CompileError) -> Self {
        DeskError::new(DeskErrorType::CompileError, error.message)
    }
}

pub(crate) trait Transpiler: Send + Sync {
    fn compile(&self, source: &str, target: Target) -> Result<CompiledScript, CompileError>;
}

/// Runs an external program that reads the unit on stdin and writes the
/// compiled script to stdout.
#[derive(Debug, Clone)]
pub(crate) struct CommandTranspiler {
    program: String,
    args: Vec<String>,
}

impl CommandTranspiler {
    pub(crate) fn new(program: String, args: Vec<String>) -> CommandTranspiler {
        CommandTranspiler { program, args }
    }

    /// esbuild with the JSX loader, emitting React.createElement calls.
    pub(crate) fn esbuild() -> CommandTranspiler {
        CommandTranspiler::new(
            "esbuild".to_string(),
            vec!["--loader=jsx".to_string(), "--target=es2017".to_string()],
        )
    }

    fn target_args(&self, target: Target) -> Vec<String> {
        match target {
            Target::BrowserComponent => self.args.clone(),
        }
    }
}

impl Transpiler for CommandTranspiler {
    #[instrument(skip(self, source), fields(program = %self.program, bytes = source.len()))]
    fn compile(&self, source: &str, target: Target) -> Result<CompiledScript, CompileError> {
        let mut child = Command::new(&self.program)
            .args(self.target_args(target))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to start transpiler {}: {}", self.program, e);
                CompileError::new(format!("Failed to start {}: {}", self.program, e))
            })?;

        // The child can block on a full stdout pipe before it has read all input.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CompileError::new("Transpiler stdin was not captured"))?;
        let input = source.to_string();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output().map_err(|e| {
            CompileError::new(format!("Failed to read from {}: {}", self.program, e))
        })?;
        match writer.join() {
            Ok(Ok(())) => (),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => (),
            Ok(Err(e)) => {
                return Err(CompileError::new(format!(
                    "Failed to write to {}: {}",
                    self.program, e
                )))
            }
            Err(_) => return Err(CompileError::new("Transpiler input thread panicked")),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::info!("Transpile failed: {}", stderr);
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            };
            return Err(CompileError::new(message));
        }

        let code = String::from_utf8(output.stdout)
            .map_err(|_| CompileError::new("Transpiler produced invalid UTF-8"))?;
        Ok(CompiledScript {
            code,
            kind: ScriptKind::Compiled,
        })
    }
}

/// Leaves compilation to the Babel runtime loaded inside the preview page.
#[derive(Debug, Clone, Default)]
pub(crate) struct InBrowserTranspiler;

impl Transpiler for InBrowserTranspiler {
    fn compile(&self, source: &str, _target: Target) -> Result<CompiledScript, CompileError> {
        Ok(CompiledScript {
            code: source.to_string(),
            kind: ScriptKind::DeferredBabel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_passes_output_through() {
        let transpiler = CommandTranspiler::new("cat".to_string(), Vec::new());
        let compiled = transpiler
            .compile("const a = 1;\n", Target::BrowserComponent)
            .unwrap();
        assert_eq!(compiled.code, "const a = 1;\n");
        assert_eq!(compiled.kind, ScriptKind::Compiled);
    }

    #[test]
    fn test_command_failure_reports_stderr() {
        let transpiler = CommandTranspiler::new(
            "sh".to_string(),
            vec![
                "-c".to_string(),
                "cat > /dev/null; echo 'Unexpected token (1:4)' >&2; exit 1".to_string(),
            ],
        );
        let err = transpiler
            .compile("let <", Target::BrowserComponent)
            .unwrap_err();
        assert_eq!(err.message, "Unexpected token (1:4)");
    }

    #[test]
    fn test_missing_program() {
        let transpiler =
            CommandTranspiler::new("deskide-no-such-transpiler".to_string(), Vec::new());
        let err = transpiler.compile("x", Target::BrowserComponent).unwrap_err();
        assert!(err.message.starts_with("Failed to start"));
    }

    #[test]
    fn test_in_browser_defers() {
        let compiled = InBrowserTranspiler
            .compile("<App />", Target::BrowserComponent)
            .unwrap();
        assert_eq!(compiled.code, "<App />");
        assert_eq!(compiled.kind, ScriptKind::DeferredBabel);
    }
}
