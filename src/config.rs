use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::Result;
use crate::locations::get_storage_dir;
use crate::render::RuntimeConfig;
use crate::transpile::{CommandTranspiler, InBrowserTranspiler, Transpiler};

pub(crate) const DEFAULT_PORT: u16 = 8023;
pub(crate) const DEFAULT_SESSION_IDLE_MINUTES: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub(crate) enum TranspilerMode {
    /// Run an external program on the server.
    Command,
    /// Ship source to the page and compile it there with Babel.
    InBrowser,
}

#[derive(Parser, Debug)]
#[clap(about = "Project tree, build and preview server for the desktop IDE")]
pub(crate) struct Opts {
    #[clap(short, long)]
    pub(crate) version: bool,
    #[clap(short, long)]
    pub(crate) debug: bool,
    #[clap(short, long)]
    pub(crate) port: Option<u16>,
    /// Where the project database and logs live. Defaults to ~/deskide
    #[clap(long)]
    pub(crate) storage_dir: Option<PathBuf>,
    /// Refuse to save projects that have no license (the default)
    #[clap(long, overrides_with = "no_require_license")]
    pub(crate) require_license: bool,
    /// Allow saving projects that have no license
    #[clap(long, overrides_with = "require_license")]
    pub(crate) no_require_license: bool,
    #[clap(long, default_value = ".jsx")]
    pub(crate) source_extension: String,
    #[clap(long, value_enum, default_value_t = TranspilerMode::Command)]
    pub(crate) transpiler: TranspilerMode,
    /// Program used by the command transpiler. Defaults to esbuild
    #[clap(long)]
    pub(crate) transpiler_program: Option<String>,
    #[clap(long = "transpiler-arg", allow_hyphen_values = true)]
    pub(crate) transpiler_args: Vec<String>,
    /// Script URLs loaded before the compiled code, in order
    #[clap(long = "runtime-script")]
    pub(crate) runtime_scripts: Vec<String>,
    /// Close sessions that have not been touched for this many minutes
    #[clap(long, default_value_t = DEFAULT_SESSION_IDLE_MINUTES)]
    pub(crate) session_idle_minutes: u64,
}

pub(crate) struct Config {
    pub(crate) port: u16,
    pub(crate) debug: bool,
    pub(crate) storage_dir: PathBuf,
    pub(crate) require_license: bool,
    pub(crate) source_extension: String,
    pub(crate) transpiler: Arc<dyn Transpiler>,
    pub(crate) runtime: RuntimeConfig,
    pub(crate) session_idle: Duration,
}

impl Config {
    pub(crate) fn from_opts(opts: Opts) -> Result<Config> {
        let storage_dir = get_storage_dir(opts.storage_dir.as_deref())?;
        let transpiler: Arc<dyn Transpiler> = match opts.transpiler {
            TranspilerMode::InBrowser => Arc::new(InBrowserTranspiler),
            TranspilerMode::Command => match opts.transpiler_program {
                Some(program) => Arc::new(CommandTranspiler::new(program, opts.transpiler_args)),
                None => Arc::new(CommandTranspiler::esbuild()),
            },
        };
        let mut runtime = RuntimeConfig::default();
        if !opts.runtime_scripts.is_empty() {
            runtime.scripts = opts.runtime_scripts;
        }
        Ok(Config {
            port: opts.port.unwrap_or(DEFAULT_PORT),
            debug: opts.debug,
            storage_dir,
            require_license: opts.require_license || !opts.no_require_license,
            source_extension: opts.source_extension,
            transpiler,
            runtime,
            session_idle: Duration::from_secs(opts.session_idle_minutes.max(1) * 60),
        })
    }
}
