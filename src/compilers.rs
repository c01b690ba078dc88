//! External compilers for template and style sources.
//!
//! Both compilers are opaque programs: they take one source path as their
//! last argument, run in a fixed working directory, and print the compiled
//! output on stdout. A non-zero exit status is a compile failure.
//!
//! The [`CompileUnit`] trait is the seam between the bundle compiler and
//! those programs, so the bundling logic can be tested without spawning
//! anything. [`SubprocessCompiler`] is the real implementation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("cannot run {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} failed on {} ({status}): {stderr}", program.display(), input.display())]
    Failed {
        program: PathBuf,
        input: PathBuf,
        status: String,
        stderr: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("empty compiler command")]
    EmptyCommand,
}

/// Compiles a single source file to bytes.
pub trait CompileUnit: Sync {
    fn compile_unit(&self, source: &Path) -> Result<Vec<u8>, CompileError>;
}

/// Runs an external program once per source.
#[derive(Debug, Clone)]
pub struct SubprocessCompiler {
    program: PathBuf,
    args: Vec<OsString>,
    working_dir: PathBuf,
}

impl SubprocessCompiler {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Arguments passed before the source path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Build from a whitespace-separated command line.
    ///
    /// A program containing a path separator is resolved against `base` and
    /// made absolute, since it runs from `working_dir`. A bare name is
    /// looked up on `PATH`.
    pub fn from_command_line(
        line: &str,
        base: &Path,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Self, CompileError> {
        let mut words = line.split_whitespace();
        let program = words.next().ok_or(CompileError::EmptyCommand)?;
        let program = if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
            std::path::absolute(base.join(program))?
        } else {
            PathBuf::from(program)
        };
        Ok(Self::new(program, working_dir).with_args(words))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

impl CompileUnit for SubprocessCompiler {
    fn compile_unit(&self, source: &Path) -> Result<Vec<u8>, CompileError> {
        debug!(
            program = %self.program.display(),
            source = %source.display(),
            cwd = %self.working_dir.display(),
            "running compiler"
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(source)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CompileError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CompileError::Failed {
                program: self.program.clone(),
                input: source.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}
