//! Dynamic-library build wrapper around the `zig build-lib` toolchain.
//!
//! Every build uses the same argument template:
//!
//! ```text
//! <compiler> build-lib -dynamic -O <optimize> -fPIC <source> -femit-bin=<output>
//! ```
//!
//! Source and output paths are relative to the project root, and the compiler
//! runs with the root as its working directory.

use crate::config::ToolchainConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("source file {} does not exist", .path.display())]
    SourceMissing { path: PathBuf },

    #[error("failed to launch compiler '{compiler}': {source}")]
    Spawn {
        compiler: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compiler '{compiler}' failed with {status}")]
    CompilerFailed { compiler: String, status: ExitStatus },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a build produces, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryKind {
    /// `usr/auto/<name>/auto.zig` → `zig-out/bin/auto/<name>.dylib`
    Auto,
    /// `usr/autos/<src>` → `zig-out/bin/usr/autos/<bin>`
    User,
}

impl LibraryKind {
    pub fn label(self) -> &'static str {
        match self {
            LibraryKind::Auto => "auto",
            LibraryKind::User => "library",
        }
    }
}

/// One `build-lib` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildLib {
    pub kind: LibraryKind,
    pub compiler: String,
    pub optimize: String,
    pub root: PathBuf,
    pub source: PathBuf,
    pub output: PathBuf,
}

impl BuildLib {
    /// Build an auto: `usr/auto/{name}/auto.zig` into `zig-out/bin/auto/{name}.dylib`.
    pub fn auto(config: &ToolchainConfig, name: &str) -> Self {
        Self {
            kind: LibraryKind::Auto,
            compiler: config.compiler.clone(),
            optimize: config.optimize.clone(),
            root: config.root.clone(),
            source: Path::new("usr/auto").join(name).join("auto.zig"),
            output: Path::new("zig-out/bin/auto").join(format!("{name}.dylib")),
        }
    }

    /// Build a user library: `usr/autos/{src}` into `zig-out/bin/usr/autos/{bin}`.
    pub fn user(config: &ToolchainConfig, src: &str, bin: &str) -> Self {
        Self {
            kind: LibraryKind::User,
            compiler: config.compiler.clone(),
            optimize: config.optimize.clone(),
            root: config.root.clone(),
            source: Path::new("usr/autos").join(src),
            output: Path::new("zig-out/bin/usr/autos").join(bin),
        }
    }

    /// Compiler arguments, excluding the program name.
    pub fn args(&self) -> Vec<OsString> {
        let mut emit = OsString::from("-femit-bin=");
        emit.push(&self.output);
        vec![
            "build-lib".into(),
            "-dynamic".into(),
            "-O".into(),
            self.optimize.clone().into(),
            "-fPIC".into(),
            self.source.clone().into_os_string(),
            emit,
        ]
    }

    /// Source path as seen from the current directory.
    pub fn source_path(&self) -> PathBuf {
        self.root.join(&self.source)
    }

    /// Artifact path as seen from the current directory.
    pub fn artifact_path(&self) -> PathBuf {
        self.root.join(&self.output)
    }

    /// Check the source, run the compiler, and branch on its exit status.
    ///
    /// Returns the artifact path on success. A missing source fails before
    /// anything is spawned.
    pub fn run(&self) -> Result<PathBuf, ToolchainError> {
        let source = self.source_path();
        if !source.is_file() {
            return Err(ToolchainError::SourceMissing { path: source });
        }

        let artifact = self.artifact_path();
        if let Some(dir) = artifact.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ToolchainError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let args = self.args();
        debug!(compiler = %self.compiler, ?args, root = %self.root.display(), "invoking compiler");

        let status = Command::new(&self.compiler)
            .args(&args)
            .current_dir(&self.root)
            .status()
            .map_err(|e| ToolchainError::Spawn {
                compiler: self.compiler.clone(),
                source: e,
            })?;

        if !status.success() {
            return Err(ToolchainError::CompilerFailed {
                compiler: self.compiler.clone(),
                status,
            });
        }

        info!(kind = self.kind.label(), artifact = %artifact.display(), "compiled");
        Ok(artifact)
    }
}
