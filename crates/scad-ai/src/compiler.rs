use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::CompilerSettings;
use crate::error::Result;

pub const INSTALL_HINT: &str = "OpenSCAD is not installed or not in PATH; install it from https://openscad.org/ or open the .scad file in OpenSCAD and export the STL manually";

/// Terminal outcomes of one compiler invocation. Only `Compiled` produces a
/// mesh; the other two leave the script file in place and are reported as a
/// warning, never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Compiled { mesh_path: PathBuf },
    CompilerUnavailable { hint: String },
    CompilerFailed { detail: String },
}

#[derive(Debug, Clone)]
pub struct OpenScadCompiler {
    binary: PathBuf,
    timeout: Duration,
}

impl OpenScadCompiler {
    pub fn new(settings: &CompilerSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            timeout: settings.timeout,
        }
    }

    /// Probes for the executable with `--version`, the same check the
    /// compiler itself would fail later anyway.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Runs `<binary> -o <mesh> --render <script>` once, bounded by the
    /// configured wall-clock ceiling. Success requires exit code 0 and a
    /// non-empty mesh file at the target path.
    pub async fn compile(&self, script_path: &Path, mesh_path: &Path) -> Result<CompileOutcome> {
        if !self.is_available().await {
            return Ok(CompileOutcome::CompilerUnavailable {
                hint: INSTALL_HINT.to_string(),
            });
        }

        debug!(
            script = %script_path.display(),
            mesh = %mesh_path.display(),
            "invoking the geometry compiler"
        );

        let child = match Command::new(&self.binary)
            .arg("-o")
            .arg(mesh_path)
            .arg("--render")
            .arg(script_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CompileOutcome::CompilerUnavailable {
                    hint: INSTALL_HINT.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        // Dropping the timed-out future kills the child via kill_on_drop.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Ok(CompileOutcome::CompilerFailed {
                    detail: format!(
                        "compiler did not finish within {}s and was killed",
                        self.timeout.as_secs()
                    ),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stderr = %stderr.trim(), "compiler exited with an error");
            return Ok(CompileOutcome::CompilerFailed {
                detail: format!("compiler exited with {}: {}", output.status, stderr.trim()),
            });
        }

        match tokio::fs::metadata(mesh_path).await {
            Ok(metadata) if metadata.len() > 0 => Ok(CompileOutcome::Compiled {
                mesh_path: mesh_path.to_path_buf(),
            }),
            _ => Ok(CompileOutcome::CompilerFailed {
                detail: "compiler reported success but the mesh file is empty or missing"
                    .to_string(),
            }),
        }
    }
}
