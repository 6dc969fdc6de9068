use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::DEFAULT_SYSTEM_PROMPT;
use crate::compiler::{CompileOutcome, OpenScadCompiler};
use crate::config::Settings;
use crate::error::Result;
use crate::prompt::build_prompt;
use crate::providers::{CompletionClient, CompletionRequest, client_from_settings};
use crate::sanitize::strip_code_fences;

pub const SCRIPT_EXTENSION: &str = "scad";

/// What one pipeline invocation produced. `warning` carries the explanation
/// whenever the mesh is absent because of a compiler-side degradation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub script_path: PathBuf,
    pub mesh_path: Option<PathBuf>,
    pub warning: Option<String>,
}

impl GenerationResult {
    pub fn mesh_compiled(&self) -> bool {
        self.mesh_path.is_some()
    }
}

pub struct MeshGenerator<C: CompletionClient> {
    client: C,
    compiler: OpenScadCompiler,
    system_prompt: String,
}

impl MeshGenerator<Box<dyn CompletionClient>> {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            client_from_settings(settings)?,
            OpenScadCompiler::new(&settings.compiler),
        ))
    }
}

impl<C: CompletionClient> MeshGenerator<C> {
    pub fn new(client: C, compiler: OpenScadCompiler) -> Self {
        Self {
            client,
            compiler,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Runs the whole pipeline once: prompt, completion, sanitize, write the
    /// script, then attempt one compile. Compiler degradations come back as
    /// script-only results; everything else is a hard error.
    pub async fn generate(&self, description: &str, output_path: &Path) -> Result<GenerationResult> {
        info!(%description, "requesting OpenSCAD code from the completion service");
        let prompt = build_prompt(&self.system_prompt, description);
        let raw = self
            .client
            .complete(CompletionRequest {
                system_prompt: &prompt.system,
                user_prompt: &prompt.user,
            })
            .await?;
        let script = strip_code_fences(&raw);

        let script_path = script_path_for(output_path);
        if let Some(parent) = script_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&script_path, &script).await?;
        info!(path = %script_path.display(), "OpenSCAD code written");

        if script_path.as_path() == output_path {
            // The caller asked for the script itself; there is nothing to compile.
            return Ok(GenerationResult {
                script_path,
                mesh_path: None,
                warning: None,
            });
        }

        info!(path = %output_path.display(), "converting to STL");
        match self.compiler.compile(&script_path, output_path).await? {
            CompileOutcome::Compiled { mesh_path } => {
                info!(path = %mesh_path.display(), "STL file created");
                Ok(GenerationResult {
                    script_path,
                    mesh_path: Some(mesh_path),
                    warning: None,
                })
            }
            CompileOutcome::CompilerUnavailable { hint } => {
                warn!(%hint, "skipping STL conversion");
                Ok(GenerationResult {
                    script_path,
                    mesh_path: None,
                    warning: Some(hint),
                })
            }
            CompileOutcome::CompilerFailed { detail } => {
                warn!(%detail, "STL conversion failed");
                Ok(GenerationResult {
                    script_path,
                    mesh_path: None,
                    warning: Some(detail),
                })
            }
        }
    }
}

fn script_path_for(output_path: &Path) -> PathBuf {
    output_path.with_extension(SCRIPT_EXTENSION)
}
