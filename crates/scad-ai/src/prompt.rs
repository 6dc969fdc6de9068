/// Instruction payload for one completion request: a fixed system directive
/// plus the user's free-text description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub system: String,
    pub user: String,
}

/// Builds the prompt payload. The description is passed through without
/// validation; the completion service is the sole arbiter of output quality.
pub fn build_prompt(system_prompt: &str, description: &str) -> PromptPayload {
    PromptPayload {
        system: system_prompt.to_string(),
        user: format!("Generate OpenSCAD code for: {description}"),
    }
}
