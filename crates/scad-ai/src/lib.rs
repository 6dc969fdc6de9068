pub mod compiler;
pub mod config;
pub mod error;
pub mod generate;
pub mod prompt;
pub mod providers;
pub mod sanitize;

pub use compiler::{CompileOutcome, OpenScadCompiler};
pub use config::{Provider, Settings};
pub use error::{Error, Result};
pub use generate::{GenerationResult, MeshGenerator};
pub use prompt::{PromptPayload, build_prompt};
pub use providers::{
    BedrockClient, CompletionClient, CompletionRequest, OpenAiClient, client_from_settings,
};
pub use sanitize::strip_code_fences;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert at generating OpenSCAD code for 3D modelling.
Given a text description of a 3D object, generate valid OpenSCAD code that creates that object.

Guidelines:
- Use clear, simple OpenSCAD syntax
- Include comments explaining key parts of the model
- Use appropriate parameters for dimensions
- Center objects at the origin when possible
- All parts of the model must touch the build plate so the result is printable
- The model must be feasible to print on a standard 3D printer
- Make sure the code is valid and will compile
- Return ONLY the OpenSCAD code, no explanations and no markdown formatting
"#;

pub const EXAMPLE_DESCRIPTIONS: [&str; 6] = [
    "a simple cube with 10mm sides",
    "a cylinder with diameter 20mm and height 30mm",
    "a gear with 12 teeth",
    "a cube with 20mm sides",
    "a cylinder with 15mm diameter and 40mm height",
    "a phone stand with a 60 degree angle, base 80mm wide, 60mm deep",
];

pub fn default_system_prompt() -> &'static str {
    DEFAULT_SYSTEM_PROMPT
}

pub fn example_descriptions() -> &'static [&'static str] {
    &EXAMPLE_DESCRIPTIONS
}
