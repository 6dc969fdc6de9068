use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use scad_ai::config::{Provider, Settings};
use scad_ai::{MeshGenerator, example_descriptions};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = "Examples:
  scad-cli \"a simple cube with 10mm sides\" -o cube.stl
  scad-cli \"a cylinder with diameter 20mm and height 30mm\" -o cylinder.stl
  scad-cli \"a gear with 12 teeth\" -o gear.stl

The openai provider requires OPENAI_API_KEY; the bedrock provider requires
AWS_BEARER_TOKEN_BEDROCK. Either can be set in a .env file or exported in
your shell.";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Openai,
    Bedrock,
}

impl From<ProviderArg> for Provider {
    fn from(value: ProviderArg) -> Self {
        match value {
            ProviderArg::Openai => Provider::OpenAi,
            ProviderArg::Bedrock => Provider::Bedrock,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "scad-cli",
    version,
    about = "Generate STL files from text descriptions using AI",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Text description of the 3D object to create
    #[arg(required_unless_present = "list_examples")]
    description: Option<String>,

    /// Output STL file path
    #[arg(short, long, default_value = "output.stl")]
    output: PathBuf,

    /// Completion provider (overrides SCAD_PROVIDER)
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,

    /// Credential override for the selected provider
    #[arg(long)]
    api_key: Option<String>,

    /// Model identifier override for the selected provider
    #[arg(long)]
    model: Option<String>,

    /// AWS region for the bedrock provider
    #[arg(long)]
    region: Option<String>,

    /// Print the bundled example descriptions and exit
    #[arg(long)]
    list_examples: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_examples {
        for example in example_descriptions() {
            println!("{example}");
        }
        return Ok(());
    }

    let description = cli
        .description
        .context("a description of the object is required")?;
    let settings = apply_overrides(
        Settings::from_env(),
        cli.provider.map(Provider::from),
        cli.api_key,
        cli.model,
        cli.region,
    );

    let generator = MeshGenerator::from_settings(&settings)?;

    println!("Generating 3D model for: {description}");
    let result = generator.generate(&description, &cli.output).await?;

    println!("OpenSCAD code saved to: {}", result.script_path.display());
    match (&result.mesh_path, &result.warning) {
        (Some(mesh_path), _) => {
            println!("STL file created successfully: {}", mesh_path.display());
        }
        (None, Some(warning)) => {
            println!("STL conversion skipped: {warning}");
            println!("Generation completed with warnings. Check the .scad file.");
        }
        (None, None) => {}
    }

    Ok(())
}

fn apply_overrides(
    mut settings: Settings,
    provider: Option<Provider>,
    api_key: Option<String>,
    model: Option<String>,
    region: Option<String>,
) -> Settings {
    if let Some(provider) = provider {
        settings.provider = provider;
    }
    if let Some(api_key) = api_key {
        match settings.provider {
            Provider::OpenAi => settings.openai.api_key = Some(api_key),
            Provider::Bedrock => settings.bedrock.bearer_token = Some(api_key),
        }
    }
    if let Some(model) = model {
        match settings.provider {
            Provider::OpenAi => settings.openai.model = model,
            Provider::Bedrock => settings.bedrock.model_id = model,
        }
    }
    if let Some(region) = region {
        settings.bedrock.region = region;
    }
    settings
}
