use clap::{Args, Parser, Subcommand};
use snowflake_adapters::{AdapterError, LlmDispatcher};
use snowflake_core::artifact::{ArtifactError, ArtifactStore};
use snowflake_core::config::{ConfigError, ConfigStore, ModelKey};
use snowflake_core::export::{docx, epub, markdown, ExportError};
use snowflake_core::generate::{FallbackGenerator, ModelInvoker};
use snowflake_core::logging::{LogLevel, LogRecord, LogSink, StdoutLogSink};
use snowflake_core::metrics::Metrics;
use snowflake_core::pipeline::{Pipeline, StepError, StepId};
use snowflake_core::prompts::{PromptError, PromptRegistry};
use snowflake_core::story::{Manuscript, StoryBrief};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let sink = StdoutLogSink::new();

    match cli.command {
        Command::Project(command) => handle_project(&cli.config, command, &sink),
        Command::Step(command) => handle_step(&cli.config, command),
        Command::Export(command) => handle_export(&cli.config, command, &sink),
        Command::Config(command) => handle_config(&cli.config, command, &sink),
    }
}

fn handle_project(
    config_path: &Path,
    command: ProjectCommand,
    sink: &dyn LogSink,
) -> Result<(), CliError> {
    match command {
        ProjectCommand::Init(args) => run_init(config_path, args, sink),
        ProjectCommand::Status(args) => run_status(config_path, args),
    }
}

fn handle_step(config_path: &Path, command: StepCommand) -> Result<(), CliError> {
    match command {
        StepCommand::Run(args) => {
            let step = StepId::from_number(args.step).ok_or(CliError::UnknownStep(args.step))?;
            let pipeline = build_pipeline(config_path)?;
            pipeline.run_step(&args.id, step)?;
            Ok(())
        }
        StepCommand::RunAll(args) => {
            let pipeline = build_pipeline(config_path)?;
            let executed = pipeline.run_all(&args.id)?;
            println!(
                "{} step(s) executed, project `{}` is complete through step 10.",
                executed.len(),
                args.id
            );
            Ok(())
        }
    }
}

fn handle_export(
    config_path: &Path,
    command: ExportCommand,
    sink: &dyn LogSink,
) -> Result<(), CliError> {
    let (args, format) = match command {
        ExportCommand::Markdown(args) => (args, "md"),
        ExportCommand::Epub(args) => (args, "epub"),
        ExportCommand::Docx(args) => (args, "docx"),
    };
    let store = open_store(config_path)?;
    let manuscript = load_manuscript(&store, &args.id)?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}.{format}", args.id)));

    let written = match format {
        "md" => markdown::export_markdown(&manuscript, &output)?,
        "epub" => epub::export_epub(&manuscript, &output)?,
        _ => docx::export_docx(&manuscript, &output)?,
    };
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("exported `{}` to {}", args.id, written.display()),
    ));
    Ok(())
}

fn handle_config(
    config_path: &Path,
    command: ConfigCommand,
    sink: &dyn LogSink,
) -> Result<(), CliError> {
    match command {
        ConfigCommand::TestLlm(args) => run_test_llm(config_path, args, sink),
    }
}

fn run_init(config_path: &Path, args: InitArgs, sink: &dyn LogSink) -> Result<(), CliError> {
    let store = open_store(config_path)?;
    let brief = StoryBrief {
        category: args.category.unwrap_or_default(),
        audience: args.audience.unwrap_or_default(),
        premise: args.premise,
        guidance: args.guidance.unwrap_or_default(),
    };
    let state = store.init_project(&args.id, brief)?;
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!(
            "project `{}` initialized at {}",
            state.project_id,
            store.project_dir(&state.project_id).display()
        ),
    ));
    Ok(())
}

fn run_status(config_path: &Path, args: ProjectArgs) -> Result<(), CliError> {
    let store = open_store(config_path)?;
    let state = store.load_project(&args.id)?;
    println!("project: {}", state.project_id);
    println!("premise: {}", state.brief.premise);
    println!("updated: {}", state.updated_at.to_rfc3339());
    for step in StepId::all() {
        let marker = if state.is_completed(step.number()) {
            "done"
        } else {
            "pending"
        };
        println!("  step {:>2} {:<22} {marker}", step.number(), step.name());
    }
    Ok(())
}

fn run_test_llm(config_path: &Path, args: TestLlmArgs, sink: &dyn LogSink) -> Result<(), CliError> {
    let store = ConfigStore::open(config_path)?;
    let config = store.config();
    let key = match (args.provider, args.model) {
        (Some(provider), Some(model)) => ModelKey::new(provider, model),
        _ => config
            .configured_ladder(snowflake_core::config::ModelTier::Fast)
            .into_iter()
            .next()
            .ok_or(CliError::NoConfiguredProvider)?,
    };
    let dispatcher = LlmDispatcher::from_config(config)?;
    sink.log(LogRecord::new(LogLevel::Info, format!("testing {key}")));
    let reply = dispatcher
        .invoke(&key, "Reply with the single word OK.")
        .map_err(|err| CliError::TestFailed(err.to_string()))?;
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("{key} answered: {}", reply.trim()),
    ));
    Ok(())
}

fn open_store(config_path: &Path) -> Result<ArtifactStore, CliError> {
    let store = ConfigStore::open(config_path)?;
    Ok(ArtifactStore::new(store.config().artifacts_root.clone()))
}

fn load_manuscript(store: &ArtifactStore, project_id: &str) -> Result<Manuscript, CliError> {
    let (_, manuscript) = store.read_artifact(
        project_id,
        StepId::FirstDraft.number(),
        StepId::FirstDraft.name(),
    )?;
    Ok(manuscript)
}

fn build_pipeline(config_path: &Path) -> Result<Pipeline, CliError> {
    let store = ConfigStore::open(config_path)?;
    let config = store.config().clone();
    let dispatcher = LlmDispatcher::from_config(&config)?;
    let prompts = PromptRegistry::from_prompt_config(&config.prompts)?;
    let artifacts = ArtifactStore::new(config.artifacts_root.clone());
    let sink: Arc<dyn LogSink> = Arc::new(StdoutLogSink::new());
    let generator = FallbackGenerator::new(
        Arc::new(dispatcher),
        config,
        Arc::new(Metrics::default()),
        Arc::clone(&sink),
    );
    Ok(Pipeline::new(artifacts, prompts, generator, sink))
}

#[derive(Debug, Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("{0}")]
    Step(#[from] StepError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("there is no step {0}; steps run 0 through 10")]
    UnknownStep(u8),
    #[error("no provider with credentials is configured; edit config.json first")]
    NoConfiguredProvider,
    #[error("provider test failed: {0}")]
    TestFailed(String),
}

#[derive(Parser)]
#[command(name = "snowctl", version, about = "Snowflake Method novel pipeline")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and inspect projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Execute pipeline steps
    #[command(subcommand)]
    Step(StepCommand),
    /// Export the finished first draft
    #[command(subcommand)]
    Export(ExportCommand),
    /// Configuration checks
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project from a one-line story idea
    Init(InitArgs),
    /// Show which steps have completed
    Status(ProjectArgs),
}

#[derive(Subcommand)]
enum StepCommand {
    /// Run a single step (0-10), overwriting any previous result
    Run(RunArgs),
    /// Run every remaining step in order
    RunAll(ProjectArgs),
}

#[derive(Subcommand)]
enum ExportCommand {
    /// Write the manuscript as a single Markdown file
    Markdown(ExportArgs),
    /// Write the manuscript as an EPUB
    Epub(ExportArgs),
    /// Write the manuscript as a DOCX
    Docx(ExportArgs),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Send a short test prompt to a configured provider
    TestLlm(TestLlmArgs),
}

#[derive(Args)]
struct ProjectArgs {
    /// Project identifier (its directory under the artifacts root)
    id: String,
}

#[derive(Args)]
struct InitArgs {
    /// Project identifier
    id: String,
    /// The one-line story idea
    #[arg(long)]
    premise: String,
    /// Category, e.g. "Fantasy"
    #[arg(long)]
    category: Option<String>,
    /// Target audience
    #[arg(long)]
    audience: Option<String>,
    /// Free-form guidance passed to the early steps
    #[arg(long)]
    guidance: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    /// Project identifier
    id: String,
    /// Step number, 0 through 10
    step: u8,
}

#[derive(Args)]
struct ExportArgs {
    /// Project identifier
    id: String,
    /// Output path; defaults to `<id>.<ext>` in the working directory
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct TestLlmArgs {
    /// Provider name, e.g. "openai"; defaults to the first configured ladder entry
    #[arg(long)]
    provider: Option<String>,
    /// Model name; required when --provider is given
    #[arg(long)]
    model: Option<String>,
}
