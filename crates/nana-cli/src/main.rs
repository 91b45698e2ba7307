//! nana - multi-step image generation from the command line

mod config;
mod sinks;
mod templates;

use anyhow::{Context, bail};
use clap::{CommandFactory, Parser, Subcommand};
use nana_ai::billing::BalanceClient;
use nana_ai::providers::ProviderClient;
use nana_ai::{AspectRatio, Attachment, DEFAULT_MODEL, ModelConfig, Part, Resolution, Role};
use nana_pipeline::{
    Collaborators, Orchestrator, OrchestratorHandle, PipelineEvent, PipelineMode, RunSummary,
    Settings, SettingsStore, TaskDefinition,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::sinks::{BalanceTracker, ConsoleNotifier, FileImageSink, describe_balance};

/// nana - multi-step image generation
#[derive(Parser, Debug)]
#[command(name = "nana")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args, Debug)]
struct GlobalArgs {
    /// Model to use (default: gemini-3-pro-image-preview)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Output resolution (1K, 2K, 4K)
    #[arg(long, global = true)]
    resolution: Option<String>,

    /// Aspect ratio (Auto, 1:1, 3:4, 4:3, 9:16, 16:9, 21:9)
    #[arg(long, global = true)]
    aspect_ratio: Option<String>,

    /// Enable Google Search grounding
    #[arg(long, global = true)]
    grounding: bool,

    /// Ask the model to include its reasoning
    #[arg(long, global = true)]
    thinking: bool,

    /// Wait for complete results instead of streaming
    #[arg(long, global = true)]
    no_stream: bool,

    /// Directory for generated images
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate from a single prompt
    Send {
        prompt: String,
        /// Input image (repeatable)
        #[arg(short = 'i', long = "image")]
        images: Vec<PathBuf>,
        /// Run the prompt this many times in a row (1-4)
        #[arg(short = 'n', long, default_value_t = 1)]
        repeat: usize,
    },
    /// Run a multi-step pipeline
    Pipeline {
        /// serial, parallel or combination (default: template mode, else serial)
        #[arg(long)]
        mode: Option<PipelineMode>,
        /// Step prompt (repeatable, in order)
        #[arg(long = "step")]
        steps: Vec<String>,
        /// Model for the step at the same position; "-" keeps the default
        #[arg(long = "step-model")]
        step_models: Vec<String>,
        /// Use the steps of a saved template
        #[arg(short, long)]
        template: Option<String>,
        /// Input image (repeatable)
        #[arg(short = 'i', long = "image")]
        images: Vec<PathBuf>,
    },
    /// List pipeline templates
    Templates {
        #[arg(long)]
        mode: Option<PipelineMode>,
    },
    /// Show the remaining account balance
    Balance,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        Some(EnvFilter::new("nana=debug"))
    } else {
        EnvFilter::try_from_default_env().ok()
    };
    if let Some(filter) = filter {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    // Initialize config and exit
    if cli.global.init_config {
        let path = Config::init().context("creating config file")?;
        println!("Config file at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let cfg = Config::load();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Templates { mode } => list_templates(&cfg, mode),
        Command::Balance => show_balance(&cfg).await,
        Command::Send {
            prompt,
            images,
            repeat,
        } => {
            let attachments = load_attachments(&images)?;
            let app = App::new(&cfg, &cli.global)?;
            let result = app
                .run(false, |orch| orch.send(&prompt, attachments, repeat))
                .await;
            app.finish(result)
        }
        Command::Pipeline {
            mode,
            steps,
            step_models,
            template,
            images,
        } => {
            let (mode, tasks) = pipeline_plan(&cfg, mode, steps, step_models, template.as_deref())?;
            let attachments = load_attachments(&images)?;
            let app = App::new(&cfg, &cli.global)?;
            let result = app
                .run(mode != PipelineMode::Serial, |orch| {
                    orch.run_pipeline(mode, tasks, attachments)
                })
                .await;
            app.finish(result)
        }
    }
}

/// Resolve the step list and mode from flags and/or a template
fn pipeline_plan(
    cfg: &Config,
    mode: Option<PipelineMode>,
    steps: Vec<String>,
    step_models: Vec<String>,
    template: Option<&str>,
) -> anyhow::Result<(PipelineMode, Vec<TaskDefinition>)> {
    let mut tasks = Vec::new();
    let mut template_mode = None;

    if let Some(name) = template {
        let all = templates::load_templates(&cfg.templates_dir())?;
        let found = templates::find(&all, name)
            .with_context(|| format!("no template named '{}'", name))?;
        template_mode = Some(found.mode);
        tasks.extend(found.tasks());
    }

    if step_models.len() > steps.len() {
        bail!("more --step-model values than --step values");
    }
    let mut models = step_models.into_iter();
    for prompt in steps {
        let task = TaskDefinition::new(prompt);
        tasks.push(match models.next() {
            Some(model) if model != "-" && !model.trim().is_empty() => task.with_model(model),
            _ => task,
        });
    }

    let mode = mode.or(template_mode).unwrap_or(PipelineMode::Serial);
    Ok((mode, tasks))
}

fn load_attachments(paths: &[PathBuf]) -> anyhow::Result<Vec<Attachment>> {
    paths.iter().map(|path| load_attachment(path)).collect()
}

fn load_attachment(path: &Path) -> anyhow::Result<Attachment> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Attachment::new(data, sinks::mime_for_path(path)))
}

/// Merge config and flags into settings (flags take precedence)
fn build_settings(cfg: &Config, global: &GlobalArgs) -> anyhow::Result<Settings> {
    let resolution = match global.resolution.as_ref().or(cfg.resolution.as_ref()) {
        Some(value) => value.parse::<Resolution>().map_err(anyhow::Error::msg)?,
        None => Resolution::default(),
    };
    let aspect_ratio = match global.aspect_ratio.as_ref().or(cfg.aspect_ratio.as_ref()) {
        Some(value) => value.parse::<AspectRatio>().map_err(anyhow::Error::msg)?,
        None => AspectRatio::default(),
    };

    Ok(Settings {
        api_key: cfg.api_key(),
        model: ModelConfig {
            model: global
                .model
                .clone()
                .or_else(|| cfg.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            resolution,
            aspect_ratio,
            grounding: global.grounding || cfg.grounding.unwrap_or(false),
            thinking: global.thinking || cfg.thinking.unwrap_or(false),
        },
        stream: !global.no_stream && cfg.stream.unwrap_or(true),
    })
}

/// The wired-up orchestrator plus the collaborators the CLI reads back
struct App {
    orch: Orchestrator,
    balance: Arc<BalanceTracker>,
    images: Arc<FileImageSink>,
}

impl App {
    fn new(cfg: &Config, global: &GlobalArgs) -> anyhow::Result<Self> {
        let settings = build_settings(cfg, global)?;
        let api_key = settings.api_key.clone().unwrap_or_default();
        let endpoint = cfg.endpoint.as_deref();

        let client = Arc::new(ProviderClient::new(api_key.clone(), endpoint));
        let balance = Arc::new(BalanceTracker::new(BalanceClient::new(api_key, endpoint)));
        let output_dir = global.output_dir.clone().unwrap_or_else(|| cfg.output_dir());
        let images = Arc::new(FileImageSink::new(output_dir));

        let collab = Collaborators {
            images: images.clone(),
            notifier: Arc::new(ConsoleNotifier),
            balance: balance.clone(),
        };
        let orch = Orchestrator::new(client, SettingsStore::new(settings), collab);
        Ok(Self {
            orch,
            balance,
            images,
        })
    }

    /// Run one operation while printing events. The first Ctrl-C stops the
    /// generation in flight, the second exits.
    async fn run<'a, F, Fut>(&'a self, fan_out: bool, op: F) -> nana_pipeline::Result<RunSummary>
    where
        F: FnOnce(&'a Orchestrator) -> Fut,
        Fut: std::future::Future<Output = nana_pipeline::Result<RunSummary>> + 'a,
    {
        let interrupt = tokio::spawn(watch_interrupts(self.orch.handle(), fan_out));

        let mut printer = EventPrinter::default();
        let mut events = self.orch.subscribe();
        let run = op(&self.orch);
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                event = events.recv() => match event {
                    Ok(event) => printer.handle(&event),
                    Err(RecvError::Lagged(n)) => tracing::debug!("skipped {} events", n),
                    Err(RecvError::Closed) => {}
                },
            }
        };
        // flush events emitted after the last poll
        while let Ok(event) = events.try_recv() {
            printer.handle(&event);
        }

        interrupt.abort();
        result
    }

    fn finish(&self, result: nana_pipeline::Result<RunSummary>) -> anyhow::Result<()> {
        if let Some(info) = self.balance.latest() {
            eprintln!("{}", describe_balance(&info));
        }
        match result {
            Ok(summary) => {
                let saved = self.images.written().len();
                if saved > 0 {
                    println!("{} image(s) saved", saved);
                }
                if summary.failed > 0 {
                    bail!("{} of {} tasks failed", summary.failed, summary.total);
                }
                Ok(())
            }
            Err(nana_pipeline::Error::MissingApiKey) => {
                eprintln!("Set your API key with: export NANA_API_KEY=your-key");
                eprintln!("Or add it to the config file: nana --init-config");
                std::process::exit(1);
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// What a Ctrl-C press does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Stop,
    Exit,
}

/// Counts Ctrl-C presses during one run
#[derive(Debug, Default)]
struct Interrupts {
    presses: usize,
}

impl Interrupts {
    fn press(&mut self) -> Interrupt {
        self.presses += 1;
        if self.presses == 1 {
            Interrupt::Stop
        } else {
            Interrupt::Exit
        }
    }
}

fn stop_notice(fan_out: bool) -> &'static str {
    if fan_out {
        "Stopping... tasks already in flight will finish (press Ctrl-C again to quit)"
    } else {
        "Stopping... (press Ctrl-C again to quit)"
    }
}

async fn watch_interrupts(handle: OrchestratorHandle, fan_out: bool) {
    let mut interrupts = Interrupts::default();
    while tokio::signal::ctrl_c().await.is_ok() {
        match interrupts.press() {
            Interrupt::Stop => {
                eprintln!("\n{}", stop_notice(fan_out));
                handle.stop();
            }
            Interrupt::Exit => {
                eprintln!("\nAborted");
                std::process::exit(130);
            }
        }
    }
}

/// Prints pipeline events as plain lines
#[derive(Default)]
struct EventPrinter {
    /// Answer text already printed, per model entry
    printed: HashMap<String, usize>,
    thinking: HashMap<String, bool>,
}

impl EventPrinter {
    fn handle(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStart { mode, total } => {
                tracing::debug!(?mode, total, "run start");
            }
            PipelineEvent::Progress { completed, total } if *total > 0 => {
                eprintln!("[{}/{}]", completed, total);
            }
            PipelineEvent::EntryAppended { entry } if entry.role == Role::User => {
                if let Some(text) = entry.first_text() {
                    println!("> {}", text);
                }
            }
            PipelineEvent::EntryUpdated { entry } if entry.role == Role::Model => {
                if entry.parts.iter().any(Part::is_reasoning)
                    && !self.thinking.insert(entry.id.clone(), true).unwrap_or(false)
                {
                    eprintln!("(thinking...)");
                }
                let text: String = entry
                    .parts
                    .iter()
                    .filter_map(Part::as_text)
                    .collect::<Vec<_>>()
                    .join("\n");
                let printed = self.printed.entry(entry.id.clone()).or_insert(0);
                if entry.is_error {
                    println!("{}", text);
                    *printed = text.len();
                } else if text.len() > *printed && text.is_char_boundary(*printed) {
                    print!("{}", &text[*printed..]);
                    *printed = text.len();
                }
            }
            PipelineEvent::RunEnd { summary } => {
                println!();
                let mut line = format!(
                    "Done: {} of {} succeeded, {} image(s)",
                    summary.completed, summary.total, summary.images
                );
                if summary.cancelled {
                    line.push_str(" (stopped)");
                }
                println!("{}", line);
            }
            _ => {}
        }
    }
}

fn list_templates(cfg: &Config, mode: Option<PipelineMode>) -> anyhow::Result<()> {
    let dir = cfg.templates_dir();
    let all = templates::load_templates(&dir)?;
    let matching = templates::filter_by_mode(&all, mode);
    if matching.is_empty() {
        println!("No templates in {}", dir.display());
        return Ok(());
    }
    for template in matching {
        println!(
            "{} [{}, {} steps]",
            template.name,
            template.mode,
            template.steps.len()
        );
        if !template.description.is_empty() {
            println!("    {}", template.description);
        }
    }
    Ok(())
}

async fn show_balance(cfg: &Config) -> anyhow::Result<()> {
    let Some(api_key) = cfg.api_key() else {
        bail!("No API key configured (set NANA_API_KEY or run nana --init-config)");
    };
    let info = BalanceClient::new(api_key, cfg.endpoint.as_deref())
        .fetch()
        .await?;
    println!("{}", describe_balance(&info));
    Ok(())
}
