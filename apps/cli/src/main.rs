use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use videotitler_core::{
    BaiduOcrClient, BatchController, BatchPipeline, ChatTitleGenerator, Collaborators,
    FfmpegFrameExtractor, OcrMode, PipelineOptions, PromptTemplate, Provider, RenameOptions,
    Renamer, ScanOptions, events::BusConfig,
};

use crate::{
    config::AppConfig,
    format::format_table,
    pipeline::start_sinks,
};

mod config;
mod format;
mod pipeline;
mod review;
mod workers;

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Deepseek,
    Openai,
    Grok,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Deepseek => Provider::Deepseek,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Grok => Provider::Grok,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliOcrMode {
    Accurate,
    General,
}

impl From<CliOcrMode> for OcrMode {
    fn from(cli: CliOcrMode) -> Self {
        match cli {
            CliOcrMode::Accurate => OcrMode::Accurate,
            CliOcrMode::General => OcrMode::General,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Parser)]
#[command(name = "videotitler")]
#[command(
    about = "Read the on-screen text of one frame per video, turn it into a title and rename the files in order"
)]
struct Cli {
    /// Folder with the videos. Defaults to the one in the settings file.
    dir: Option<PathBuf>,

    /// 1-based frame to read the text from
    #[arg(short, long)]
    frame: Option<u32>,

    /// Generate titles but do not rename anything
    #[arg(long)]
    preview: bool,

    /// OCR model to use
    #[arg(long)]
    ocr_mode: Option<CliOcrMode>,

    /// Fail clips shorter than --frame instead of reading their last frame
    #[arg(long)]
    exact_frame: bool,

    /// Also pick up videos in subfolders
    #[arg(short = 'r', long)]
    include_subdirs: bool,

    /// Number given to the first video
    #[arg(long)]
    start_index: Option<u32>,

    /// Digits in the number prefix
    #[arg(long)]
    padding: Option<usize>,

    /// AI provider for title generation
    #[arg(short, long)]
    provider: Option<CliProvider>,

    /// Override the provider's default model
    #[arg(long)]
    model: Option<String>,

    /// Override the provider's API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Settings file to read (and write with --save-config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the merged settings back to the settings file
    #[arg(long)]
    save_config: bool,

    /// Process once and exit instead of opening the review prompt
    #[arg(long)]
    no_interactive: bool,

    /// Log every pipeline event as a JSON line on stderr
    #[arg(long)]
    events_json: bool,

    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.dir {
            config.input_dir = Some(dir.clone());
        }
        if let Some(frame) = self.frame {
            config.frame_index = frame;
        }
        if self.preview {
            config.preview = true;
        }
        if let Some(mode) = self.ocr_mode {
            config.ocr_mode = mode.into();
        }
        if self.include_subdirs {
            config.include_subdirs = true;
        }
        if let Some(start) = self.start_index {
            config.start_index = start;
        }
        if let Some(padding) = self.padding {
            config.index_padding = padding;
        }
        if let Some(provider) = self.provider {
            config.title_provider = provider.into();
        }
        if let Some(model) = &self.model {
            config.title_model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.title_base_url = base_url.clone();
        }
    }
}

fn init_logging(level: LogLevel) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_filter()))
        .format_timestamp(None)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", style("Error:").red().bold(), message);
    std::process::exit(1);
}

fn build_collaborators(config: &AppConfig, exact_frame: bool) -> Result<Collaborators> {
    let (api_key, secret_key) = config.baidu_keys().context(
        "missing Baidu OCR keys: set BAIDU_API_KEY and BAIDU_SECRET_KEY or add them to the settings file",
    )?;
    let recognizer = BaiduOcrClient::new(&api_key, &secret_key)?;

    let provider = config.title_provider;
    let title_key = provider.resolve_api_key(Some(&config.title_api_key))?;
    let generator = ChatTitleGenerator::new(provider, &title_key)?
        .with_model(&config.title_model)
        .with_base_url(&config.title_base_url);
    log::info!("titles from {} ({})", provider.name(), generator.model());

    Ok(Collaborators {
        extractor: Arc::new(
            FfmpegFrameExtractor::new().with_fallback_to_last_frame(!exact_frame),
        ),
        recognizer: Arc::new(recognizer),
        generator: Arc::new(generator),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let config_path = cli.config.clone().or_else(config::default_path);
    let mut config = config_path
        .as_deref()
        .map(AppConfig::load)
        .unwrap_or_default();
    cli.apply(&mut config);

    let Some(dir) = config.input_dir.clone() else {
        fail("no video folder given and none in the settings file");
    };

    // Validate keys early
    let collaborators =
        build_collaborators(&config, cli.exact_frame).unwrap_or_else(|e| fail(format!("{e:#}")));

    println!(
        "\n{}  {}\n",
        style("videotitler").cyan().bold(),
        style("Video Titler").dim()
    );

    let sinks = start_sinks(BusConfig::default(), cli.events_json)?;
    let renamer = Renamer::new(RenameOptions {
        start_index: config.start_index,
        index_padding: config.index_padding,
    });
    let pipeline = BatchPipeline::new(collaborators, renamer).with_bus(sinks.bus.clone());

    let scan = ScanOptions {
        frame_index: config.frame_index,
        include_subdirs: config.include_subdirs,
    };
    let records = pipeline
        .scan_with(&dir, &scan)
        .unwrap_or_else(|e| fail(e));

    config.remember_dir(&dir);
    if cli.save_config {
        match &config_path {
            Some(path) => {
                config.save(path)?;
                println!("{} Settings saved to {}", style("✓").green().bold(), style(path.display()).dim());
            }
            None => log::warn!("no settings location on this system, not saving"),
        }
    }

    if records.is_empty() {
        println!("No video files in {}", style(dir.display()).cyan());
        sinks.shutdown().await;
        return Ok(());
    }

    println!(
        "{} Found {} videos in {}{}",
        style("✓").green().bold(),
        records.len(),
        style(dir.display()).cyan(),
        if config.preview {
            style(" (preview, nothing will be renamed)").yellow().to_string()
        } else {
            String::new()
        }
    );
    println!("{}", style("─".repeat(60)).dim());

    let options = PipelineOptions {
        preview: config.preview,
        ocr_mode: config.ocr_mode,
        prompt: PromptTemplate::new(&config.system_prompt, &config.user_prompt_template),
        frame_index: config.frame_index,
    };
    let controller = BatchController::spawn(pipeline, records, options);
    controller.start().await?;

    if cli.no_interactive {
        tokio::select! {
            _ = controller.wait_idle() => {}
            _ = tokio::signal::ctrl_c() => {
                controller.stop();
                println!("{}", style("Stopping after the current stage...").yellow());
                controller.wait_idle().await;
            }
        }
        print!("{}", format_table(&controller.snapshot().await));
    } else {
        review::run(&controller).await?;
        if controller.is_busy() {
            controller.stop();
            controller.wait_idle().await;
        }
    }

    let records = controller.shutdown().await;
    sinks.shutdown().await;

    let failed = records.iter().filter(|r| r.status().is_failed()).count();
    if failed > 0 && cli.no_interactive {
        std::process::exit(2);
    }
    Ok(())
}
