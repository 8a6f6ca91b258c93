//! CLI for Effigy - remote image and video generation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use effigy::image::{data_uri, prompts};
use effigy::{
    AspectRatio, ExecutionContext, GenerationClient, ImageConfig, ImageToVideoOptions,
    ModelConfig, ProgressStage, ProviderFamily, TextToVideoOptions, TracingObserver,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "effigy")]
#[command(about = "Generate images and videos through remote generation APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Route requests as a browser-hosted client would (CORS relay rules apply)
    #[arg(long, global = true)]
    browser: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an image from a prompt or a catalogue key
    Image(ImageArgs),

    /// Animate an image into a video
    Video(VideoArgs),

    /// Generate a video from text only (unified provider family)
    TextVideo(TextVideoArgs),

    /// List the built-in prompt catalogue
    Prompts,
}

#[derive(Args)]
struct VideoProviderArgs {
    /// Video API base URL
    #[arg(long, env = "EFFIGY_VIDEO_BASE_URL")]
    base_url: Option<String>,

    /// Video API key
    #[arg(long, env = "EFFIGY_VIDEO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Video model name (e.g. sora-2)
    #[arg(long, env = "EFFIGY_VIDEO_MODEL")]
    model: Option<String>,

    /// Force a provider family instead of detecting it from the base URL
    #[arg(long, value_enum)]
    family: Option<FamilyArg>,

    /// Maximum time to wait for the video, in seconds
    #[arg(long)]
    max_wait: Option<u64>,
}

impl VideoProviderArgs {
    fn config(&self) -> ModelConfig {
        let config = ModelConfig::new(
            self.base_url.clone().unwrap_or_default(),
            self.api_key.clone().unwrap_or_default(),
            self.model.clone().unwrap_or_default(),
        );
        match self.family {
            Some(family) => config.with_family(family.into()),
            None => config,
        }
    }
}

#[derive(Args)]
struct ImageArgs {
    /// The text prompt, or a catalogue key such as `boss` or `luck`
    prompt: String,

    /// Reference image: URL, data URI, or path to a local PNG/JPEG/WebP file
    #[arg(short, long)]
    input: Option<String>,

    /// Image model
    #[arg(long)]
    model: Option<String>,

    /// Image API key
    #[arg(long, env = "MODELSCOPE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Image API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Use async task mode (polls for up to 60s)
    #[arg(long = "async")]
    async_mode: bool,

    /// Return a placeholder image for catalogue prompts if the API is unreachable
    #[arg(long)]
    placeholder: bool,
}

#[derive(Args)]
struct VideoArgs {
    /// The text prompt describing the effect
    prompt: String,

    /// Public image URL (or data URI for the unified family)
    #[arg(long)]
    image: String,

    /// Requested duration in seconds (sora models snap to supported tiers)
    #[arg(short, long)]
    duration: Option<u32>,

    #[command(flatten)]
    provider: VideoProviderArgs,
}

#[derive(Args)]
struct TextVideoArgs {
    /// The text prompt describing the video
    prompt: String,

    /// Requested duration in seconds
    #[arg(short, long)]
    duration: Option<u32>,

    /// Aspect ratio
    #[arg(long, value_enum, default_value = "9:16")]
    aspect_ratio: AspectRatioArg,

    /// Make the result public on the provider side
    #[arg(long)]
    public: bool,

    #[command(flatten)]
    provider: VideoProviderArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FamilyArg {
    Unified,
    Legacy,
}

impl From<FamilyArg> for ProviderFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Unified => ProviderFamily::Unified,
            FamilyArg::Legacy => ProviderFamily::Legacy,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "16:9")]
    Landscape,
    #[value(name = "9:16")]
    Portrait,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Landscape => AspectRatio::Landscape,
            AspectRatioArg::Portrait => AspectRatio::Portrait,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let context = if cli.browser {
        ExecutionContext::Browser
    } else {
        ExecutionContext::Native
    };

    match cli.command {
        Commands::Image(args) => {
            generate_image(args, context, cli.json).await?;
        }
        Commands::Video(args) => {
            generate_video(args, context, cli.json).await?;
        }
        Commands::TextVideo(args) => {
            generate_text_video(args, context, cli.json).await?;
        }
        Commands::Prompts => {
            list_prompts(cli.json)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "effigy=debug" } else { "effigy=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn client(context: ExecutionContext, placeholder: bool) -> GenerationClient {
    GenerationClient::builder()
        .execution_context(context)
        .observer(Arc::new(TracingObserver))
        .placeholder_fallback(placeholder)
        .build()
}

fn print_stage(stage: ProgressStage, percent: Option<u8>) {
    match percent {
        Some(p) => eprintln!("[effigy] {stage} ({p}%)"),
        None => eprintln!("[effigy] {stage}"),
    }
}

/// Reads a local image file into a data URI; URLs and data URIs pass through.
fn resolve_input_image(input: &str) -> anyhow::Result<String> {
    let lower = input.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:") {
        return Ok(input.to_string());
    }
    let bytes = std::fs::read(Path::new(input))?;
    Ok(data_uri(&bytes)?)
}

fn print_result(kind: &str, url: &str, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        let result = serde_json::json!({
            "type": kind,
            "success": true,
            "url": url,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{url}");
    }
    Ok(())
}

async fn generate_image(
    args: ImageArgs,
    context: ExecutionContext,
    json_output: bool,
) -> anyhow::Result<()> {
    let prompt = prompts::lookup(&args.prompt)
        .map(|entry| entry.prompt.to_string())
        .unwrap_or(args.prompt);
    let input = args.input.as_deref().map(resolve_input_image).transpose()?;

    let mut config = ImageConfig::new();
    config.api_key = args.api_key;
    config.model = args.model;
    config.base_url = args.base_url;

    let client = client(context, args.placeholder);
    let url = if args.async_mode {
        client
            .generate_image_async(&prompt, input.as_deref(), Some(&config))
            .await?
    } else {
        client
            .generate_image(&prompt, input.as_deref(), Some(&config))
            .await?
    };

    print_result("image", &url, json_output)
}

async fn generate_video(
    args: VideoArgs,
    context: ExecutionContext,
    json_output: bool,
) -> anyhow::Result<()> {
    let config = args.provider.config();
    let client = client(context, false);
    let progress = |stage: ProgressStage, percent: Option<u8>| print_stage(stage, percent);

    let mut options = ImageToVideoOptions::default();
    if let Some(d) = args.duration {
        options = options.duration(d);
    }
    if let Some(secs) = args.provider.max_wait {
        options = options.max_wait(Duration::from_secs(secs));
    }

    let url = client
        .generate_video_from_image_with_options(
            &args.prompt,
            &args.image,
            &config,
            Some(&progress),
            options,
        )
        .await?;

    print_result("video", &url, json_output)
}

async fn generate_text_video(
    args: TextVideoArgs,
    context: ExecutionContext,
    json_output: bool,
) -> anyhow::Result<()> {
    let config = args.provider.config();
    let mut options = TextToVideoOptions::default()
        .aspect_ratio(args.aspect_ratio.into())
        .private(!args.public);
    if let Some(d) = args.duration {
        options = options.duration(d);
    }
    if let Some(secs) = args.provider.max_wait {
        options = options.max_wait(Duration::from_secs(secs));
    }

    let progress = |stage: ProgressStage, percent: Option<u8>| print_stage(stage, percent);
    let url = client(context, false)
        .generate_video_from_text(&args.prompt, &config, Some(&progress), options)
        .await?;

    print_result("video", &url, json_output)
}

fn list_prompts(json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(prompts::CATALOGUE)?);
        return Ok(());
    }

    for kind in [prompts::PromptKind::Trait, prompts::PromptKind::Ritual] {
        println!("{}:", kind.to_string().to_uppercase());
        for entry in prompts::by_kind(kind) {
            println!("  {} ({})", entry.key, entry.label);
            println!("    {}", entry.prompt);
        }
        println!();
    }
    Ok(())
}
