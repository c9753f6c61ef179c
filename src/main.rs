use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use blog_pipeline::config::AppConfig;
use blog_pipeline::relay::RelayClient;
use blog_pipeline::{server, GenerationRequest, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "blog-pipeline", version, about = "SEO blog generation over a chat-completion model")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, short, global = true, env = "BLOG_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Generate one article and print the markdown.
    Generate(GenerateArgs),
    /// Send a prompt to a running server and print what a chat user would see.
    Ask(AskArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "BLOG_PIPELINE_HOST")]
    host: Option<String>,
    #[arg(long, env = "BLOG_PIPELINE_PORT")]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Article topic; skips parameter extraction.
    #[arg(long, conflicts_with = "prompt")]
    topic: Option<String>,
    /// Approximate number of paragraphs (1-10).
    #[arg(long, requires = "topic")]
    length: Option<i64>,
    /// Free-form request, e.g. "a short post about e-bikes".
    #[arg(long)]
    prompt: Option<String>,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Message to send.
    text: String,
    /// Server root URL.
    #[arg(long, env = "BACKEND_BASE_URL", default_value = "http://127.0.0.1:8000")]
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Command::Serve(ref args) => {
            let mut config = load_config(&cli)?;
            if let Some(host) = &args.host {
                config.server.host = host.clone();
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            server::serve(&config).await
        }
        Command::Generate(ref args) => generate(&cli, args).await,
        Command::Ask(ref args) => {
            let reply = RelayClient::new(&args.url).ask(&args.text).await;
            println!("{}", reply);
            Ok(())
        }
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "blog_pipeline=info",
        1 => "blog_pipeline=debug",
        _ => "blog_pipeline=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    AppConfig::load(cli.config.as_deref()).context("loading configuration")
}

async fn generate(cli: &Cli, args: &GenerateArgs) -> Result<()> {
    let config = load_config(cli)?;
    let ctx = config.exec_ctx()?;
    let orchestrator = Orchestrator::from_config(&config);

    let request = match (&args.topic, &args.prompt) {
        (Some(topic), _) => GenerationRequest {
            topic: Some(topic.clone()),
            length: args.length,
            prompt: None,
        },
        (None, Some(prompt)) => GenerationRequest::from_prompt(prompt.clone()),
        (None, None) => ask_interactively()?,
    };

    let cancellation = ctx.cancellation.clone();
    let response = tokio::select! {
        r = orchestrator.run(&ctx, &request) => r?,
        _ = tokio::signal::ctrl_c() => {
            cancellation.cancel();
            bail!("interrupted");
        }
    };
    info!(chars = response.content.len(), "article ready");
    println!("{}", response.content);
    Ok(())
}

/// Read topic and length from the terminal.
fn ask_interactively() -> Result<GenerationRequest> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut read = |label: &str| -> Result<String> {
        print!("{}: ", label);
        io::stdout().flush()?;
        Ok(lines.next().transpose()?.unwrap_or_default().trim().to_string())
    };

    let topic = read("Enter the blog topic")?;
    if topic.is_empty() {
        bail!("a topic is required");
    }
    let length = read("Enter the number of paragraphs")?
        .parse::<i64>()
        .ok();
    Ok(GenerationRequest {
        topic: Some(topic),
        length,
        prompt: None,
    })
}
