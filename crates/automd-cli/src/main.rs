//! automd CLI - preview how pages are served to AI agents

mod preview;

use automd::{effective_matchers, html_to_markdown_with, matches_any, AutoMarkdownConfig};
use clap::{Parser, Subcommand, ValueEnum};
use preview::{fetch_preview, Preview, DEFAULT_AGENT_USER_AGENT};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Output format for fetch subcommand
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Markdown with YAML frontmatter
    #[default]
    Md,
    /// JSON format
    Json,
}

/// automd - serve HTML as Markdown to AI agents
#[derive(Parser, Debug)]
#[command(name = "automd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file (matchers, content types, converter options)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert an HTML file (or stdin) to Markdown
    Convert {
        /// HTML file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Resolve relative links and images against this URL
        #[arg(long)]
        base_url: Option<String>,

        /// Render links as their text only
        #[arg(long)]
        link_as_text: bool,

        /// Drop images
        #[arg(long)]
        hide_images: bool,
    },
    /// Classify a set of request headers as agent or browser
    Detect {
        /// Request header as "name: value"; repeatable
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,
    },
    /// Fetch URL as an agent and output the Markdown it would receive
    Fetch {
        /// URL to fetch
        url: String,

        /// Output format
        #[arg(long, short, default_value = "md")]
        output: OutputFormat,

        /// User-Agent to send
        #[arg(long, default_value = DEFAULT_AGENT_USER_AGENT)]
        user_agent: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    match cli.command {
        Commands::Convert {
            file,
            base_url,
            link_as_text,
            hide_images,
        } => {
            run_convert(config, file, base_url, link_as_text, hide_images).await;
        }
        Commands::Detect { headers } => run_detect(&config, &headers),
        Commands::Fetch {
            url,
            output,
            user_agent,
        } => {
            run_fetch(&config, &url, output, &user_agent).await;
        }
    }
}

async fn load_config(path: Option<&Path>) -> Result<AutoMarkdownConfig, String> {
    let Some(path) = path else {
        return Ok(AutoMarkdownConfig::default());
    };
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Error reading config {}: {}", path.display(), e))?;
    AutoMarkdownConfig::from_json(&json)
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

async fn run_convert(
    config: AutoMarkdownConfig,
    file: Option<PathBuf>,
    base_url: Option<String>,
    link_as_text: bool,
    hide_images: bool,
) {
    let base_url = match base_url.as_deref().map(Url::parse).transpose() {
        Ok(url) => url,
        Err(e) => fail(&format!("Invalid base URL: {}", e)),
    };

    let html = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Error reading {}: {}", path.display(), e)),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .map(|_| buf)
                .map_err(|e| format!("Error reading stdin: {}", e))
        }
    };
    let html = html.unwrap_or_else(|e| fail(&e));

    let mut options = config.html_to_markdown;
    options.link_as_text |= link_as_text;
    options.hide_images |= hide_images;

    writeln_safe(&html_to_markdown_with(&html, base_url.as_ref(), &options));
}

fn run_detect(config: &AutoMarkdownConfig, raw_headers: &[String]) {
    let headers = parse_headers(raw_headers).unwrap_or_else(|e| fail(&e));
    let matchers = effective_matchers(config);

    if matches_any(&headers, &matchers, config.empty_matcher_policy) {
        writeln_safe("agent");
    } else {
        writeln_safe("browser");
        std::process::exit(1);
    }
}

/// Parse "name: value" pairs into a header map
fn parse_headers(raw_headers: &[String]) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    for raw in raw_headers {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| format!("Invalid header {:?}: expected \"name: value\"", raw))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| format!("Invalid header name {:?}", name.trim()))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| format!("Invalid header value for {}", name))?;
        headers.append(name, value);
    }
    Ok(headers)
}

async fn run_fetch(
    config: &AutoMarkdownConfig,
    url: &str,
    output: OutputFormat,
    user_agent: &str,
) {
    match fetch_preview(url, user_agent, config).await {
        Ok(preview) => match output {
            OutputFormat::Md => writeln_safe(&format_md_with_frontmatter(&preview)),
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&preview)
                    .unwrap_or_else(|e| fail(&format!("Error serializing response: {}", e)));
                writeln_safe(&json);
            }
        },
        Err(e) => fail(&format!("Error: {}", e)),
    }
}

/// Format preview as markdown with YAML frontmatter
fn format_md_with_frontmatter(preview: &Preview) -> String {
    let mut output = String::new();

    output.push_str("---\n");
    output.push_str(&format!("url: {}\n", preview.url));
    output.push_str(&format!("status_code: {}\n", preview.status_code));
    if let Some(ref ct) = preview.content_type {
        output.push_str(&format!("source_content_type: {}\n", ct));
    }
    if preview.converted {
        output.push_str("converted: true\n");
    }
    output.push_str("---\n");
    output.push_str(&preview.content);

    output
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(2);
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}
