use clap::{Parser, Subcommand};
use ims::config::{self, ServiceConfig};
use ims::handler::resolve_blur;
use ims::imaging::RustBackend;
use ims::metadata::ImageMetadata;
use ims::pipeline::{self, RunOptions};
use ims::{server, transform};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let revision = env!("IMS_BUILD_REVISION");
    if revision.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        // Leaked once at startup
        Box::leak(format!("{}@{revision}", env!("CARGO_PKG_VERSION")).into_boxed_str())
    }
}

#[derive(Parser)]
#[command(name = "ims")]
#[command(about = "Image manipulation service")]
#[command(long_about = "\
Image manipulation service

Serves derived variants of stored originals over HTTP:

  GET /i/{image_id}?v&w&h&fit&fmt&q&crop&blur&context&watermark&slug

  w, h        target box (16-4096)         fit      inside|contain|cover|fill
  fmt         jpeg|webp                    q        quality 1-100 (default 85)
  crop        face|body|interest|explicit|center
  blur        none|eyes|face|full          context  public|private
  watermark   brand|user|none              slug     user handle for watermark=user

Crops and region blurs use per-image ML metadata (<image_id>.json) when a
metadata root is configured; the blur policy decides what public and private
images get by default.

Run 'ims gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Service config file (stock defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Override `[server] bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Apply a transform to a local file, the same way the server would
    Transform {
        /// Original image
        input: PathBuf,
        /// Where to write the result
        #[arg(short, long)]
        output: PathBuf,
        /// Transform parameter, repeatable (e.g. --param w=400 --param fmt=webp)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// ML metadata document for the input
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
    /// Validate the config file without starting anything
    CheckConfig,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got {s:?}"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ims=info,tower_http=info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => {
            init_tracing();
            let mut config = config::load_config(cli.config.as_deref())?;
            if let Some(bind) = bind {
                config.server.bind = bind;
                config.validate()?;
            }
            server::serve(&config).await?;
        }
        Command::Transform {
            input,
            output,
            params,
            metadata,
        } => {
            init_tracing();
            let config = config::load_config(cli.config.as_deref())?;
            run_transform(&config, &input, &output, params, metadata)?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::CheckConfig => {
            let config = config::load_config(cli.config.as_deref())?;
            println!("==> Config is valid");
            println!(
                "    bind {}, storage {}, metadata {}",
                config.server.bind,
                describe_root(config.storage.root.as_ref()),
                describe_root(config.metadata.root.as_ref()),
            );
            println!(
                "    cache {} entries, blur policy v{} (public {}, private {})",
                config.cache.max_entries,
                config.blur_policy.version,
                config.blur_policy.public_default,
                config.blur_policy.private_default,
            );
        }
    }

    Ok(())
}

fn describe_root(root: Option<&PathBuf>) -> String {
    root.map_or_else(|| "unset".to_string(), |p| p.display().to_string())
}

fn run_transform(
    config: &ServiceConfig,
    input: &std::path::Path,
    output: &std::path::Path,
    params: Vec<(String, String)>,
    metadata: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let params: HashMap<String, String> = params.into_iter().collect();
    let spec = transform::parse(Some(&params))?;
    let metadata: Option<ImageMetadata> = match metadata {
        Some(path) => Some(serde_json::from_slice(&std::fs::read(path)?)?),
        None => None,
    };
    let blur = resolve_blur(&config.blur_policy, &spec, metadata.as_ref());

    let original = std::fs::read(input)?;
    let rendered = pipeline::run(
        &RustBackend::new(),
        &original,
        &spec,
        RunOptions {
            metadata: metadata.as_ref(),
            blur,
            watermark: spec.active_watermark(),
            slug: spec.slug.as_deref(),
            brand_text: config.watermark.brand_text.trim(),
        },
    )?;
    std::fs::write(output, &rendered.bytes)?;
    println!(
        "{} → {} ({}, {} bytes, blur {})",
        input.display(),
        output.display(),
        rendered.content_type,
        rendered.bytes.len(),
        blur
    );
    Ok(())
}
