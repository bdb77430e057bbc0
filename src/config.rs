use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub media_dir: String,
    /// Global ceiling on concurrently running encoder processes.
    pub max_transcodes: usize,
    /// Hard per-job deadline in seconds.
    pub transcode_timeout_secs: u64,
    pub ffmpeg: String,
    pub ffprobe: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Course media ingestion and delivery server")]
pub struct Args {
    /// Host to bind to (overrides COURSE_MEDIA_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides COURSE_MEDIA_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where media files are stored (overrides COURSE_MEDIA_DIR)
    #[arg(long)]
    pub media_dir: Option<String>,

    /// Max concurrent transcode jobs (overrides COURSE_MEDIA_MAX_TRANSCODES)
    #[arg(long)]
    pub max_transcodes: Option<usize>,

    /// Per-job transcode deadline in seconds (overrides COURSE_MEDIA_TRANSCODE_TIMEOUT_SECS)
    #[arg(long)]
    pub transcode_timeout_secs: Option<u64>,

    /// ffmpeg binary (overrides COURSE_MEDIA_FFMPEG)
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// ffprobe binary (overrides COURSE_MEDIA_FFPROBE)
    #[arg(long)]
    pub ffprobe: Option<String>,
}

/// Default deadline: two hours, sized for very large lecture recordings.
const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 2 * 60 * 60;

fn default_max_transcodes() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("COURSE_MEDIA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed("COURSE_MEDIA_PORT", 3000u16)?;
        let env_media_dir = env::var("COURSE_MEDIA_DIR").unwrap_or_else(|_| "./data/media".into());
        let env_max_transcodes =
            env_parsed("COURSE_MEDIA_MAX_TRANSCODES", default_max_transcodes())?;
        let env_timeout = env_parsed(
            "COURSE_MEDIA_TRANSCODE_TIMEOUT_SECS",
            DEFAULT_TRANSCODE_TIMEOUT_SECS,
        )?;
        let env_ffmpeg = env::var("COURSE_MEDIA_FFMPEG").unwrap_or_else(|_| "ffmpeg".into());
        let env_ffprobe = env::var("COURSE_MEDIA_FFPROBE").unwrap_or_else(|_| "ffprobe".into());

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            media_dir: args.media_dir.unwrap_or(env_media_dir),
            max_transcodes: args.max_transcodes.unwrap_or(env_max_transcodes),
            transcode_timeout_secs: args.transcode_timeout_secs.unwrap_or(env_timeout),
            ffmpeg: args.ffmpeg.unwrap_or(env_ffmpeg),
            ffprobe: args.ffprobe.unwrap_or(env_ffprobe),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
