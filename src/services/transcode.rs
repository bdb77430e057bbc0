//! src/services/transcode.rs
//!
//! Transcode job runner: re-encodes staged videos to a web-friendly
//! H.264/AAC mp4 capped at 1280x720, via an external ffmpeg process.
//!
//! Jobs of one request run concurrently, but an overall semaphore bound
//! (shared across requests, constructed once at startup) prevents CPU
//! oversubscription on the host. Each job carries an independent hard
//! deadline; expiry kills only that job's encoder process. A failed or
//! timed-out encode falls back to renaming the original staged file into
//! the final slot, so a video that reached this stage is never silently
//! lost. Only when that rename also fails is the video dropped, and the
//! drop is reported as a partial-success outcome.

use crate::{
    models::{
        asset::MediaKind,
        job::{JobOutcome, JobStatus, TranscodeJob},
    },
    services::{media_store::MediaStore, upload::StagedUpload},
};
use chrono::Utc;
use futures::future::{self, BoxFuture};
use std::{
    io,
    path::Path,
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs,
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::{ChildStdout, Command},
    sync::Semaphore,
    time::timeout,
};
use tracing::{error, info, warn};

/// Scale filter constraining output to at most 1280x720 while preserving
/// aspect ratio. `min(...)` against the input dimensions means scaling
/// never upsizes a source that is already smaller.
const SCALE_FILTER: &str =
    "scale='min(1280,iw)':'min(720,ih)':force_original_aspect_ratio=decrease:force_divisible_by=2";

/// How much encoder stderr to keep for error reporting.
const STDERR_TAIL_BYTES: usize = 1024;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("could not spawn encoder: {0}")]
    Spawn(io::Error),
    #[error("encoder exited with {status}: {stderr_tail}")]
    Failed {
        status: ExitStatus,
        stderr_tail: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// External encoder seam. The runner owns timeout and fallback policy;
/// implementations only turn an input file into an encoded output file.
/// The returned future is dropped on deadline expiry, so implementations
/// must terminate any spawned process on drop.
pub trait Encoder: Send + Sync {
    fn encode<'a>(&'a self, input: &'a Path, output: &'a Path)
    -> BoxFuture<'a, Result<(), EncodeError>>;
}

/// ffmpeg-backed [`Encoder`].
#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Probe the source duration in seconds, for progress percentages.
    /// Progress is operational telemetry only, so a failed probe just
    /// disables it.
    async fn probe_duration(&self, input: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| *d > 0.0)
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<(), EncodeError> {
        let duration = self.probe_duration(input).await;

        let mut child = Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-c:v", "libx264", "-c:a", "aac"])
            .args(["-crf", "28", "-preset", "ultrafast"])
            .args(["-movflags", "+faststart"])
            .args(["-vf", SCALE_FILTER])
            .args(["-threads", "0"])
            .args(["-max_muxing_queue_size", "9999"])
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EncodeError::Spawn)?;

        let source = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(stdout) = child.stdout.take() {
            // Detached: drains the progress pipe even when no duration is
            // known, and simply hits EOF if the job is killed.
            tokio::spawn(report_progress(stdout, duration, source));
        }

        let mut stderr_buf = Vec::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_end(&mut stderr_buf).await;
        }
        let status = child.wait().await?;

        if status.success() {
            Ok(())
        } else {
            let start = stderr_buf.len().saturating_sub(STDERR_TAIL_BYTES);
            Err(EncodeError::Failed {
                status,
                stderr_tail: String::from_utf8_lossy(&stderr_buf[start..])
                    .trim()
                    .to_string(),
            })
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn encode<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), EncodeError>> {
        Box::pin(self.run(input, output))
    }
}

/// Parse ffmpeg `-progress` key=value lines and log each new 10-percent
/// step. Nothing blocks on this; the percentage only ever increases.
async fn report_progress(stdout: ChildStdout, total_secs: Option<f64>, source: String) {
    let mut lines = BufReader::new(stdout).lines();
    let mut last_step: u32 = 0;
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(raw) = line
            .strip_prefix("out_time_us=")
            .or_else(|| line.strip_prefix("out_time_ms="))
        else {
            continue;
        };
        let Ok(micros) = raw.trim().parse::<f64>() else {
            continue;
        };
        let Some(total) = total_secs else { continue };
        let percent = ((micros / 1_000_000.0) / total * 100.0).clamp(0.0, 100.0) as u32;
        let step = percent / 10 * 10;
        if step > last_step {
            last_step = step;
            info!(%source, percent = step, "transcode progress");
        }
    }
}

/// Bounded, timeout-enforcing runner for transcode jobs.
#[derive(Clone)]
pub struct TranscodeRunner {
    encoder: Arc<dyn Encoder>,
    permits: Arc<Semaphore>,
    job_timeout: Duration,
}

impl TranscodeRunner {
    pub fn new(encoder: Arc<dyn Encoder>, max_concurrent: usize, job_timeout: Duration) -> Self {
        Self {
            encoder,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            job_timeout,
        }
    }

    /// Run one request's staged videos to completion. Jobs execute
    /// concurrently under the global permit bound; the returned outcomes
    /// are positional, index i matching staged input i, regardless of
    /// completion order. One job's failure never aborts its siblings.
    pub async fn run_batch(&self, store: &MediaStore, staged: &[StagedUpload]) -> Vec<JobOutcome> {
        let jobs: Vec<TranscodeJob> = staged
            .iter()
            .map(|upload| {
                let final_name = MediaStore::final_video_name(&upload.filename);
                let dest = store.dir(MediaKind::Videos).join(&final_name);
                TranscodeJob::new(upload.path.clone(), dest, final_name)
            })
            .collect();
        future::join_all(jobs.into_iter().map(|job| self.run_job(job))).await
    }

    async fn run_job(&self, mut job: TranscodeJob) -> JobOutcome {
        let permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return JobOutcome::Dropped {
                    reason: "transcode runner shut down".into(),
                };
            }
        };

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        info!(
            job = %job.id,
            source = %job.source.display(),
            status = job.status.as_str(),
            "transcode started"
        );

        let result = timeout(self.job_timeout, self.encoder.encode(&job.source, &job.dest)).await;
        drop(permit);

        let reason = match result {
            Ok(Ok(())) => {
                if let Err(err) = fs::remove_file(&job.source).await {
                    warn!(
                        job = %job.id,
                        source = %job.source.display(),
                        "could not delete staged original: {err}"
                    );
                }
                job.status = JobStatus::Succeeded;
                info!(job = %job.id, status = job.status.as_str(), file = %job.dest_filename, "transcode finished");
                return JobOutcome::Succeeded {
                    filename: job.dest_filename,
                };
            }
            Ok(Err(err)) => err.to_string(),
            Err(_elapsed) => format!(
                "transcode deadline of {}s exceeded",
                self.job_timeout.as_secs()
            ),
        };

        warn!(job = %job.id, %reason, "transcode failed, delivering original file");

        // Clear any partial encoder output before the original takes the slot.
        if let Err(err) = fs::remove_file(&job.dest).await
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(job = %job.id, dest = %job.dest.display(), "could not clear partial output: {err}");
        }

        match fs::rename(&job.source, &job.dest).await {
            Ok(()) => {
                job.status = JobStatus::FailedFallback;
                info!(job = %job.id, status = job.status.as_str(), file = %job.dest_filename, "original delivered unchanged");
                JobOutcome::FellBack {
                    filename: job.dest_filename,
                }
            }
            Err(rename_err) => {
                job.status = JobStatus::FailedDropped;
                error!(
                    job = %job.id,
                    status = job.status.as_str(),
                    source = %job.source.display(),
                    "fallback rename failed: {rename_err}"
                );
                let _ = fs::remove_file(&job.source).await;
                JobOutcome::Dropped {
                    reason: format!("{reason}; fallback rename failed: {rename_err}"),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted encoder driven by the source file's content:
    /// - contains "fail": encode error, source left in place (fallback path)
    /// - contains "vanish": encode error after removing the source, so the
    ///   fallback rename also fails (dropped path)
    /// - contains "slow": sleeps far past any sane deadline
    /// - otherwise: writes an "encoded" output file
    pub(crate) struct ScriptedEncoder {
        pub(crate) running: AtomicUsize,
        pub(crate) max_running: AtomicUsize,
    }

    impl ScriptedEncoder {
        pub(crate) fn new() -> Self {
            Self {
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            }
        }
    }

    impl Encoder for ScriptedEncoder {
        fn encode<'a>(
            &'a self,
            input: &'a Path,
            output: &'a Path,
        ) -> BoxFuture<'a, Result<(), EncodeError>> {
            Box::pin(async move {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;

                let content = String::from_utf8_lossy(&fs::read(input).await?).into_owned();
                let result = if content.contains("slow") {
                    tokio::time::sleep(Duration::from_secs(60 * 60 * 3)).await;
                    Ok(())
                } else if content.contains("vanish") {
                    fs::remove_file(input).await?;
                    Err(EncodeError::Spawn(io::Error::other("encoder crashed")))
                } else if content.contains("fail") {
                    Err(EncodeError::Spawn(io::Error::other("encoder crashed")))
                } else {
                    fs::write(output, b"encoded bytes").await?;
                    Ok(())
                };
                self.running.fetch_sub(1, Ordering::SeqCst);
                result
            })
        }
    }
}
