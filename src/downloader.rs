use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, ChildStderr, Command},
    sync::oneshot,
    task::JoinHandle,
};

use crate::error::DownloadError;
use crate::model::{PostProcessing, ProgressSnapshot, QualityPreset};
use crate::progress::{PROGRESS_MARKER, parse_progress_from_line};
use crate::settings::Settings;

/// Drives yt-dlp for one download at a time. Holds no state between calls.
#[derive(Clone, Debug)]
pub struct Fetcher {
    program: String,
    download_dir: PathBuf,
    ffmpeg_location: Option<PathBuf>,
}

impl Fetcher {
    pub fn new(program: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), download_dir: download_dir.into(), ffmpeg_location: None }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            program: settings.yt_dlp_path.clone(),
            download_dir: settings.download_path.clone(),
            ffmpeg_location: settings.ffmpeg_path.clone(),
        }
    }

    /// Command line for a single-video download of `url` at `preset`.
    pub fn build_args(&self, url: &str, preset: QualityPreset) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--restrict-filenames".into(),
            "-f".into(),
            preset.format_expression().into(),
            "--progress-template".into(),
            format!("download:{PROGRESS_MARKER}%(progress)j"),
            "-o".into(),
            self.download_dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned(),
        ];

        match preset.post_processing() {
            PostProcessing::Remux { container } => {
                args.extend(["--merge-output-format".into(), container.into()]);
                args.extend(["--remux-video".into(), container.into()]);
            }
            PostProcessing::ExtractAudio { codec, bitrate } => {
                args.push("--extract-audio".into());
                args.extend(["--audio-format".into(), codec.into()]);
                args.extend(["--audio-quality".into(), bitrate.into()]);
            }
        }

        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.extend(["--ffmpeg-location".into(), ffmpeg.to_string_lossy().into_owned()]);
        }

        args.push("--".into());
        args.push(url.to_owned());
        args
    }

    /// Downloads `url`, calling `on_progress` for every progress record yt-dlp prints.
    ///
    /// Resolving `cancel` (sending, or dropping the sender) kills yt-dlp and
    /// returns [`DownloadError::Cancelled`]. Partial files are left where yt-dlp wrote them.
    pub async fn download<F>(
        &self,
        url: &str,
        preset: QualityPreset,
        mut on_progress: F,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<(), DownloadError>
    where
        F: FnMut(ProgressSnapshot),
    {
        let url = url.trim();
        if url.is_empty() {
            return Err(DownloadError::InvalidInput);
        }

        tracing::info!(url, quality = %preset, dir = %self.download_dir.display(), "starting yt-dlp");
        let mut child = Command::new(&self.program)
            .args(self.build_args(url, preset))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::FetchFailed(format!("could not start {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::FetchFailed("yt-dlp stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::FetchFailed("yt-dlp stderr was not captured".into()))?;
        let stderr_task = collect_stderr(stderr);

        let mut lines = BufReader::new(stdout).lines();
        let cancelled = loop {
            let next = tokio::select! {
                biased;
                _ = &mut cancel => None,
                line = lines.next_line() => Some(line),
            };
            match next {
                None => break true,
                Some(Ok(Some(line))) => match parse_progress_from_line(&line) {
                    Some(snapshot) => on_progress(snapshot),
                    None => tracing::debug!(target: "tubegrab::yt_dlp", "{line}"),
                },
                Some(Ok(None)) => break false,
                Some(Err(err)) => {
                    stderr_task.abort();
                    return Err(DownloadError::FetchFailed(format!("reading yt-dlp output failed: {err}")));
                }
            }
        };
        if cancelled {
            stderr_task.abort();
            return Err(abort(child).await);
        }

        let status = tokio::select! {
            biased;
            _ = &mut cancel => None,
            status = child.wait() => Some(status),
        };
        let status = match status {
            Some(status) => status.map_err(|e| DownloadError::FetchFailed(format!("waiting for yt-dlp failed: {e}")))?,
            None => {
                stderr_task.abort();
                return Err(abort(child).await);
            }
        };

        let stderr_lines = stderr_task.await.unwrap_or_default();
        if status.success() {
            tracing::info!(url, "yt-dlp finished");
            Ok(())
        } else {
            let message = failure_message(&stderr_lines, status);
            tracing::warn!(url, %status, %message, "yt-dlp failed");
            Err(DownloadError::FetchFailed(message))
        }
    }
}

async fn abort(mut child: Child) -> DownloadError {
    if let Err(err) = child.kill().await {
        tracing::debug!(%err, "yt-dlp already gone");
    }
    tracing::info!("download cancelled, yt-dlp killed");
    DownloadError::Cancelled
}

fn collect_stderr(stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    tokio::spawn(read_lines(stderr))
}

async fn read_lines<R: AsyncRead + Unpin>(reader: R) -> Vec<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut kept = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "tubegrab::yt_dlp", "stderr: {line}");
        if !line.trim().is_empty() {
            kept.push(line);
        }
    }
    kept
}

/// Prefers yt-dlp's last `ERROR:` line, then its last stderr line, then the exit status.
fn failure_message(stderr_lines: &[String], status: ExitStatus) -> String {
    stderr_lines
        .iter()
        .rev()
        .find_map(|l| l.trim().strip_prefix("ERROR:").map(|m| m.trim().to_string()))
        .or_else(|| stderr_lines.last().map(|l| l.trim().to_string()))
        .unwrap_or_else(|| format!("yt-dlp exited with {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProgressPhase;

    fn fetcher() -> Fetcher {
        Fetcher::new("yt-dlp", "/media/videos")
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).map(String::as_str)
    }

    #[test]
    fn video_args_remux_to_mp4() {
        let args = fetcher().build_args("https://example.com/watch?v=1", QualityPreset::P720);
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--restrict-filenames".to_string()));
        assert_eq!(value_after(&args, "-f"), Some(QualityPreset::P720.format_expression()));
        assert_eq!(value_after(&args, "--remux-video"), Some("mp4"));
        assert_eq!(value_after(&args, "--merge-output-format"), Some("mp4"));
        assert!(!args.contains(&"--extract-audio".to_string()));
        let out = value_after(&args, "-o").unwrap();
        assert!(out.starts_with("/media/videos"));
        assert!(out.ends_with("%(title)s.%(ext)s"));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/watch?v=1"));
        assert_eq!(args[args.len() - 2], "--");
    }

    #[test]
    fn audio_args_extract_mp3() {
        let args = fetcher().build_args("https://example.com/a", QualityPreset::AudioOnly);
        assert!(args.contains(&"--extract-audio".to_string()));
        assert_eq!(value_after(&args, "--audio-format"), Some("mp3"));
        assert_eq!(value_after(&args, "--audio-quality"), Some("192K"));
        assert!(value_after(&args, "--remux-video").is_none());
    }

    #[test]
    fn progress_template_carries_marker() {
        let args = fetcher().build_args("u", QualityPreset::P1080);
        let template = value_after(&args, "--progress-template").unwrap();
        assert_eq!(template, format!("download:{PROGRESS_MARKER}%(progress)j"));
    }

    #[test]
    fn ffmpeg_location_from_settings() {
        let settings = Settings { ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin")), ..Settings::default() };
        let args = Fetcher::from_settings(&settings).build_args("u", QualityPreset::P480);
        assert_eq!(value_after(&args, "--ffmpeg-location"), Some("/opt/ffmpeg/bin"));
        assert!(value_after(&fetcher().build_args("u", QualityPreset::P480), "--ffmpeg-location").is_none());
    }

    #[test]
    fn failure_message_prefers_error_line() {
        #[cfg(unix)]
        let status = {
            use std::os::unix::process::ExitStatusExt;
            ExitStatus::from_raw(1 << 8)
        };
        #[cfg(windows)]
        let status = {
            use std::os::windows::process::ExitStatusExt;
            ExitStatus::from_raw(1)
        };
        let lines = vec![
            "ERROR: [generic] first".to_string(),
            "ERROR: Unsupported URL: https://nope".to_string(),
            "trailing noise".to_string(),
        ];
        assert_eq!(failure_message(&lines, status), "Unsupported URL: https://nope");
        assert_eq!(failure_message(&["oops".to_string()], status), "oops");
        assert!(failure_message(&[], status).starts_with("yt-dlp exited with"));
    }

    #[tokio::test]
    async fn blank_url_is_rejected_before_spawning() {
        let (_tx, rx) = oneshot::channel();
        let result = Fetcher::new("/definitely/not/here", "/tmp").download("   ", QualityPreset::P720, |_| {}, rx).await;
        assert_eq!(result, Err(DownloadError::InvalidInput));
    }

    #[tokio::test]
    async fn missing_program_is_a_fetch_failure() {
        let (_tx, rx) = oneshot::channel();
        let result = Fetcher::new("/definitely/not/here/yt-dlp", "/tmp")
            .download("https://example.com/v", QualityPreset::P720, |_| {}, rx)
            .await;
        match result {
            Err(DownloadError::FetchFailed(msg)) => assert!(msg.contains("could not start")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// Runs a stand-in shell script in place of yt-dlp.
    #[cfg(unix)]
    #[tokio::test]
    async fn drives_a_fake_fetcher() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        };

        let ok = script(
            "ok.sh",
            "echo 'tubegrab-progress:{\"status\": \"downloading\", \"downloaded_bytes\": 50, \"total_bytes\": 100}'\n\
             echo '[download] Destination: clip.mp4'\n\
             echo 'tubegrab-progress:{\"status\": \"finished\", \"downloaded_bytes\": 100, \"total_bytes\": 100}'",
        );
        let failing = script("fail.sh", "echo 'ERROR: Video unavailable' >&2\nexit 1");
        let slow = script("slow.sh", "exec sleep 30");

        let mut seen = Vec::new();
        let (_tx, rx) = oneshot::channel();
        let result = Fetcher::new(ok, dir.path())
            .download("https://example.com/v", QualityPreset::P1080, |s| seen.push(s), rx)
            .await;
        assert_eq!(result, Ok(()));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].phase, ProgressPhase::Downloading);
        assert_eq!(seen[0].total_bytes, Some(100));
        assert_eq!(seen[1].phase, ProgressPhase::Finished);

        let (_tx, rx) = oneshot::channel();
        let result = Fetcher::new(failing, dir.path())
            .download("https://example.com/v", QualityPreset::P1080, |_| {}, rx)
            .await;
        assert_eq!(result, Err(DownloadError::FetchFailed("Video unavailable".into())));

        let (tx, rx) = oneshot::channel();
        let fetcher = Fetcher::new(slow, dir.path());
        let handle = tokio::spawn(async move {
            fetcher.download("https://example.com/v", QualityPreset::P1080, |_| {}, rx).await
        });
        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), Err(DownloadError::Cancelled));
    }
}
