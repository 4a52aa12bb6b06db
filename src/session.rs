//! Download session lifecycle behind the window.
//!
//! The shell rests in `Idle` or `Running`. Completion, failure and
//! cancellation are outcomes of leaving `Running`; each one queues a
//! [`Notice`] for the window and puts the shell back in `Idle`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tokio::sync::oneshot;

use crate::error::DownloadError;
use crate::model::{ProgressSnapshot, QualityPreset, Theme};
use crate::progress::ProgressView;
use crate::settings::{Settings, SettingsStore, ensure_download_dir};

pub type SessionId = u64;

/// A message for the user, shown as a dialog by the window
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Warning { title: String, message: String },
    Info { title: String, message: String },
    Error { title: String, message: String },
}

/// Sent from a download worker to the UI thread
#[derive(Debug)]
pub struct SessionEvent {
    pub session: SessionId,
    pub kind: SessionEventKind,
}

#[derive(Debug)]
pub enum SessionEventKind {
    Progress(ProgressSnapshot),
    Finished(Result<(), DownloadError>),
}

/// The one in-flight download
#[derive(Debug)]
pub struct DownloadSession {
    id: SessionId,
    destination: PathBuf,
    cancel: oneshot::Sender<()>,
}

impl DownloadSession {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Everything a worker needs to run the session that was just started
#[derive(Debug)]
pub struct SessionTicket {
    pub session: SessionId,
    pub url: String,
    pub preset: QualityPreset,
    pub cancel: oneshot::Receiver<()>,
}

/// Why `start` did not start anything
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartRejected {
    /// URL was empty after trimming; a warning notice was queued
    EmptyUrl,
    /// A session is already running
    Busy,
}

#[derive(Debug)]
enum SessionState {
    Idle,
    Running(DownloadSession),
}

/// Owns the settings, the progress view and the current session
pub struct Shell {
    settings: Settings,
    store: SettingsStore,
    state: SessionState,
    last_session: SessionId,
    progress: ProgressView,
    notices: VecDeque<Notice>,
}

impl Shell {
    pub fn new(settings: Settings, store: SettingsStore) -> Self {
        ensure_download_dir(&settings.download_path);
        Self {
            settings,
            store,
            state: SessionState::Idle,
            last_session: 0,
            progress: ProgressView::default(),
            notices: VecDeque::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn progress(&self) -> &ProgressView {
        &self.progress
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Running(_))
    }

    /// URL field, quality selector and Download button
    pub fn inputs_enabled(&self) -> bool {
        !self.is_running()
    }

    pub fn cancel_enabled(&self) -> bool {
        self.is_running()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        match &self.state {
            SessionState::Running(session) => Some(session.id()),
            SessionState::Idle => None,
        }
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    /// Idle -> Running. On success the caller must spawn exactly one worker for the ticket.
    pub fn start(&mut self, url: &str, preset: QualityPreset) -> Result<SessionTicket, StartRejected> {
        if self.is_running() {
            tracing::debug!("start ignored, a download is already running");
            return Err(StartRejected::Busy);
        }
        let url = url.trim();
        if url.is_empty() {
            self.notices.push_back(Notice::Warning {
                title: "Input Error".into(),
                message: "Please enter a video URL".into(),
            });
            return Err(StartRejected::EmptyUrl);
        }

        self.settings.last_quality = preset;
        self.store.save(&self.settings);

        self.last_session += 1;
        let id = self.last_session;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.state = SessionState::Running(DownloadSession {
            id,
            destination: self.settings.download_path.clone(),
            cancel: cancel_tx,
        });
        self.progress.reset("Starting download...");
        tracing::info!(session = id, url, quality = %preset, "session started");

        Ok(SessionTicket { session: id, url: url.to_owned(), preset, cancel: cancel_rx })
    }

    /// Running -> Idle right away, and tells the worker to kill yt-dlp.
    pub fn cancel(&mut self) {
        let SessionState::Running(session) = std::mem::replace(&mut self.state, SessionState::Idle) else {
            return;
        };
        // The worker may already have finished; a closed receiver is fine.
        let _ = session.cancel.send(());
        tracing::info!(session = session.id, "session cancelled");
        self.progress.reset("Download cancelled");
    }

    /// Applies a worker event. Events from sessions that are no longer current are dropped.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if self.current_session() != Some(event.session) {
            tracing::debug!(session = event.session, "dropping event from stale session");
            return;
        }

        match event.kind {
            SessionEventKind::Progress(snapshot) => self.progress.apply(&snapshot),
            SessionEventKind::Finished(result) => self.finish(result),
        }
    }

    fn finish(&mut self, result: Result<(), DownloadError>) {
        let SessionState::Running(session) = std::mem::replace(&mut self.state, SessionState::Idle) else {
            return;
        };
        match result {
            Ok(()) => {
                tracing::info!(session = session.id, "session completed");
                self.notices.push_back(Notice::Info {
                    title: "Success".into(),
                    message: format!("Download completed!\nSaved to: {}", session.destination.display()),
                });
                self.progress.reset("Download complete");
            }
            Err(DownloadError::Cancelled) => {
                self.progress.reset("Download cancelled");
            }
            Err(err) => {
                tracing::warn!(session = session.id, %err, "session failed");
                self.notices.push_back(Notice::Error {
                    title: "Error".into(),
                    message: format!("Download failed: {err}"),
                });
                self.progress.reset("Download failed");
            }
        }
    }

    /// Switches the download folder, creating it, and persists the choice.
    pub fn set_download_dir(&mut self, path: &Path) {
        ensure_download_dir(path);
        self.settings.download_path = path.to_path_buf();
        self.store.save(&self.settings);
        tracing::info!(dir = %path.display(), "download folder changed");
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if self.settings.theme != theme {
            self.settings.theme = theme;
            self.store.save(&self.settings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProgressPhase;
    use tempfile::TempDir;

    fn shell() -> (Shell, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings { download_path: dir.path().join("downloads"), ..Settings::default() };
        let store = SettingsStore::new(dir.path().join("settings.json"));
        (Shell::new(settings, store), dir)
    }

    fn progress(session: SessionId, downloaded: u64, total: u64) -> SessionEvent {
        SessionEvent {
            session,
            kind: SessionEventKind::Progress(ProgressSnapshot {
                phase: ProgressPhase::Downloading,
                downloaded_bytes: downloaded,
                total_bytes: Some(total),
                speed_bytes_per_sec: None,
                eta_seconds: None,
            }),
        }
    }

    fn finished(session: SessionId, result: Result<(), DownloadError>) -> SessionEvent {
        SessionEvent { session, kind: SessionEventKind::Finished(result) }
    }

    #[test]
    fn new_shell_is_idle_and_creates_download_dir() {
        let (shell, dir) = shell();
        assert!(shell.inputs_enabled());
        assert!(!shell.cancel_enabled());
        assert_eq!(shell.progress().percentage, 0.0);
        assert!(dir.path().join("downloads").is_dir());
    }

    #[test]
    fn start_with_url_runs_and_persists_quality() {
        let (mut shell, dir) = shell();
        let ticket = shell.start("  https://example.com/watch?v=abc  ", QualityPreset::P480).unwrap();
        assert_eq!(ticket.url, "https://example.com/watch?v=abc");
        assert_eq!(ticket.preset, QualityPreset::P480);
        assert!(shell.is_running());
        assert!(!shell.inputs_enabled());
        assert!(shell.cancel_enabled());
        assert_eq!(shell.current_session(), Some(ticket.session));

        let saved = SettingsStore::new(dir.path().join("settings.json")).try_load().unwrap();
        assert_eq!(saved.last_quality, QualityPreset::P480);
    }

    #[test]
    fn blank_url_stays_idle_with_warning() {
        let (mut shell, _dir) = shell();
        for url in ["", "   ", "\t\n"] {
            assert_eq!(shell.start(url, QualityPreset::P720).unwrap_err(), StartRejected::EmptyUrl);
            assert!(!shell.is_running());
            assert!(matches!(shell.take_notice(), Some(Notice::Warning { .. })));
        }
    }

    #[test]
    fn second_start_while_running_is_ignored() {
        let (mut shell, _dir) = shell();
        let first = shell.start("https://a", QualityPreset::P720).unwrap();
        assert_eq!(shell.start("https://b", QualityPreset::P1080).unwrap_err(), StartRejected::Busy);
        assert_eq!(shell.current_session(), Some(first.session));
        assert_eq!(shell.settings().last_quality, QualityPreset::P720);
        assert!(shell.take_notice().is_none());
    }

    #[test]
    fn progress_then_completion_returns_to_idle() {
        let (mut shell, _dir) = shell();
        let ticket = shell.start("https://a", QualityPreset::P720).unwrap();
        shell.handle_event(progress(ticket.session, 52_428_800, 104_857_600));
        assert_eq!(shell.progress().percentage, 50.0);

        shell.handle_event(finished(ticket.session, Ok(())));
        assert!(!shell.is_running());
        assert_eq!(shell.progress().percentage, 0.0);
        match shell.take_notice() {
            Some(Notice::Info { message, .. }) => assert!(message.contains("downloads")),
            other => panic!("unexpected notice: {other:?}"),
        }
    }

    #[test]
    fn failure_shows_error_and_returns_to_idle() {
        let (mut shell, _dir) = shell();
        let ticket = shell.start("https://a", QualityPreset::AudioOnly).unwrap();
        shell.handle_event(finished(ticket.session, Err(DownloadError::FetchFailed("HTTP Error 403".into()))));
        assert!(shell.inputs_enabled());
        assert_eq!(
            shell.take_notice(),
            Some(Notice::Error { title: "Error".into(), message: "Download failed: HTTP Error 403".into() })
        );
    }

    #[test]
    fn cancel_resets_signals_worker_and_ignores_late_events() {
        let (mut shell, _dir) = shell();
        let mut ticket = shell.start("https://a", QualityPreset::P720).unwrap();
        shell.handle_event(progress(ticket.session, 30, 100));

        shell.cancel();
        assert!(shell.inputs_enabled());
        assert_eq!(shell.progress().percentage, 0.0);
        assert_eq!(shell.progress().status, "Download cancelled");
        assert_eq!(ticket.cancel.try_recv(), Ok(()));

        shell.handle_event(progress(ticket.session, 90, 100));
        shell.handle_event(finished(ticket.session, Err(DownloadError::FetchFailed("late".into()))));
        assert_eq!(shell.progress().percentage, 0.0);
        assert!(shell.take_notice().is_none());

        let next = shell.start("https://b", QualityPreset::P720).unwrap();
        assert_ne!(next.session, ticket.session);
        shell.handle_event(finished(ticket.session, Ok(())));
        assert!(shell.is_running());
    }

    #[test]
    fn cancel_when_idle_does_nothing() {
        let (mut shell, _dir) = shell();
        shell.cancel();
        assert_eq!(shell.progress().status, "Ready to download");
    }

    #[test]
    fn download_dir_and_theme_are_persisted() {
        let (mut shell, dir) = shell();
        let target = dir.path().join("elsewhere");
        shell.set_download_dir(&target);
        shell.set_theme(Theme::Dark);
        assert!(target.is_dir());

        let saved = SettingsStore::new(dir.path().join("settings.json")).try_load().unwrap();
        assert_eq!(saved.download_path, target);
        assert_eq!(saved.theme, Theme::Dark);
    }
}
