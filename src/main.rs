//! Tubegrab: paste a video URL, pick a quality, download it with yt-dlp.

// egui window and dialogs
mod app;
// yt-dlp command line and child process handling
mod downloader;
// Error types
mod error;
// Quality presets, themes and progress snapshots
mod model;
// Progress line parsing and status text
mod progress;
// Idle/Running state machine behind the window
mod session;
// Persisted user settings
mod settings;

use std::sync::Arc;

use eframe::egui;
use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use app::TubegrabApp;
use session::Shell;
use settings::SettingsStore;

// Global Tokio runtime; downloads run here, never on the UI thread
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tubegrab=info")))
        .init();

    let rt = Arc::new(Runtime::new()?);
    if RUNTIME.set(rt).is_err() {
        tracing::warn!("runtime already initialised");
    }

    let store = SettingsStore::default_location();
    tracing::info!(path = %store.path().display(), "settings file");
    let settings = store.load();
    let shell = Shell::new(settings, store);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([600.0, 500.0])
            .with_min_inner_size([600.0, 500.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Tubegrab",
        options,
        Box::new(move |cc| Box::new(TubegrabApp::new(cc, shell))),
    )?;
    Ok(())
}
