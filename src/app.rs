//! The egui window: menu, form, progress bar and dialogs.

use std::time::Duration;

use eframe::{App, CreationContext, Frame, egui};
use egui::Visuals;
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::RUNTIME;
use crate::downloader::Fetcher;
use crate::error::DownloadError;
use crate::model::{QualityPreset, Theme};
use crate::session::{Notice, SessionEvent, SessionEventKind, SessionTicket, Shell};

/// Things the user asked for during this frame, applied after drawing
enum Action {
    Start,
    Cancel,
    ChangeFolder,
    OpenFolder,
    SetTheme(Theme),
    About,
    Exit,
}

pub struct TubegrabApp {
    shell: Shell,
    /// Text in the URL field
    url_input: String,
    /// Preset picked in the dropdown
    selected_quality: QualityPreset,
    /// Visuals eframe chose from the platform, restored for `Theme::System`
    system_visuals: Visuals,
    /// Workers send progress and outcomes here; drained every frame
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
}

impl TubegrabApp {
    pub fn new(cc: &CreationContext<'_>, shell: Shell) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let app = Self {
            selected_quality: shell.settings().last_quality,
            shell,
            url_input: String::new(),
            system_visuals: cc.egui_ctx.style().visuals.clone(),
            events_tx,
            events_rx,
        };
        app.apply_theme(&cc.egui_ctx);
        app
    }

    fn apply_theme(&self, ctx: &egui::Context) {
        let visuals = match self.shell.settings().theme {
            Theme::System => self.system_visuals.clone(),
            Theme::Light => Visuals::light(),
            Theme::Dark => Visuals::dark(),
        };
        ctx.set_visuals(visuals);
    }

    fn start_download(&mut self, ctx: &egui::Context) {
        match self.shell.start(&self.url_input, self.selected_quality) {
            Ok(ticket) => self.spawn_worker(ticket, ctx),
            Err(reason) => tracing::debug!(?reason, "download not started"),
        }
    }

    /// Runs the download on the background runtime; the UI only ever sees channel messages.
    fn spawn_worker(&mut self, ticket: SessionTicket, ctx: &egui::Context) {
        let session = ticket.session;
        let Some(runtime) = RUNTIME.get() else {
            tracing::error!("background runtime missing");
            self.shell.handle_event(SessionEvent {
                session,
                kind: SessionEventKind::Finished(Err(DownloadError::FetchFailed(
                    "background runtime is not available".into(),
                ))),
            });
            return;
        };

        let fetcher = Fetcher::from_settings(self.shell.settings());
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        runtime.spawn(async move {
            let progress_tx = tx.clone();
            let progress_ctx = ctx.clone();
            let on_progress = move |snapshot| {
                let _ = progress_tx.send(SessionEvent { session, kind: SessionEventKind::Progress(snapshot) });
                progress_ctx.request_repaint();
            };
            let result = fetcher.download(&ticket.url, ticket.preset, on_progress, ticket.cancel).await;
            // The window may already be closed
            let _ = tx.send(SessionEvent { session, kind: SessionEventKind::Finished(result) });
            ctx.request_repaint();
        });
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.shell.handle_event(event);
        }
    }

    fn show_notices(&mut self) {
        while let Some(notice) = self.shell.take_notice() {
            let (level, title, message) = match notice {
                Notice::Warning { title, message } => (MessageLevel::Warning, title, message),
                Notice::Info { title, message } => (MessageLevel::Info, title, message),
                Notice::Error { title, message } => (MessageLevel::Error, title, message),
            };
            MessageDialog::new()
                .set_level(level)
                .set_title(&title)
                .set_description(&message)
                .set_buttons(MessageButtons::Ok)
                .show();
        }
    }

    fn change_folder(&mut self) {
        let picked = FileDialog::new().set_directory(&self.shell.settings().download_path).pick_folder();
        if let Some(folder) = picked {
            self.shell.set_download_dir(&folder);
        }
    }

    fn open_folder(&self) {
        let folder = self.shell.settings().download_path.clone();
        std::thread::spawn(move || {
            #[cfg(target_os = "windows")]
            let opener = "explorer";
            #[cfg(target_os = "macos")]
            let opener = "open";
            #[cfg(all(unix, not(target_os = "macos")))]
            let opener = "xdg-open";
            if let Err(err) = std::process::Command::new(opener).arg(&folder).spawn() {
                tracing::warn!(%err, dir = %folder.display(), "could not open download folder");
            }
        });
    }

    fn show_about(&self) {
        let text = format!(
            "Tubegrab\nVersion {}\n\n\
             Download videos or audio in the quality you pick.\n\
             Built with Rust, egui and yt-dlp.\n\n\
             Failed or cancelled downloads may leave partial files in the download folder.",
            env!("CARGO_PKG_VERSION")
        );
        MessageDialog::new()
            .set_level(MessageLevel::Info)
            .set_title("About")
            .set_description(&text)
            .set_buttons(MessageButtons::Ok)
            .show();
    }

    fn menu_bar(&self, ui: &mut egui::Ui, action: &mut Option<Action>) {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Change Download Location…").clicked() {
                    *action = Some(Action::ChangeFolder);
                    ui.close_menu();
                }
                if ui.button("Open Download Folder").clicked() {
                    *action = Some(Action::OpenFolder);
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Exit").clicked() {
                    *action = Some(Action::Exit);
                    ui.close_menu();
                }
            });
            ui.menu_button("View", |ui| {
                let current = self.shell.settings().theme;
                for theme in Theme::ALL {
                    if ui.radio(current == theme, theme.label()).clicked() {
                        *action = Some(Action::SetTheme(theme));
                        ui.close_menu();
                    }
                }
            });
            ui.menu_button("Help", |ui| {
                if ui.button("About").clicked() {
                    *action = Some(Action::About);
                    ui.close_menu();
                }
            });
        });
    }

    fn form(&mut self, ui: &mut egui::Ui, action: &mut Option<Action>) {
        let inputs_enabled = self.shell.inputs_enabled();

        ui.heading("Video Downloader");
        ui.add_space(8.0);

        ui.label("Video URL:");
        let url_field = ui.add_enabled(
            inputs_enabled,
            egui::TextEdit::singleline(&mut self.url_input)
                .hint_text("https://www.youtube.com/watch?v=…")
                .desired_width(f32::INFINITY),
        );
        if url_field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            *action = Some(Action::Start);
        }

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.label("Quality:");
            ui.add_enabled_ui(inputs_enabled, |ui| {
                egui::ComboBox::from_id_source("quality")
                    .selected_text(self.selected_quality.label())
                    .show_ui(ui, |ui| {
                        for preset in QualityPreset::ALL {
                            ui.selectable_value(&mut self.selected_quality, preset, preset.label());
                        }
                    });
            });
        });
        ui.horizontal(|ui| {
            ui.label("Save to:");
            ui.monospace(self.shell.settings().download_path.display().to_string());
        });

        ui.add_space(8.0);
        if ui
            .add_enabled(inputs_enabled, egui::Button::new("Download").min_size(egui::vec2(ui.available_width(), 28.0)))
            .clicked()
        {
            *action = Some(Action::Start);
        }

        ui.add_space(16.0);
        ui.label("Download Progress");
        ui.add(egui::ProgressBar::new(self.shell.progress().fraction()).show_percentage());

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.label(&self.shell.progress().status);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.add_enabled(self.shell.cancel_enabled(), egui::Button::new("Cancel")).clicked() {
                    *action = Some(Action::Cancel);
                }
            });
        });
    }
}

impl App for TubegrabApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.drain_events();
        self.show_notices();

        let mut action = None;
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| self.menu_bar(ui, &mut action));
        egui::CentralPanel::default().show(ctx, |ui| self.form(ui, &mut action));

        match action {
            Some(Action::Start) => self.start_download(ctx),
            Some(Action::Cancel) => self.shell.cancel(),
            Some(Action::ChangeFolder) => self.change_folder(),
            Some(Action::OpenFolder) => self.open_folder(),
            Some(Action::SetTheme(theme)) => {
                self.shell.set_theme(theme);
                self.apply_theme(ctx);
            }
            Some(Action::About) => self.show_about(),
            Some(Action::Exit) => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
            None => {}
        }
        // Validation warnings from this frame's start attempt
        self.show_notices();

        if self.shell.is_running() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
