//! Batch media downloader: desktop front-end

use std::{collections::VecDeque, sync::Arc, time::Duration};

use eframe::{App, Frame, egui};
use egui::{Align2, Visuals};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use tokio::{
    runtime::Runtime,
    sync::mpsc::{UnboundedReceiver, error::TryRecvError},
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use batch_media_downloader::{
    batch::{prepare_output_dir, spawn_run},
    engine::YtDlp,
    job::{DEFAULT_OUTPUT_DIR, DownloadOptions},
    model::{Notice, NoticeLevel, RunEvent},
    progress::ProgressState,
    quality::Quality,
};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

const IDLE_STATUS: &str = "Ready to download.";

/// Program entry point: sets up logging and the runtime, then launches the GUI
fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rt = match Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            error!("Failed to start the async runtime: {e}");
            std::process::exit(1);
        }
    };
    let _ = RUNTIME.set(rt);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([650.0, 650.0]),
        ..Default::default()
    };
    info!("Starting UI");
    eframe::run_native(
        "Batch Media Downloader",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::default())
        }),
    )
}

/// Application state for the GUI
struct DownloaderApp {
    /// One source URL per line
    sources_text: String,
    /// Extract mp3 instead of downloading video
    audio_only: bool,
    /// Selected video quality (ignored when audio only)
    quality: Quality,
    /// Destination folder for downloads
    output_dir: String,
    /// A run is in progress; the start button stays disabled
    running: bool,
    /// Last progress snapshot received from the worker
    progress: ProgressState,
    /// Status line
    status: String,
    /// Notices waiting to be acknowledged, oldest first
    notices: VecDeque<Notice>,
    /// Events of the current run
    events: Option<UnboundedReceiver<RunEvent>>,
}

impl Default for DownloaderApp {
    fn default() -> Self {
        Self {
            sources_text: String::new(),
            audio_only: false,
            quality: Quality::default(),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            running: false,
            progress: ProgressState::default(),
            status: IDLE_STATUS.to_string(),
            notices: VecDeque::new(),
            events: None,
        }
    }
}

impl DownloaderApp {
    /// Validates the form and hands the run to the background worker
    fn start(&mut self) {
        let output_dir = match prepare_output_dir(&self.output_dir) {
            Ok(dir) => dir,
            Err(e) => {
                self.notices.push_back(Notice::error(e.to_string()));
                return;
            }
        };

        let engine = match YtDlp::locate() {
            Ok(engine) => engine,
            Err(e) => {
                error!("Cannot locate yt-dlp: {e}");
                self.notices.push_back(Notice::error(e.to_string()));
                return;
            }
        };

        let Some(rt) = RUNTIME.get() else {
            self.notices
                .push_back(Notice::error("The background runtime is not available."));
            return;
        };

        let options = DownloadOptions {
            audio_only: self.audio_only,
            quality: self.quality,
            output_dir,
        };
        info!(
            "Starting run: audio_only={} quality={} dir={}",
            options.audio_only,
            options.quality.label(),
            options.output_dir.display()
        );

        self.progress = ProgressState::default();
        self.running = true;
        self.events = Some(spawn_run(
            rt.handle(),
            Arc::new(engine),
            self.sources_text.clone(),
            options,
        ));
    }

    /// Drains pending worker events
    fn poll_events(&mut self) {
        let Some(rx) = self.events.as_mut() else {
            return;
        };

        let mut pending = Vec::new();
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(event) => pending.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        for event in pending {
            match event {
                RunEvent::Phase(phase) => debug!("Run phase: {phase:?}"),
                RunEvent::Status(text) => self.status = text,
                RunEvent::Progress(state) => self.progress = state,
                RunEvent::Notice(notice) => self.notices.push_back(notice),
                RunEvent::Finished => self.running = false,
            }
        }

        if disconnected || !self.running {
            self.running = false;
            self.events = None;
        }
    }

    /// Shows the oldest notice as a modal window
    fn show_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.notices.front() else {
            return;
        };

        let mut dismissed = false;
        let title = match notice.level {
            NoticeLevel::Info => format!("ℹ {}", notice.title),
            NoticeLevel::Error => format!("⚠ {}", notice.title),
        };
        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(&notice.message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            self.notices.pop_front();
        }
    }

    fn form(&mut self, ui: &mut egui::Ui) {
        ui.heading("Batch Media Downloader");

        ui.label("Video / playlist / channel URL(s), one per line:");
        egui::ScrollArea::vertical()
            .max_height(160.0)
            .show(ui, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut self.sources_text)
                        .desired_rows(8)
                        .desired_width(f32::INFINITY),
                );
            });

        ui.add_space(8.0);
        ui.group(|ui| {
            ui.label("Options");
            ui.checkbox(&mut self.audio_only, "Audio only (mp3)");

            // quality does not apply to audio extraction
            ui.add_enabled_ui(!self.audio_only, |ui| {
                egui::ComboBox::from_label("Video quality")
                    .selected_text(self.quality.label())
                    .show_ui(ui, |ui| {
                        for q in Quality::ALL {
                            ui.selectable_value(&mut self.quality, q, q.label());
                        }
                    });
            });

            ui.horizontal(|ui| {
                ui.label("Output folder:");
                ui.text_edit_singleline(&mut self.output_dir);
                if ui.button("Browse…").clicked() {
                    if let Some(folder) = FileDialog::new()
                        .set_directory(&self.output_dir)
                        .pick_folder()
                    {
                        self.output_dir = folder.display().to_string();
                    }
                }
            });
        });

        ui.add_space(12.0);
        ui.vertical_centered(|ui| {
            if ui
                .add_enabled(!self.running, egui::Button::new("Start downloads"))
                .clicked()
            {
                self.start();
            }
        });

        ui.add_space(12.0);
        ui.group(|ui| {
            ui.label("Progress");
            ui.horizontal(|ui| {
                ui.label("Overall:");
                ui.add(
                    egui::ProgressBar::new(self.progress.overall_fraction()).text(format!(
                        "{}/{}",
                        self.progress.items_done, self.progress.items_total
                    )),
                );
            });
            ui.horizontal(|ui| {
                ui.label("File:");
                ui.add(egui::ProgressBar::new(self.progress.file_fraction()).show_percentage());
            });
        });

        ui.add_space(8.0);
        ui.label(&self.status);
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_events();

        let modal_open = !self.notices.is_empty();
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!modal_open, |ui| self.form(ui));
        });
        self.show_notice(ctx);

        // Worker progress arrives over a channel; keep redrawing while a run is active
        if self.running {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
