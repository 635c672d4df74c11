//! Download of a single item.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::engine::{AudioExtract, DownloadPlan, Engine};
use crate::error::Error;
use crate::progress::ProgressEvent;
use crate::quality::Quality;

/// Folder used when the output directory is left blank.
pub const DEFAULT_OUTPUT_DIR: &str = "youtube";

/// File, inside the output folder, where yt-dlp records finished items.
pub const ARCHIVE_FILE_NAME: &str = "downloaded.txt";

const AUDIO_FORMAT: &str = "bestaudio/best";
const AUDIO_CODEC: &str = "mp3";
const AUDIO_QUALITY: &str = "192K";

/// Options shared by every item of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub audio_only: bool,
    pub quality: Quality,
    pub output_dir: PathBuf,
}

impl DownloadOptions {
    /// The output folder, or [`DEFAULT_OUTPUT_DIR`] when blank.
    pub fn effective_output_dir(&self) -> PathBuf {
        if self.output_dir.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        } else {
            self.output_dir.clone()
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Translates run options into an engine download for `url`.
///
/// Audio-only always takes the best audio stream and converts it to mp3,
/// whatever quality is selected.
pub fn build_plan(url: &str, options: &DownloadOptions) -> DownloadPlan {
    let dir = options.effective_output_dir();

    let (format, audio_extract) = if options.audio_only {
        (
            AUDIO_FORMAT.to_owned(),
            Some(AudioExtract {
                codec: AUDIO_CODEC.to_owned(),
                quality: AUDIO_QUALITY.to_owned(),
            }),
        )
    } else {
        (options.quality.format_expression().to_owned(), None)
    };

    DownloadPlan {
        url: url.to_owned(),
        format,
        output_template: path_string(&dir.join("%(title)s.%(ext)s")),
        archive_file: path_string(&dir.join(ARCHIVE_FILE_NAME)),
        audio_extract,
    }
}

/// Command line yt-dlp receives for `url`.
///
/// Inspection helper: [`download_one`] hands the [`DownloadPlan`] to the
/// engine, which renders these same arguments with [`DownloadPlan::to_args`].
pub fn build_args(url: &str, options: &DownloadOptions) -> Vec<String> {
    build_plan(url, options).to_args()
}

/// Downloads one item. Failures go to `on_error` and never propagate.
pub async fn download_one(
    engine: &dyn Engine,
    url: &str,
    options: &DownloadOptions,
    on_progress: &mut (dyn FnMut(ProgressEvent) + Send),
    on_error: &mut (dyn FnMut(&Error, &str) + Send),
) {
    let plan = build_plan(url, options);
    info!("Downloading {url} with format {}", plan.format);
    if let Err(e) = engine.download(&plan, on_progress).await {
        on_error(&e, url);
    }
}
