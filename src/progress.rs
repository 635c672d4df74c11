//! Progress lines emitted by yt-dlp and the progress state shown in the UI.

/// Marker that starts every line produced by [`PROGRESS_TEMPLATE`].
const PROGRESS_PREFIX: &str = "progress:";

/// Value passed to `--progress-template`.
///
/// Produces lines such as `progress:downloading:1024:4096:NA`; yt-dlp prints
/// `NA` for fields it does not know.
pub const PROGRESS_TEMPLATE: &str = "download:progress:%(progress.status)s:%(progress.downloaded_bytes)s:%(progress.total_bytes)s:%(progress.total_bytes_estimate)s";

/// Transfer status reported by the engine's progress hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Downloading,
    Finished,
}

/// One progress hook invocation for the file currently downloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status: TransferStatus,
    pub downloaded_bytes: u64,
    /// Exact size when known, otherwise the engine's estimate.
    pub total_bytes: Option<u64>,
}

fn parse_bytes(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" {
        return None;
    }
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}

/// Parses one stdout line; returns `None` for anything that is not a progress line.
pub fn parse_progress_from_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split(':');

    let status = match fields.next()? {
        "downloading" => TransferStatus::Downloading,
        "finished" => TransferStatus::Finished,
        _ => return None,
    };
    let downloaded_bytes = fields.next().and_then(parse_bytes).unwrap_or(0);
    let total = fields.next().and_then(parse_bytes);
    let estimate = fields.next().and_then(parse_bytes);

    Some(ProgressEvent {
        status,
        downloaded_bytes,
        total_bytes: total.or(estimate).filter(|t| *t > 0),
    })
}

/// Overall and per-file progress of a batch run.
///
/// Owned by the worker; the UI only renders snapshots of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub items_done: usize,
    pub items_total: usize,
    pub file_downloaded: u64,
    pub file_total: Option<u64>,
    pub file_finished: bool,
}

impl ProgressState {
    pub fn start_items(&mut self, total: usize) {
        self.items_total = total;
        self.items_done = 0;
        self.reset_file();
    }

    pub fn reset_file(&mut self) {
        self.file_downloaded = 0;
        self.file_total = None;
        self.file_finished = false;
    }

    /// Applies a hook event. Downloading events without a known size leave
    /// the file bar where it was.
    ///
    /// An item may be several streams (video then audio), so a sized
    /// downloading event after `Finished` starts the bar over.
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event.status {
            TransferStatus::Downloading => {
                if let Some(total) = event.total_bytes {
                    self.file_downloaded = event.downloaded_bytes;
                    self.file_total = Some(total);
                    self.file_finished = false;
                }
            }
            TransferStatus::Finished => self.file_finished = true,
        }
    }

    pub fn overall_fraction(&self) -> f32 {
        if self.items_total == 0 {
            return 0.0;
        }
        (self.items_done as f32 / self.items_total as f32).clamp(0.0, 1.0)
    }

    pub fn file_fraction(&self) -> f32 {
        if self.file_finished {
            return 1.0;
        }
        match self.file_total {
            Some(total) if total > 0 => {
                (self.file_downloaded as f64 / total as f64).clamp(0.0, 1.0) as f32
            }
            _ => 0.0,
        }
    }
}
