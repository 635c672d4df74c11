//! Quality labels shown in the UI and the yt-dlp format expressions they select.

/// Expression used for "Auto" and for any label we do not know.
pub const BEST_FORMAT: &str = "bestvideo+bestaudio/best";

/// Video quality choices, in dropdown order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// Best available video and audio
    #[default]
    Auto,
    P2160,
    P1440,
    P1080,
    P720,
    P480,
    P360,
}

impl Quality {
    /// Every choice, as listed in the quality combo box.
    pub const ALL: [Quality; 7] = [
        Quality::Auto,
        Quality::P2160,
        Quality::P1440,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Quality::Auto => "Auto (best)",
            Quality::P2160 => "2160p (4K)",
            Quality::P1440 => "1440p (2K)",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
        }
    }

    pub fn from_label(label: &str) -> Option<Quality> {
        Quality::ALL.into_iter().find(|q| q.label() == label)
    }

    /// Format selection passed to `yt-dlp -f`.
    ///
    /// Height caps use `<=?` so formats with an unknown height still qualify,
    /// and each cap falls back to the best single file under the same height.
    pub fn format_expression(self) -> &'static str {
        match self {
            Quality::Auto => BEST_FORMAT,
            Quality::P2160 => "bestvideo[height<=?2160]+bestaudio/best[height<=?2160]",
            Quality::P1440 => "bestvideo[height<=?1440]+bestaudio/best[height<=?1440]",
            Quality::P1080 => "bestvideo[height<=?1080]+bestaudio/best[height<=?1080]",
            Quality::P720 => "bestvideo[height<=?720]+bestaudio/best[height<=?720]",
            Quality::P480 => "bestvideo[height<=?480]+bestaudio/best[height<=?480]",
            Quality::P360 => "best[height<=?360]",
        }
    }
}

/// Maps a display label to its format expression; unknown labels get the best quality.
///
/// For callers that hold label text rather than a [`Quality`]. The UI keeps
/// the enum and goes through [`Quality::format_expression`] directly.
pub fn format_for_label(label: &str) -> &'static str {
    Quality::from_label(label).map_or(BEST_FORMAT, Quality::format_expression)
}
