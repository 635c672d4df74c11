//! The extraction engine seam and its yt-dlp implementation.
//!
//! Everything that touches media sites goes through [`Engine`]: listing the
//! items behind a URL and downloading one item. [`YtDlp`] drives the yt-dlp
//! executable as a child process; tests use a scripted engine instead.

use std::{
    collections::VecDeque,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::progress::{PROGRESS_TEMPLATE, ProgressEvent, parse_progress_from_line};

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Optional yt-dlp binary bundled at build time.
#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

/// One entry of a playlist or channel listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FlatEntry {
    pub url: Option<String>,
    pub webpage_url: Option<String>,
}

/// Metadata returned by a list-only query.
///
/// A container (playlist or channel) has `entries`; a single item carries
/// its own `url`/`webpage_url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExtractedInfo {
    pub entries: Option<Vec<Option<FlatEntry>>>,
    pub url: Option<String>,
    pub webpage_url: Option<String>,
}

/// Audio extraction post-processing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtract {
    pub codec: String,
    pub quality: String,
}

/// Everything the engine needs to download one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub url: String,
    pub format: String,
    pub output_template: String,
    pub archive_file: String,
    pub audio_extract: Option<AudioExtract>,
}

impl DownloadPlan {
    /// Command line arguments for yt-dlp, ending with the item URL.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_owned(),
            self.format.clone(),
            "-o".to_owned(),
            self.output_template.clone(),
            "--download-archive".to_owned(),
            self.archive_file.clone(),
            "--ignore-errors".to_owned(),
            "--no-warnings".to_owned(),
            "--newline".to_owned(),
            "--progress-template".to_owned(),
            PROGRESS_TEMPLATE.to_owned(),
        ];

        if let Some(audio) = &self.audio_extract {
            args.push("--extract-audio".to_owned());
            args.push("--audio-format".to_owned());
            args.push(audio.codec.clone());
            args.push("--audio-quality".to_owned());
            args.push(audio.quality.clone());
        }

        // keep the URL from being read as an option
        args.push("--".to_owned());
        args.push(self.url.clone());
        args
    }
}

/// Media extraction engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Lists the items behind `url` without downloading anything.
    ///
    /// `Ok(None)` means the engine resolved nothing.
    async fn extract_flat(&self, url: &str) -> Result<Option<ExtractedInfo>>;

    /// Downloads one item, reporting transfer progress through `on_progress`.
    async fn download(
        &self,
        plan: &DownloadPlan,
        on_progress: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<()>;
}

/// Parses the JSON document printed by `yt-dlp -J`.
pub fn parse_metadata(stdout: &[u8]) -> Result<Option<ExtractedInfo>> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str(text)?)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

pub fn engine_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

/// Reads one line, decoding invalid UTF-8 lossily.
///
/// yt-dlp prints file names in the console encoding, which is not always
/// UTF-8; such a line must not end the read loop.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
}

fn is_complete(path: &Path, expected_len: usize) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.len() == expected_len as u64)
}

/// Resolves the yt-dlp executable.
///
/// A bundled binary is extracted to the temp directory; otherwise the
/// name is returned as is and resolved through `PATH` at spawn time.
pub fn locate_engine() -> Result<PathBuf> {
    let bin = engine_binary_name();
    let Some(data) = Asset::get(bin) else {
        debug!("No bundled {bin}, using PATH");
        return Ok(PathBuf::from(bin));
    };

    let target = std::env::temp_dir().join(bin);
    extract_binary(&data.data, &target)?;
    Ok(target)
}

/// Writes `data` to `target` unless a file of the same size is already there.
///
/// The bytes go to a sibling file first and are renamed into place, so an
/// interrupted write never leaves a truncated executable at `target`.
fn extract_binary(data: &[u8], target: &Path) -> Result<()> {
    if is_complete(target, data.len()) {
        return Ok(());
    }

    let mut partial = target.as_os_str().to_owned();
    partial.push(format!(".{}.part", std::process::id()));
    let partial = PathBuf::from(partial);

    let mut f = File::create(&partial)?;
    f.write_all(data)?;
    f.sync_all()?;
    drop(f);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&partial, std::fs::Permissions::from_mode(0o755))?;
    }
    if let Err(e) = std::fs::rename(&partial, target) {
        let _ = std::fs::remove_file(&partial);
        return Err(e.into());
    }
    info!("Extracted bundled engine to {}", target.display());
    Ok(())
}

/// yt-dlp driven as a child process.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses the bundled binary when present, else the one on `PATH`.
    pub fn locate() -> Result<Self> {
        locate_engine().map(Self::new)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd
    }
}

#[async_trait]
impl Engine for YtDlp {
    async fn extract_flat(&self, url: &str) -> Result<Option<ExtractedInfo>> {
        debug!("Listing {url}");
        let output = self
            .command()
            .args([
                "--flat-playlist",
                "-J",
                "--quiet",
                "--no-warnings",
                "--ignore-errors",
                "--",
                url,
            ])
            .output()
            .await
            .map_err(Error::EngineSpawn)?;

        if !output.status.success() {
            // with --ignore-errors a partial listing is still printed
            if let Ok(Some(info)) = parse_metadata(&output.stdout) {
                warn!(
                    "yt-dlp reported errors while listing {url}, keeping partial result: {}",
                    stderr_tail(&output.stderr)
                );
                return Ok(Some(info));
            }
            return Err(Error::EngineFailed {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        parse_metadata(&output.stdout)
    }

    async fn download(
        &self,
        plan: &DownloadPlan,
        on_progress: &mut (dyn FnMut(ProgressEvent) + Send),
    ) -> Result<()> {
        let args = plan.to_args();
        debug!("Running {} {:?}", self.program.display(), args);

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Error::EngineSpawn)?;

        let out = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("yt-dlp stdout unavailable")))?;
        let err = child
            .stderr
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("yt-dlp stderr unavailable")))?;

        // drain stderr alongside stdout so neither pipe fills up
        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut reader = BufReader::new(err);
            let mut buf = Vec::new();
            while let Ok(Some(line)) = next_lossy_line(&mut reader, &mut buf).await {
                debug!("yt-dlp stderr> {line}");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut reader = BufReader::new(out);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut reader, &mut buf).await? {
            match parse_progress_from_line(&line) {
                Some(event) => on_progress(event),
                None => debug!("yt-dlp> {line}"),
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(Error::EngineFailed {
                code: status.code(),
                stderr,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted engine for tests.

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;
    use crate::progress::TransferStatus;

    /// A call the engine received.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum EngineCall {
        Extract(String),
        Download(DownloadPlan),
    }

    /// Engine answering from canned listings; downloads emit two progress events.
    #[derive(Default)]
    pub struct ScriptedEngine {
        listings: HashMap<String, std::result::Result<Option<ExtractedInfo>, String>>,
        failing: HashSet<String>,
        calls: Mutex<Vec<EngineCall>>,
    }

    impl ScriptedEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_listing(mut self, url: &str, info: Option<ExtractedInfo>) -> Self {
            self.listings.insert(url.to_owned(), Ok(info));
            self
        }

        pub fn with_single(self, url: &str, webpage_url: Option<&str>) -> Self {
            let info = ExtractedInfo {
                webpage_url: webpage_url.map(str::to_owned),
                ..Default::default()
            };
            self.with_listing(url, Some(info))
        }

        /// `None` entries model unresolvable items.
        pub fn with_playlist(self, url: &str, entries: &[Option<&str>]) -> Self {
            let entries = entries
                .iter()
                .map(|e| {
                    e.map(|u| FlatEntry {
                        url: Some(u.to_owned()),
                        webpage_url: None,
                    })
                })
                .collect();
            let info = ExtractedInfo {
                entries: Some(entries),
                ..Default::default()
            };
            self.with_listing(url, Some(info))
        }

        pub fn with_extract_error(mut self, url: &str, message: &str) -> Self {
            self.listings.insert(url.to_owned(), Err(message.to_owned()));
            self
        }

        pub fn failing_download(mut self, url: &str) -> Self {
            self.failing.insert(url.to_owned());
            self
        }

        pub fn calls(&self) -> Vec<EngineCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn downloaded_urls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    EngineCall::Download(plan) => Some(plan.url),
                    EngineCall::Extract(_) => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Engine for ScriptedEngine {
        async fn extract_flat(&self, url: &str) -> Result<Option<ExtractedInfo>> {
            self.calls
                .lock()
                .unwrap()
                .push(EngineCall::Extract(url.to_owned()));
            match self.listings.get(url) {
                Some(Ok(info)) => Ok(info.clone()),
                Some(Err(message)) => Err(Error::EngineFailed {
                    code: Some(1),
                    stderr: message.clone(),
                }),
                None => Err(Error::EngineFailed {
                    code: Some(1),
                    stderr: format!("ERROR: Unsupported URL: {url}"),
                }),
            }
        }

        async fn download(
            &self,
            plan: &DownloadPlan,
            on_progress: &mut (dyn FnMut(ProgressEvent) + Send),
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(EngineCall::Download(plan.clone()));
            on_progress(ProgressEvent {
                status: TransferStatus::Downloading,
                downloaded_bytes: 50,
                total_bytes: Some(100),
            });
            if self.failing.contains(&plan.url) {
                return Err(Error::EngineFailed {
                    code: Some(1),
                    stderr: "ERROR: HTTP Error 403: Forbidden".to_owned(),
                });
            }
            on_progress(ProgressEvent {
                status: TransferStatus::Finished,
                downloaded_bytes: 100,
                total_bytes: Some(100),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(audio: bool) -> DownloadPlan {
        DownloadPlan {
            url: "https://www.youtube.com/watch?v=abc".to_owned(),
            format: "bestaudio/best".to_owned(),
            output_template: "out/%(title)s.%(ext)s".to_owned(),
            archive_file: "out/downloaded.txt".to_owned(),
            audio_extract: audio.then(|| AudioExtract {
                codec: "mp3".to_owned(),
                quality: "192K".to_owned(),
            }),
        }
    }

    #[test]
    fn parses_playlist_metadata() {
        let json = br#"{
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"_type": "url", "url": "https://www.youtube.com/watch?v=a1", "id": "a1"},
                null,
                {"_type": "url", "id": "a2", "webpage_url": "https://www.youtube.com/watch?v=a2"}
            ]
        }"#;
        let info = parse_metadata(json).unwrap().unwrap();
        let entries = info.entries.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[1].is_none());
        assert_eq!(
            entries[2].as_ref().unwrap().webpage_url.as_deref(),
            Some("https://www.youtube.com/watch?v=a2")
        );
    }

    #[test]
    fn parses_single_item_metadata() {
        let json = br#"{
            "id": "abc",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "title": "t"
        }"#;
        let info = parse_metadata(json).unwrap().unwrap();
        assert!(info.entries.is_none());
        assert_eq!(
            info.webpage_url.as_deref(),
            Some("https://www.youtube.com/watch?v=abc")
        );
    }

    #[test]
    fn empty_or_null_output_is_none() {
        assert!(parse_metadata(b"").unwrap().is_none());
        assert!(parse_metadata(b"null\n").unwrap().is_none());
    }

    #[test]
    fn garbage_output_is_an_error() {
        let err = parse_metadata(b"ERROR: not json").unwrap_err();
        assert!(matches!(err, Error::InvalidMetadata(_)));
    }

    #[test]
    fn video_plan_args() {
        let mut p = plan(false);
        p.format = "best[height<=?360]".to_owned();
        let args = p.to_args();
        assert_eq!(&args[..2], &["-f", "best[height<=?360]"]);
        assert!(args.contains(&"--ignore-errors".to_owned()));
        assert!(args.contains(&PROGRESS_TEMPLATE.to_owned()));
        assert!(!args.contains(&"--extract-audio".to_owned()));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn audio_plan_args() {
        let args = plan(true).to_args();
        let pos = args.iter().position(|a| a == "--extract-audio").unwrap();
        assert_eq!(
            &args[pos..pos + 5],
            &["--extract-audio", "--audio-format", "mp3", "--audio-quality", "192K"]
        );
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(text.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }
}
