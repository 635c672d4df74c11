//! Expansion of a source URL (video, playlist or channel) into item URLs.

use tracing::{info, warn};

use crate::engine::{Engine, ExtractedInfo};
use crate::model::{Notice, RunEvent};

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Rewrites a bare video id into a watch URL; absolute URLs pass through.
pub fn normalize_item_url(raw: &str) -> String {
    if raw.starts_with("http") {
        raw.to_owned()
    } else {
        format!("{WATCH_URL_PREFIX}{raw}")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Item URLs described by one metadata result, in engine order.
pub fn item_urls(info: &ExtractedInfo, source: &str) -> Vec<String> {
    match &info.entries {
        Some(entries) => entries
            .iter()
            .flatten()
            .filter_map(|entry| {
                non_empty(entry.url.as_deref()).or(non_empty(entry.webpage_url.as_deref()))
            })
            .map(normalize_item_url)
            .collect(),
        None => {
            let url = non_empty(info.webpage_url.as_deref())
                .or(non_empty(info.url.as_deref()))
                .unwrap_or(source);
            vec![normalize_item_url(url)]
        }
    }
}

/// Lists the items behind `url`.
///
/// Failures are reported through `emit` as an error notice and yield an
/// empty list, so one bad source never stops the others.
pub async fn expand(
    engine: &dyn Engine,
    url: &str,
    emit: &mut (dyn FnMut(RunEvent) + Send),
) -> Vec<String> {
    emit(RunEvent::Status(format!("Analysing {url}...")));

    let items = match engine.extract_flat(url).await {
        Ok(Some(info)) => item_urls(&info, url),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!("Could not expand {url}: {e}");
            emit(RunEvent::Notice(Notice::error(format!(
                "Unable to analyse the URL.\n{e}"
            ))));
            return Vec::new();
        }
    };

    info!("{} item(s) found for {url}", items.len());
    emit(RunEvent::Status(format!("{} item(s) detected.", items.len())));
    items
}
