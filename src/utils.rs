use crate::error::Result;
use crate::log_debug;
use chrono::{DateTime, Local};
use rand::Rng;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn ensure_directory(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    if !dir.as_os_str().is_empty() && !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn save_json(data: &impl serde::Serialize, path: impl AsRef<Path>) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        ensure_directory(parent)?;
    }

    let json_string = serde_json::to_string_pretty(data)?;
    let mut file = File::create(path)?;
    file.write_all(json_string.as_bytes())?;
    Ok(())
}

/// `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn timestamped_path(dir: impl AsRef<Path>, prefix: &str, ext: &str, at: DateTime<Local>) -> PathBuf {
    dir.as_ref()
        .join(format!("{}_{}.{}", prefix, at.format("%Y%m%d_%H%M%S"), ext))
}

/// Turns a free-form title into something safe to use in a file name.
pub fn file_slug(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Title-cases the last path segment of a URL: `/games/tiny-worlds?x=1` -> `Tiny Worlds`.
pub fn title_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let slug = path.trim_end_matches('/').rsplit('/').next()?;
    if slug.is_empty() {
        return None;
    }
    let title = slug
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

/// Sleeps for a random duration within `[min_ms, max_ms]`.
pub async fn random_delay(min_ms: u64, max_ms: u64) {
    if max_ms == 0 {
        return;
    }
    let ms = if min_ms >= max_ms {
        min_ms
    } else {
        rand::rng().random_range(min_ms..=max_ms)
    };
    log_debug!("[utils] Sleeping {} ms", ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builds_timestamped_paths() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let path = timestamped_path("out", "emergency_bundles", "json", at);
        assert_eq!(path, PathBuf::from("out/emergency_bundles_20240309_070501.json"));
    }

    #[test]
    fn title_cases_url_slugs() {
        assert_eq!(
            title_from_url("https://example.com/games/tiny-worlds_bundle?ref=x").as_deref(),
            Some("Tiny Worlds Bundle")
        );
        assert_eq!(title_from_url("https://example.com/").as_deref(), Some("Example.com"));
        assert_eq!(title_from_url("").as_deref(), None);
    }

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(file_slug(" Rust / Ownership "), "Rust___Ownership");
    }

    #[test]
    fn save_json_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/data.json");
        save_json(&vec![1, 2, 3], &path).unwrap();
        let back: Vec<i32> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
