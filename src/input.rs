//! Input resolution: turn user-supplied paths and URLs into queueable files.
//!
//! Each argument may be
//!
//! * a local file: queued by path and read when it is processed,
//! * a directory: its accepted-extension files, non-recursively, by name,
//! * an HTTP(S) URL: downloaded up front and queued from memory.
//!
//! Missing or unreadable local paths are fatal; the user most likely
//! mistyped them. A URL that fails to download is logged and skipped so
//! one dead link does not sink a whole batch.

use crate::batch::InputFile;
use crate::config::OrchestratorConfig;
use crate::error::OptimizeError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve every argument, in order.
pub async fn resolve_inputs(
    inputs: &[String],
    config: &OrchestratorConfig,
) -> Result<Vec<InputFile>, OptimizeError> {
    let mut files = Vec::new();
    for input in inputs {
        if is_url(input) {
            match download_url(input, config.download_timeout_secs).await {
                Ok(file) => files.push(file),
                Err(e) => warn!("Skipping {}: {}", input, e),
            }
        } else {
            files.extend(resolve_local(input, config)?);
        }
    }
    Ok(files)
}

fn resolve_local(input: &str, config: &OrchestratorConfig) -> Result<Vec<InputFile>, OptimizeError> {
    if input.trim().is_empty() {
        return Err(OptimizeError::InvalidInput {
            input: input.to_string(),
        });
    }
    let path = PathBuf::from(input);
    let meta = std::fs::metadata(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OptimizeError::PermissionDenied { path: path.clone() },
        _ => OptimizeError::FileNotFound { path: path.clone() },
    })?;

    if meta.is_dir() {
        return scan_dir(&path, config);
    }

    // Check read permission by attempting to open
    if let Err(e) = std::fs::File::open(&path) {
        return Err(if e.kind() == std::io::ErrorKind::PermissionDenied {
            OptimizeError::PermissionDenied { path }
        } else {
            OptimizeError::FileNotFound { path }
        });
    }
    debug!("Resolved local file: {}", path.display());
    Ok(vec![InputFile::from_path(path)])
}

fn scan_dir(dir: &Path, config: &OrchestratorConfig) -> Result<Vec<InputFile>, OptimizeError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OptimizeError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => OptimizeError::FileNotFound {
            path: dir.to_path_buf(),
        },
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| config.accepts(n))
        })
        .collect();
    paths.sort();

    info!("Found {} file(s) in {}", paths.len(), dir.display());
    Ok(paths.into_iter().map(InputFile::from_path).collect())
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<InputFile, OptimizeError> {
    info!("Downloading model from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OptimizeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OptimizeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OptimizeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(OptimizeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| OptimizeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let name = filename_from_url(url);
    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(InputFile::from_bytes(name, bytes.to_vec()))
}

/// The URL's last path segment if it has an extension, else a fixed name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.glb".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FileSource;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/chair.glb"));
        assert!(is_url("http://example.com/chair.glb"));
        assert!(!is_url("/tmp/chair.glb"));
        assert!(!is_url("chair.glb"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://cdn.example.com/models/chair.glb?v=3"),
            "chair.glb"
        );
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.glb");
        assert_eq!(filename_from_url("https://example.com/api/model"), "downloaded.glb");
    }

    #[tokio::test]
    async fn directory_is_scanned_for_accepted_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.glb"), b"x").unwrap();
        std::fs::write(dir.path().join("A.GLB"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested.glb")).unwrap();

        let files = resolve_inputs(
            &[dir.path().display().to_string()],
            &OrchestratorConfig::default(),
        )
        .await
        .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["A.GLB", "b.glb"]);
        assert!(matches!(files[0].source, FileSource::Path(_)));
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let err = resolve_inputs(
            &["/no/such/model.glb".to_string()],
            &OrchestratorConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OptimizeError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = resolve_inputs(&[" ".to_string()], &OrchestratorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn files_keep_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let z = dir.path().join("z.glb");
        let a = dir.path().join("a.glb");
        std::fs::write(&z, b"z").unwrap();
        std::fs::write(&a, b"a").unwrap();

        let files = resolve_inputs(
            &[z.display().to_string(), a.display().to_string()],
            &OrchestratorConfig::default(),
        )
        .await
        .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["z.glb", "a.glb"]);
    }
}
