//! Model file resolution and ONNX Runtime session construction.

use anyhow::{anyhow, bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use crate::config::{Config, ModelFiles};
use crate::device::Device;

/// On-disk locations of one model, after download and verification.
#[derive(Debug, Clone)]
pub struct ResolvedFiles {
    pub onnx: PathBuf,
    pub tokenizer: PathBuf,
}

/// Make sure every file of a model is present locally.
pub fn resolve_files(config: &Config, files: &ModelFiles) -> Result<ResolvedFiles> {
    let onnx = ensure_file(
        &config.model_path(&files.onnx),
        files.onnx_url.as_deref(),
        files.onnx_sha256.as_deref(),
        config.auto_download,
    )?;
    let tokenizer = ensure_file(
        &config.model_path(&files.tokenizer),
        files.tokenizer_url.as_deref(),
        None,
        config.auto_download,
    )?;

    Ok(ResolvedFiles { onnx, tokenizer })
}

/// Download a file if it doesn't exist, then check it against `sha256`.
///
/// A download only reaches `path` once it has been fully written and has
/// passed the checksum.
fn ensure_file(
    path: &Path,
    url: Option<&str>,
    sha256: Option<&str>,
    auto_download: bool,
) -> Result<PathBuf> {
    if path.exists() {
        if let Some(expected) = sha256 {
            verify_sha256(path, expected)?;
        }
        return Ok(path.to_path_buf());
    }

    let url = match url {
        Some(url) if auto_download => url,
        Some(_) => bail!("{:?} is missing and auto_download is disabled", path),
        None => bail!("{:?} is missing and no download URL is configured", path),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let partial = path.with_extension("part");
    if let Err(e) = download(url, &partial, sha256) {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }
    std::fs::rename(&partial, path)?;
    tracing::info!(file = ?path, "Model file downloaded");

    Ok(path.to_path_buf())
}

fn download(url: &str, dest: &Path, sha256: Option<&str>) -> Result<()> {
    tracing::info!(file = ?dest, %url, "Downloading model file...");
    let response = ureq::get(url)
        .call()
        .map_err(|e| anyhow!("Failed to download {}: {}", url, e))?;

    let mut file = File::create(dest)?;
    std::io::copy(&mut response.into_reader(), &mut file)?;
    file.sync_all()?;
    drop(file);

    if let Some(expected) = sha256 {
        verify_sha256(dest, expected)?;
    }
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        bail!(
            "checksum mismatch for {:?}: expected {}, got {}",
            path,
            expected,
            actual
        );
    }
    Ok(())
}

/// Build an inference session on the given device.
pub fn build_session(path: &Path, device: Device, intra_threads: usize) -> Result<Session> {
    let session = guard_runtime(|| {
        Session::builder()?
            .with_execution_providers(device.execution_providers())?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load ONNX model {:?}", path))
    })?;

    tracing::debug!(model = ?path, %device, "Session ready");
    Ok(session)
}

/// Run code that touches ONNX Runtime.
///
/// With `load-dynamic`, ort panics when the shared library cannot be loaded;
/// that panic is returned here as an error.
pub(crate) fn guard_runtime<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(anyhow!("ONNX Runtime is unavailable: {}", message))
    })
}

pub fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path).map_err(|e| anyhow!("Failed to load tokenizer {:?}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use tempfile::tempdir;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    /// Serve `body` over HTTP for `requests` connections, returning the URL.
    fn serve(body: &'static [u8], requests: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming().take(requests) {
                let mut stream = stream.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                stream.write_all(header.as_bytes()).unwrap();
                stream.write_all(body).unwrap();
            }
        });
        format!("http://{}/model.onnx", addr)
    }

    fn files() -> ModelFiles {
        ModelFiles {
            onnx: PathBuf::from("model.onnx"),
            tokenizer: PathBuf::from("tokenizer.json"),
            onnx_url: None,
            tokenizer_url: None,
            onnx_sha256: None,
        }
    }

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.models_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_missing_file_without_url_fails() {
        let dir = tempdir().unwrap();
        let err = resolve_files(&config_in(dir.path()), &files()).unwrap_err();
        assert!(err.to_string().contains("no download URL"));
    }

    #[test]
    fn test_missing_file_with_download_disabled_fails() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.auto_download = false;

        let mut files = files();
        files.onnx_url = Some("http://127.0.0.1:9/model.onnx".to_string());

        let err = resolve_files(&config, &files).unwrap_err();
        assert!(err.to_string().contains("auto_download is disabled"));
    }

    #[test]
    fn test_existing_files_resolve() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"weights").unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let resolved = resolve_files(&config_in(dir.path()), &files()).unwrap();
        assert_eq!(resolved.onnx, dir.path().join("model.onnx"));
        assert_eq!(resolved.tokenizer, dir.path().join("tokenizer.json"));
    }

    #[test]
    fn test_checksum_verification() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"abc").unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let mut files = files();
        files.onnx_sha256 =
            Some("BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD".to_string());
        assert!(resolve_files(&config_in(dir.path()), &files).is_ok());

        files.onnx_sha256 = Some("00".repeat(32));
        let err = resolve_files(&config_in(dir.path()), &files).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_download_with_matching_checksum() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let mut files = files();
        files.onnx_url = Some(serve(b"abc", 1));
        files.onnx_sha256 = Some(ABC_SHA256.to_string());

        let resolved = resolve_files(&config_in(dir.path()), &files).unwrap();
        assert_eq!(std::fs::read(&resolved.onnx).unwrap(), b"abc");
        assert!(!dir.path().join("model.part").exists());
    }

    #[test]
    fn test_corrupt_download_is_discarded() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let mut files = files();
        files.onnx_url = Some(serve(b"garbage", 2));
        files.onnx_sha256 = Some(ABC_SHA256.to_string());
        let config = config_in(dir.path());

        for _ in 0..2 {
            let err = resolve_files(&config, &files).unwrap_err();
            assert!(err.to_string().contains("checksum mismatch"));
            assert!(!dir.path().join("model.onnx").exists());
            assert!(!dir.path().join("model.part").exists());
        }
    }

    #[test]
    fn test_failed_download_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let mut files = files();
        files.onnx_url = Some("http://127.0.0.1:9/model.onnx".to_string());

        assert!(resolve_files(&config_in(dir.path()), &files).is_err());
        assert!(!dir.path().join("model.onnx").exists());
        assert!(!dir.path().join("model.part").exists());
    }

    #[test]
    fn test_runtime_panic_becomes_error() {
        let err = guard_runtime::<()>(|| panic!("libonnxruntime.so not found")).unwrap_err();
        assert!(err.to_string().contains("libonnxruntime.so not found"));

        assert_eq!(guard_runtime(|| Ok(7)).unwrap(), 7);
    }
}
