//! Embedding model and runtime fetcher.
//!
//! Downloads ONNX Runtime and the MiniLM artifacts into the platform data
//! directory on demand, so the binary ships without them.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::info;

/// Errors fetching model artifacts.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive extraction error: {0}")]
    Archive(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}

/// ONNX Runtime version to download.
const ONNX_RUNTIME_VERSION: &str = "1.23.2";

/// ONNX Runtime download URL for Windows x64.
#[cfg(all(target_os = "windows", target_arch = "x86_64"))]
const ONNX_RUNTIME_URL: &str = "https://github.com/microsoft/onnxruntime/releases/download/v1.23.2/onnxruntime-win-x64-1.23.2.zip";

/// ONNX Runtime download URL for Linux x64.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
const ONNX_RUNTIME_URL: &str = "https://github.com/microsoft/onnxruntime/releases/download/v1.23.2/onnxruntime-linux-x64-1.23.2.tgz";

/// ONNX Runtime download URL for macOS x64.
#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
const ONNX_RUNTIME_URL: &str = "https://github.com/microsoft/onnxruntime/releases/download/v1.23.2/onnxruntime-osx-x86_64-1.23.2.tgz";

/// ONNX Runtime download URL for macOS ARM64.
#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
const ONNX_RUNTIME_URL: &str = "https://github.com/microsoft/onnxruntime/releases/download/v1.23.2/onnxruntime-osx-arm64-1.23.2.tgz";

/// Fallback for unsupported platforms.
#[cfg(not(any(
    all(target_os = "windows", target_arch = "x86_64"),
    all(target_os = "linux", target_arch = "x86_64"),
    all(target_os = "macos", target_arch = "x86_64"),
    all(target_os = "macos", target_arch = "aarch64"),
)))]
const ONNX_RUNTIME_URL: &str = "";

/// Sentence embedding model (sentence-transformers/all-MiniLM-L6-v2, ONNX export).
const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";

/// Tokenizer definition matching the embedding model.
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Fetcher for ONNX Runtime and the embedding model artifacts.
pub struct ModelFetcher {
    /// Directory to store downloaded files.
    data_dir: PathBuf,
    /// Directory for model artifacts.
    models_dir: PathBuf,
    /// Directory for runtime libraries.
    lib_dir: PathBuf,
}

impl ModelFetcher {
    /// Creates a fetcher rooted at the platform data directory.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "palisade", "Palisade")?;
        Some(Self::with_root(project_dirs.data_dir().to_path_buf()))
    }

    /// Creates a fetcher rooted at an explicit data directory.
    pub fn with_root(data_dir: PathBuf) -> Self {
        let models_dir = data_dir.join("models");
        let lib_dir = data_dir.join("lib");
        Self {
            data_dir,
            models_dir,
            lib_dir,
        }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the models directory path.
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Returns the lib directory path.
    pub fn lib_dir(&self) -> &Path {
        &self.lib_dir
    }

    /// Returns the path to the ONNX Runtime library.
    #[cfg(target_os = "windows")]
    pub fn runtime_path(&self) -> PathBuf {
        self.lib_dir.join("onnxruntime.dll")
    }

    #[cfg(target_os = "linux")]
    pub fn runtime_path(&self) -> PathBuf {
        self.lib_dir.join("libonnxruntime.so")
    }

    #[cfg(target_os = "macos")]
    pub fn runtime_path(&self) -> PathBuf {
        self.lib_dir.join("libonnxruntime.dylib")
    }

    /// Returns the path to the embedding model.
    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join("all-minilm-l6-v2.onnx")
    }

    /// Returns the path to the tokenizer definition.
    pub fn tokenizer_path(&self) -> PathBuf {
        self.models_dir.join("tokenizer.json")
    }

    /// Checks if ONNX Runtime is installed.
    pub fn is_runtime_installed(&self) -> bool {
        self.runtime_path().exists()
    }

    /// Checks if the embedding model is installed.
    pub fn is_model_installed(&self) -> bool {
        self.model_path().exists()
    }

    /// Checks if the tokenizer is installed.
    pub fn is_tokenizer_installed(&self) -> bool {
        self.tokenizer_path().exists()
    }

    /// Checks if everything the embedder needs is installed.
    pub fn is_ready(&self) -> bool {
        self.is_runtime_installed() && self.is_model_installed() && self.is_tokenizer_installed()
    }

    /// Downloads ONNX Runtime if not already installed.
    pub async fn ensure_runtime(&self) -> Result<PathBuf, FetchError> {
        if self.is_runtime_installed() {
            return Ok(self.runtime_path());
        }
        self.download_runtime().await
    }

    /// Downloads the embedding model if not already installed.
    pub async fn ensure_model(&self) -> Result<PathBuf, FetchError> {
        if self.is_model_installed() {
            return Ok(self.model_path());
        }
        self.download_file(MODEL_URL, &self.model_path(), "embedding model")
            .await
    }

    /// Downloads the tokenizer if not already installed.
    pub async fn ensure_tokenizer(&self) -> Result<PathBuf, FetchError> {
        if self.is_tokenizer_installed() {
            return Ok(self.tokenizer_path());
        }
        self.download_file(TOKENIZER_URL, &self.tokenizer_path(), "tokenizer")
            .await
    }

    /// Ensures runtime, model, and tokenizer are all installed.
    pub async fn ensure_all(&self) -> Result<(), FetchError> {
        self.ensure_runtime().await?;
        self.ensure_model().await?;
        self.ensure_tokenizer().await?;
        Ok(())
    }

    /// Downloads and extracts ONNX Runtime.
    async fn download_runtime(&self) -> Result<PathBuf, FetchError> {
        if ONNX_RUNTIME_URL.is_empty() {
            return Err(FetchError::Unsupported(
                "ONNX Runtime not available for this platform".to_string(),
            ));
        }

        fs::create_dir_all(&self.lib_dir)?;

        info!(version = ONNX_RUNTIME_VERSION, "Downloading ONNX Runtime");
        let bytes = fetch_bytes(ONNX_RUNTIME_URL).await?;

        info!(bytes = bytes.len(), "Extracting ONNX Runtime");

        #[cfg(target_os = "windows")]
        {
            self.extract_zip(&bytes, "onnxruntime.dll")?;
        }

        #[cfg(not(target_os = "windows"))]
        {
            self.extract_tgz(&bytes)?;
        }

        info!(path = ?self.runtime_path(), "ONNX Runtime installed");
        Ok(self.runtime_path())
    }

    /// Downloads a single artifact to `dest`.
    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        what: &str,
    ) -> Result<PathBuf, FetchError> {
        fs::create_dir_all(&self.models_dir)?;

        info!(url, "Downloading {}", what);
        let bytes = fetch_bytes(url).await?;

        let mut file = File::create(dest)?;
        file.write_all(&bytes)?;

        info!(bytes = bytes.len(), path = ?dest, "Installed {}", what);
        Ok(dest.to_path_buf())
    }

    /// Extracts a DLL from a ZIP archive (Windows).
    #[cfg(target_os = "windows")]
    fn extract_zip(&self, data: &[u8], dll_name: &str) -> Result<(), FetchError> {
        use std::io::{Cursor, Read};
        use zip::ZipArchive;

        let cursor = Cursor::new(data);
        let mut archive = ZipArchive::new(cursor).map_err(|e| FetchError::Archive(e.to_string()))?;

        // Find and extract the DLL
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| FetchError::Archive(e.to_string()))?;
            let name = file.name().to_string();

            if name.ends_with(dll_name) {
                let dest_path = self.lib_dir.join(dll_name);
                let mut dest_file = File::create(&dest_path)?;
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer)?;
                dest_file.write_all(&buffer)?;
                return Ok(());
            }
        }

        Err(FetchError::Archive(format!(
            "{} not found in archive",
            dll_name
        )))
    }

    /// Extracts the shared library from a tar.gz archive (Linux/macOS).
    #[cfg(not(target_os = "windows"))]
    fn extract_tgz(&self, data: &[u8]) -> Result<(), FetchError> {
        use flate2::read::GzDecoder;
        use std::io::Cursor;
        use tar::Archive;

        let cursor = Cursor::new(data);
        let decoder = GzDecoder::new(cursor);
        let mut archive = Archive::new(decoder);

        #[cfg(target_os = "linux")]
        let lib_name = "libonnxruntime.so";
        #[cfg(target_os = "macos")]
        let lib_name = "libonnxruntime.dylib";

        for entry in archive
            .entries()
            .map_err(|e| FetchError::Archive(e.to_string()))?
        {
            let mut entry = entry.map_err(|e| FetchError::Archive(e.to_string()))?;
            let path = entry
                .path()
                .map_err(|e| FetchError::Archive(e.to_string()))?;

            if path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with(lib_name))
                .unwrap_or(false)
            {
                let dest_path = self.lib_dir.join(lib_name);
                let mut dest_file = File::create(&dest_path)?;
                std::io::copy(&mut entry, &mut dest_file)?;
                return Ok(());
            }
        }

        Err(FetchError::Archive(format!(
            "{} not found in archive",
            lib_name
        )))
    }

    /// Gets the environment variable name for the ONNX Runtime library path.
    pub fn runtime_env_var() -> &'static str {
        "ORT_DYLIB_PATH"
    }

    /// Points the ONNX loader at the installed runtime library.
    pub fn setup_environment(&self) -> bool {
        if self.is_runtime_installed() {
            let lib_path = self.runtime_path();
            std::env::set_var(Self::runtime_env_var(), &lib_path);
            info!("Set {} to {:?}", Self::runtime_env_var(), lib_path);
            true
        } else {
            false
        }
    }
}

/// Fetches a URL into memory, failing on any non-success status.
async fn fetch_bytes(url: &str) -> Result<Vec<u8>, FetchError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(FetchError::Network(format!(
            "HTTP error: {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    Ok(bytes.to_vec())
}
