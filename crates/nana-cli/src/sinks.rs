//! Console and filesystem collaborators for the orchestrator

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nana_ai::billing::{BalanceClient, BalanceInfo, format_balance};
use nana_pipeline::{BalanceSource, GeneratedImage, ImageSink, Notifier, Severity};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes every generated image into a directory
pub struct FileImageSink {
    dir: PathBuf,
    written: Mutex<Vec<PathBuf>>,
}

impl FileImageSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().clone()
    }

    fn write(&self, image: &GeneratedImage) -> anyhow::Result<PathBuf> {
        let bytes = STANDARD.decode(image.data.trim())?;
        fs::create_dir_all(&self.dir)?;

        let mut written = self.written.lock();
        let name = format!(
            "{}-{:03}.{}",
            image.timestamp,
            written.len() + 1,
            extension_for(&image.mime_type)
        );
        let path = self.dir.join(name);
        fs::write(&path, bytes)?;
        written.push(path.clone());
        Ok(path)
    }
}

impl ImageSink for FileImageSink {
    fn record(&self, image: GeneratedImage) {
        match self.write(&image) {
            Ok(path) => {
                tracing::debug!(model = %image.model, prompt = %image.prompt, "image saved");
                println!("Saved {}", path.display());
            }
            Err(e) => eprintln!("Warning: failed to save image: {}", e),
        }
    }
}

/// File extension for an image MIME type
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "png",
    }
}

/// MIME type for an input image path, by extension
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        _ => "image/png",
    }
}

/// Prints notifications to stderr
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        let marker = match severity {
            Severity::Info => "·",
            Severity::Success => "✓",
            Severity::Error => "✗",
        };
        eprintln!("{} {}", marker, message);
    }
}

/// Keeps the most recent balance reading
pub struct BalanceTracker {
    client: BalanceClient,
    latest: Mutex<Option<BalanceInfo>>,
}

impl BalanceTracker {
    pub fn new(client: BalanceClient) -> Self {
        Self {
            client,
            latest: Mutex::new(None),
        }
    }

    pub fn latest(&self) -> Option<BalanceInfo> {
        *self.latest.lock()
    }
}

#[async_trait]
impl BalanceSource for BalanceTracker {
    async fn refresh(&self) -> nana_ai::Result<()> {
        let info = self.client.fetch().await?;
        *self.latest.lock() = Some(info);
        Ok(())
    }
}

/// One-line balance description
pub fn describe_balance(info: &BalanceInfo) -> String {
    if info.is_unlimited {
        return "Balance: unlimited".to_string();
    }
    format!(
        "Balance: {} remaining ({} used of {})",
        format_balance(info.remaining, false),
        format_balance(info.usage, false),
        format_balance(info.hard_limit_usd, false)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_and_extension() {
        assert_eq!(mime_for_path(Path::new("a/photo.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("noext")), "image/png");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("image/unknown"), "png");
    }

    #[test]
    fn test_file_sink_writes_decoded_bytes() {
        let dir = std::env::temp_dir().join(format!("nana-sink-{}", uuid::Uuid::new_v4()));
        let sink = FileImageSink::new(&dir);
        sink.record(GeneratedImage {
            mime_type: "image/jpeg".into(),
            data: STANDARD.encode(b"jpeg bytes"),
            prompt: "cat".into(),
            model: "m".into(),
            timestamp: 1700000000000,
        });
        sink.record(GeneratedImage {
            mime_type: "image/png".into(),
            data: "%%% not base64".into(),
            prompt: "dog".into(),
            model: "m".into(),
            timestamp: 1700000000001,
        });

        let written = sink.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(fs::read(&written[0]).unwrap(), b"jpeg bytes");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_describe_balance() {
        let info = BalanceInfo::from_raw(50.0, 1250.0);
        assert_eq!(describe_balance(&info), "Balance: 37.5 remaining (12.5 used of 50.0)");
        let unlimited = BalanceInfo::from_raw(1e9, 0.0);
        assert_eq!(describe_balance(&unlimited), "Balance: unlimited");
    }
}
