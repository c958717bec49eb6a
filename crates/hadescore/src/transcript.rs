//! 逐字稿記錄模組
//!
//! 把每個資料塊與其分類結果以 JSON Lines 附加到檔案，
//! 供離線重播與分類器回歸測試使用。

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::ansi::strip_ansi;
use crate::message::HadesMessage;

/// 逐字稿記錄錯誤
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("IO 錯誤: {0}")]
    Io(#[from] io::Error),

    #[error("逐字稿未開啟")]
    NotOpen,
}

/// 逐字稿記錄器
///
/// 每筆記錄一行 JSON：時間戳、原始資料、清理後文字與分類結果。
pub struct TranscriptLogger {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    recording: bool,
}

impl TranscriptLogger {
    /// 建立未開啟的記錄器
    pub fn new() -> Self {
        Self {
            path: None,
            writer: None,
            recording: false,
        }
    }

    /// 是否正在記錄
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// 目前的逐字稿檔案路徑
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 開始附加到指定檔案（必要時建立父目錄）
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<(), TranscriptError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        self.writer = Some(BufWriter::new(file));
        self.path = Some(path.to_path_buf());
        self.recording = true;
        Ok(())
    }

    /// 停止記錄並刷新緩衝
    pub fn stop(&mut self) -> Result<(), TranscriptError> {
        if !self.recording {
            return Ok(());
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }

        self.writer = None;
        self.recording = false;
        Ok(())
    }

    /// 附加一筆記錄
    pub fn log(&mut self, raw: &str, result: &HadesMessage) -> Result<(), TranscriptError> {
        let writer = self.writer.as_mut().ok_or(TranscriptError::NotOpen)?;

        let entry = serde_json::json!({
            "timestamp": unix_timestamp(),
            "raw": raw,
            "clean": strip_ansi(raw).trim(),
            "result": result,
        });
        writeln!(writer, "{}", entry)?;
        Ok(())
    }
}

impl Default for TranscriptLogger {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::HadesMessage;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hadescore_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_log_without_start_fails() {
        let mut logger = TranscriptLogger::new();
        let result = logger.log("raw", &HadesMessage::default());
        assert!(matches!(result, Err(TranscriptError::NotOpen)));
    }

    #[test]
    fn test_log_entry_shape() {
        let path = temp_path("entry_shape.jsonl");
        let _ = fs::remove_file(&path);

        let mut logger = TranscriptLogger::new();
        logger.start(&path).unwrap();
        assert!(logger.is_recording());

        let msg = HadesMessage {
            user: "Bob".to_string(),
            action: "says".to_string(),
            text: "hi".to_string(),
            ..Default::default()
        };
        logger.log("\x1b[32mBob\x1b[0m says: hi\r\n", &msg).unwrap();
        logger.stop().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let entry: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(entry["clean"], "Bob says: hi");
        assert_eq!(entry["result"]["user"], "Bob");
        assert_eq!(entry["result"]["action"], "says");
        assert!(entry["timestamp"].is_u64());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut logger = TranscriptLogger::new();
        assert!(logger.stop().is_ok());
        assert!(!logger.is_recording());
    }
}
