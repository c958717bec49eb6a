//! 離線重播模組
//!
//! 將先前擷取的伺服器輸出重新走一遍與線上相同的緩衝與分類流程，
//! 不需要實際連線。用途是拿錄下的對話當分類器的回歸測資。

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::classify::classify;
use crate::message::HadesMessage;
use crate::state::SessionState;

/// 重播錯誤
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("IO 錯誤: {0}")]
    Io(#[from] io::Error),
}

/// 重播一段擷取的輸出
///
/// 行先累積進緩衝，遇到空白行才把整個緩衝當成一個區塊分類，
/// 對應線上伺服器以空白行分隔多行輸出的慣例。空區塊不產生訊息。
pub fn replay_lines(data: &str, state: &mut SessionState) -> Vec<HadesMessage> {
    let mut messages = Vec::new();
    let mut buffer = String::new();

    for line in data.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)) {
        if line.is_empty() {
            if !buffer.is_empty() {
                messages.push(classify(&buffer, state));
                buffer.clear();
            }
        } else {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }

    if !buffer.is_empty() {
        messages.push(classify(&buffer, state));
    }

    messages
}

/// 從檔案讀取擷取的輸出並重播
///
/// 檔案讀取失敗直接回報給呼叫端，不影響任何線上連線狀態。
pub fn replay_file(
    path: impl AsRef<Path>,
    state: &mut SessionState,
) -> Result<Vec<HadesMessage>, ReplayError> {
    let data = fs::read_to_string(path)?;
    Ok(replay_lines(&data, state))
}
