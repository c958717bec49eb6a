//! Hades Talker 客戶端核心
//!
//! 提供 Hades talker 協定客戶端的核心功能：
//! - `ansi`: 終端轉義碼與控制字元清理
//! - `login`: 登入握手狀態機
//! - `classify`: 行分類引擎
//! - `state`: 會話狀態（使用者清單與閒置旗標）
//! - `client`: 連線管理、事件發佈與閒置區自動返回
//! - `replay`: 擷取輸出的離線重播
//! - `transcript`: 逐字稿記錄
//!
//! 對外橋接層（Matrix 等）只依賴兩個出口：[`ClientEvent`] 事件流
//! 與 [`HadesClient::users`] 快照；送往伺服器的 `.` 指令字串
//! 原樣透傳，不在這一層結構化。

pub mod ansi;
pub mod classify;
pub mod client;
pub mod login;
pub mod message;
pub mod replay;
pub mod state;
pub mod transcript;

pub use ansi::{clean_line, strip_ansi};
pub use classify::classify;
pub use client::{
    ClientConfig, ClientError, ClientEvent, Connection, ConnectionState, HadesClient,
    IDLE_RETURN_COMMAND,
};
pub use login::{LoginAction, LoginMachine, LoginState};
pub use message::{HadesMessage, SELF_TARGET, SELF_USER};
pub use replay::{replay_file, replay_lines, ReplayError};
pub use state::SessionState;
pub use transcript::{TranscriptError, TranscriptLogger};
