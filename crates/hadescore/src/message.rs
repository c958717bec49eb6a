//! 分類結果的資料模型
//!
//! 每一行伺服器輸出經過分類後產生一個 `HadesMessage`

use serde::Serialize;

/// 導向訊息指向本機操作者時，`directed_target` 使用的保留值
pub const SELF_TARGET: &str = "@YOU";

/// 伺服器以第二人稱指稱本機操作者時出現的名稱
pub const SELF_USER: &str = "You";

/// 分類動作標籤
///
/// 規則 3 的動作是伺服器輸出中的動詞片語原文（如 `says`、`tells`），
/// 不在此列；這裡只列固定標籤。
pub mod action {
    pub const LOOK: &str = "look";
    pub const URL: &str = "url";
    pub const DSAY: &str = "dsay";
    pub const ECHO: &str = "echo";
    pub const AWAY: &str = "away";
    pub const RETURNS: &str = "returns";
    pub const MOVED_TO_IDLE: &str = "Moved to Idle";
    pub const SYS_MESSAGE: &str = "sysMessage";
    pub const EMOTE: &str = "emote";
    pub const UNKNOWN: &str = "Unknown";
}

/// 一行已分類的伺服器輸出
///
/// `action` 每行只會被指定一次；旗標之間沒有互斥關係
/// （例如一行可以同時是 `sys_message` 與 `ignore`）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HadesMessage {
    /// 發話者或事件主體；預設 `"system"`
    pub user: String,
    /// 分類標籤或動詞片語原文
    pub action: String,
    /// 行的內容部分（純狀態事件為空字串）
    pub text: String,
    /// 是否為 emote
    pub emote: bool,
    /// 是否為系統訊息
    pub sys_message: bool,
    /// 是否指向特定對象
    pub directed: bool,
    /// `directed` 為真時的對象名稱；指向本機操作者時為 [`SELF_TARGET`]
    pub directed_target: String,
    /// 是否為私訊形式（行首帶 `>` 標記）
    pub private: bool,
    /// 消費端預設應丟棄（保留給「顯示系統雜訊」模式）
    pub ignore: bool,
}

impl Default for HadesMessage {
    fn default() -> Self {
        Self {
            user: "system".to_string(),
            action: String::new(),
            text: String::new(),
            emote: false,
            sys_message: false,
            directed: false,
            directed_target: String::new(),
            private: false,
            ignore: false,
        }
    }
}
