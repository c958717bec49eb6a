//! 會話狀態模組
//!
//! 保存伺服器端推導出的暫態狀態：目前房間的使用者清單與閒置旗標。
//! 連線建立時為空，連線結束時整個丟棄。

/// 會話狀態
///
/// 使用者清單只會整批替換（對應 .look 或登入問候的完整名單），
/// 從不做增量修補。寫入方法限定在 crate 內部，只有分類器、
/// 登入狀態機與連線管理層可以呼叫；外部只拿得到唯讀快照。
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    users: Vec<String>,
    idle: bool,
}

impl SessionState {
    /// 建立空的會話狀態
    pub fn new() -> Self {
        Self::default()
    }

    /// 目前房間內使用者的快照（回傳複本，不是即時視圖）
    pub fn users(&self) -> Vec<String> {
        self.users.clone()
    }

    /// 會話是否已被移入閒置區
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// 整批替換使用者清單
    pub(crate) fn set_users(&mut self, users: Vec<String>) {
        self.users = users;
    }

    /// 設定或清除閒置旗標
    pub(crate) fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }
}
