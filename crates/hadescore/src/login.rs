//! 登入握手狀態機
//!
//! 在認證完成前驅動與伺服器的握手流程。狀態機本身不碰 socket，
//! 只回報呼叫端應執行的動作；它也沒有自己的逾時，唯一的時間
//! 上限是連線層的閒置逾時。

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::ansi::{clean_line, strip_ansi};
use crate::state::SessionState;

lazy_static! {
    /// 問候橫幅裡夾帶的初始使用者清單
    static ref RE_CAN_SEE: Regex = Regex::new(r"You can see: (.*)").unwrap();
}

/// 握手進度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// 等待帳號提示
    AwaitingName,
    /// 帳號已送出，等待密碼提示與問候橫幅
    AwaitingPassword,
    /// 登入完成（「已在線上，切換舊會話」的路徑也收斂到這裡）
    Authenticated,
}

/// 狀態機要求呼叫端執行的動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginAction {
    /// 送出設定的帳號
    SendUsername,
    /// 送出設定的密碼
    SendPassword,
    /// 登入完成，初始使用者清單已寫入會話狀態
    Connected,
    /// 無法辨識的橫幅雜訊；維持原狀態等待下一個提示
    Ignored,
}

/// 登入狀態機
///
/// 提示比對不依賴目前狀態：伺服器在密碼錯誤時會重發帳號提示，
/// 每個資料塊都重新比對一輪才能跟上。狀態欄位記錄的是進度，
/// 供日誌與外部觀察使用。
#[derive(Debug)]
pub struct LoginMachine {
    state: LoginState,
}

impl LoginMachine {
    /// 建立新的狀態機，從等待帳號提示開始
    pub fn new() -> Self {
        Self {
            state: LoginState::AwaitingName,
        }
    }

    /// 目前的握手進度
    pub fn state(&self) -> LoginState {
        self.state
    }

    /// 是否已完成登入
    pub fn is_authenticated(&self) -> bool {
        self.state == LoginState::Authenticated
    }

    /// 處理認證前收到的一個原始資料塊
    ///
    /// 使用者清單從僅去除轉義碼的文字中擷取：完整正規化會吃掉
    /// 換行，破壞名單的截斷位置。名稱儲存時轉為小寫。
    pub fn handle_chunk(&mut self, raw: &str, state: &mut SessionState) -> LoginAction {
        let stripped = strip_ansi(raw);
        let stripped = stripped.trim();
        let cleaned = clean_line(stripped);
        let data = cleaned.trim();

        if data.ends_with("name:") {
            self.state = LoginState::AwaitingPassword;
            return LoginAction::SendUsername;
        }

        // 密碼提示有兩種空白變體
        if data.ends_with("your password :") || data.ends_with("your password:") {
            return LoginAction::SendPassword;
        }

        if data.starts_with("Greetings,")
            || data.starts_with("-> You are already logged in, switching to old session...")
        {
            if let Some(caps) = RE_CAN_SEE.captures(stripped) {
                let users = caps[1]
                    .trim()
                    .split(',')
                    .map(|name| name.trim().to_lowercase())
                    .collect();
                state.set_users(users);
            }
            self.state = LoginState::Authenticated;
            return LoginAction::Connected;
        }

        debug!("登入階段收到未辨識的資料: {}", data);
        LoginAction::Ignored
    }
}

impl Default for LoginMachine {
    fn default() -> Self {
        Self::new()
    }
}
