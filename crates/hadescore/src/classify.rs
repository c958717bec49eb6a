//! 行分類引擎
//!
//! 將一行（或以空白行分隔的多行區塊）伺服器輸出分類為唯一一個
//! [`HadesMessage`]。規則依序嘗試，第一個符合者勝出。
//!
//! 規則順序是協定本身的歧義解決方式，不是程式結構的巧合：
//! 多個規則在理論上可以命中同一行（例如 `-> Bob is away` 同時符合
//! 狀態變更與一般系統訊息的形狀），順序決定了最終分類。調整順序
//! 會改變線上行為。

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::ansi::strip_ansi;
use crate::message::{action, HadesMessage, SELF_TARGET};
use crate::state::SessionState;

lazy_static! {
    /// 規則 1：房間清單（.look 或移動後的輸出，允許跨行）
    static ref RE_ROOM_LISTING: Regex =
        Regex::new(r"(?s)^You are in the.*You can see: ([^\n]*)").unwrap();
    /// 規則 2：URL 公告
    static ref RE_URL: Regex = Regex::new(r"\[URL\] ([^:]*): (.*)").unwrap();
    /// 規則 3：具名發言，動作是動詞片語原文
    static ref RE_UTTERANCE: Regex = Regex::new(r"^(>?>?)(\S*) (.*): (.*)").unwrap();
    /// 規則 3 子樣式：指向特定對象的發言
    static ref RE_DIRECTED: Regex = Regex::new(r"says to (.*)").unwrap();
    /// 規則 4：echo 輸出
    static ref RE_ECHO: Regex = Regex::new(r"^(\(.+\)|-) (.*)").unwrap();
    /// 規則 5：away 狀態變更
    static ref RE_STATUS: Regex = Regex::new(r"^-> (.*) (is away|returns)").unwrap();
    /// 規則 7：一般系統訊息
    static ref RE_SYS_MESSAGE: Regex = Regex::new(r"^-> (.*)").unwrap();
    /// 規則 8：emote（比規則 3 寬鬆，名稱僅限字母）
    static ref RE_EMOTE: Regex = Regex::new(r"^(>?>?)([a-zA-Z]*) (.*)").unwrap();
}

/// 損毀哨兵：telnet 協商位元組經 lossy UTF-8 解碼後留下的形狀
/// （兩個替換字元接一個控制位元組）
const CORRUPTION_SENTINEL: [char; 3] = ['\u{fffd}', '\u{fffd}', '\u{0005}'];

/// 分類一行伺服器輸出
///
/// 輸入可以帶 ANSI 顏色碼，會先剝除再比對。只有規則 1（房間清單）
/// 與規則 6（移入閒置區）會改動會話狀態，其餘規則不碰。
/// 無法分類的行永遠落入 `Unknown`/`ignore`，不會是錯誤。
///
/// # Example
/// ```
/// use hadescore::{classify, SessionState};
///
/// let mut state = SessionState::new();
/// let msg = classify("Bob says: hello there", &mut state);
/// assert_eq!(msg.user, "Bob");
/// assert_eq!(msg.action, "says");
/// assert_eq!(msg.text, "hello there");
/// assert!(!msg.private);
/// ```
pub fn classify(input: &str, state: &mut SessionState) -> HadesMessage {
    let stripped = strip_ansi(input);
    let out = stripped.trim();

    let mut msg = HadesMessage::default();

    // 規則 1：房間清單，整批重建使用者清單（這裡保留大小寫）
    if let Some(caps) = RE_ROOM_LISTING.captures(out) {
        let users = caps[1]
            .trim()
            .split(',')
            .map(|name| name.trim().to_string())
            .collect();
        state.set_users(users);

        msg.sys_message = true;
        msg.action = action::LOOK.to_string();
        return msg;
    }

    // 規則 2：URL 公告
    if let Some(caps) = RE_URL.captures(out) {
        msg.action = action::URL.to_string();
        msg.user = caps[1].to_string();
        msg.text = caps[2].to_string();
        return msg;
    }

    // 規則 3：具名發言；`>`/`>>` 前綴代表私訊
    if let Some(caps) = RE_UTTERANCE.captures(out) {
        msg.private = !caps[1].is_empty();
        msg.user = caps[2].to_string();
        msg.action = caps[3].to_string();
        msg.text = caps[4].to_string();

        // 動詞片語帶 "says to <target>" 時改判為導向發言
        if let Some(dcaps) = RE_DIRECTED.captures(&caps[3]) {
            msg.action = action::DSAY.to_string();
            msg.directed = true;
            msg.directed_target = if &dcaps[1] == "you" {
                SELF_TARGET.to_string()
            } else {
                dcaps[1].to_string()
            };
        }
        return msg;
    }

    // 規則 4：echo；破折號佔位符不帶發話者
    if let Some(caps) = RE_ECHO.captures(out) {
        msg.action = action::ECHO.to_string();
        msg.text = caps[2].to_string();
        if &caps[1] != "-" {
            msg.user = caps[1].to_string();
        }
        return msg;
    }

    // 規則 5：away 狀態變更
    if let Some(caps) = RE_STATUS.captures(out) {
        msg.private = false;
        msg.user = caps[1].to_string();
        msg.action = if &caps[2] == "is away" {
            action::AWAY
        } else {
            action::RETURNS
        }
        .to_string();
        msg.text = String::new();
        return msg;
    }

    // 規則 6：被移入閒置區
    if out.starts_with("You are in the idle") {
        state.set_idle(true);
        msg.action = action::MOVED_TO_IDLE.to_string();
        msg.text = String::new();
        msg.sys_message = true;
        return msg;
    }

    // 規則 7：一般系統訊息
    if let Some(caps) = RE_SYS_MESSAGE.captures(out) {
        msg.action = action::SYS_MESSAGE.to_string();
        msg.text = caps[1].to_string();
        msg.sys_message = true;
        return msg;
    }

    // 規則 8：emote
    if let Some(caps) = RE_EMOTE.captures(out) {
        msg.private = !caps[1].is_empty();
        msg.user = caps[2].to_string();
        msg.action = action::EMOTE.to_string();
        msg.emote = true;
        msg.text = caps[3].to_string();
        return msg;
    }

    // 規則 9：損毀哨兵默默丟棄，其餘進 Unknown 並留下診斷
    if !out.is_empty() {
        let head: Vec<char> = out.chars().take(3).collect();
        if head == CORRUPTION_SENTINEL {
            msg.ignore = true;
            return msg;
        }

        warn!("無法分類的輸出: {:?} ({} 字元)", out, out.chars().count());
    }

    msg.action = action::UNKNOWN.to_string();
    msg.ignore = true;
    msg.user = "system".to_string();
    msg.sys_message = true;
    msg.text = out.to_string();
    msg
}
