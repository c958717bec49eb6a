//! 終端轉義碼清理模組
//!
//! 清理 Hades 伺服器輸出中的 ANSI 顏色碼與控制字元。
//! 兩個函數都是純函數，沒有失敗模式：無法辨識的位元組
//! 原樣通過。

/// 移除 ANSI 轉義序列，只保留文字內容
///
/// 只處理以 ESC 開頭的序列（CSI 序列消耗到終止符為止、
/// 字集指定消耗一個識別碼）。ESC 以外的控制字元會原樣保留，
/// 因為分類器的損毀哨兵規則需要看到它們。
///
/// # Example
/// ```
/// use hadescore::ansi::strip_ansi;
///
/// let colored = "\x1b[31mBob\x1b[0m says: hi";
/// assert_eq!(strip_ansi(colored), "Bob says: hi");
/// ```
pub fn strip_ansi(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some(&'[') => {
                    chars.next(); // 消耗 '['
                    // 跳過直至終止符 (0x40-0x7E)
                    while let Some(&ch) = chars.peek() {
                        let b = ch as u32;
                        chars.next();
                        if (0x40..=0x7E).contains(&b) {
                            break;
                        }
                    }
                }
                Some(&'(') | Some(&')') => {
                    chars.next(); // 消耗 '(' 或 ')'
                    chars.next(); // 消耗字集識別碼
                }
                _ => {
                    // 其他 ESC 序列，跳過 ESC 本身
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// 登入階段用的完整正規化
///
/// 先移除轉義序列，再移除所有控制字元（含換行等行終止序列），
/// 最後逐一剝除前導空白。登入狀態機用這個結果比對提示字尾。
pub fn clean_line(input: &str) -> String {
    let stripped = strip_ansi(input);
    let mut result: String = stripped.chars().filter(|c| !c.is_control()).collect();

    while result.starts_with(' ') {
        result.remove(0);
    }

    result
}
