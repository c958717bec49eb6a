//! Hades 連線管理
//!
//! 擁有唯一一條對外 TCP 連線：逾時策略、登入導流、分類結果的
//! 事件發佈、閒置區自動返回與自我回音抑制。所有輸入處理與送出
//! 都序列化在單一工作任務裡，分類不會重排行的順序。

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::classify::classify;
use crate::login::{LoginAction, LoginMachine};
use crate::message::{action, HadesMessage, SELF_USER};
use crate::state::SessionState;
use crate::transcript::TranscriptLogger;

/// 從閒置區返回主房間的導航指令
///
/// `.` 開頭的指令文法屬於遠端協定，這一層只把它當不透明字串。
pub const IDLE_RETURN_COMMAND: &str = ".go styx";

/// 連線錯誤
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("連線失敗: {0}")]
    ConnectionFailed(#[from] io::Error),

    #[error("連線逾時")]
    Timeout,

    #[error("未連線")]
    NotConnected,

    #[error("DNS 解析失敗: {0}")]
    DnsResolutionFailed(String),
}

/// 連線狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// 客戶端配置，同時是外部層提供的帳密持有者
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 主機名稱或 IP
    pub host: String,
    /// 連接埠
    pub port: u16,
    /// 登入帳號
    pub username: String,
    /// 登入密碼
    pub password: String,
    /// 連線逾時
    pub connect_timeout: Duration,
    /// 閒置逾時：超過這段時間沒有任何輸入就視為連線失效
    pub idle_timeout: Duration,
    /// 讀取緩衝區大小
    pub read_buffer_size: usize,
    /// 逐字稿輸出路徑（`None` 表示不記錄）
    pub transcript_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "hades-talker.org".to_string(),
            port: 6660,
            username: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            read_buffer_size: 8192,
            transcript_path: None,
        }
    }
}

/// 發佈給外部層的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// 登入完成
    Connected,
    /// 一行已分類且未被抑制的訊息
    Message(HadesMessage),
}

/// 發送給工作任務的命令
#[derive(Debug)]
enum Command {
    Send(String),
    Disconnect,
}

/// 單一 TCP 連線的封裝
pub struct Connection {
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    idle_timeout: Duration,
    read_buffer_size: usize,
    state: ConnectionState,
}

impl Connection {
    /// 從配置建立未連線的 Connection
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            stream: None,
            connect_timeout: config.connect_timeout,
            idle_timeout: config.idle_timeout,
            read_buffer_size: config.read_buffer_size,
            state: ConnectionState::Disconnected,
        }
    }

    /// 獲取連線狀態
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 連線到 Hades 伺服器
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        self.state = ConnectionState::Connecting;
        info!("正在連線到 {}:{}", host, port);

        let addr = format!("{}:{}", host, port);
        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| ClientError::DnsResolutionFailed(e.to_string()))?
            .collect();

        if socket_addrs.is_empty() {
            self.state = ConnectionState::Disconnected;
            return Err(ClientError::DnsResolutionFailed(format!(
                "無法解析主機: {}",
                host
            )));
        }

        debug!("已解析到位址: {:?}", socket_addrs);

        let stream = timeout(self.connect_timeout, TcpStream::connect(&socket_addrs[0]))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(ClientError::ConnectionFailed)?;

        stream.set_nodelay(true)?;

        info!("已連線到 {}:{}", host, port);
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;

        Ok(())
    }

    /// 斷開連線
    pub async fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.state = ConnectionState::Disconnected;
        info!("已斷開連線");
    }

    /// 發送一行文字（自動補上 CRLF）
    pub async fn send(&mut self, text: &str) -> Result<(), ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        let mut data = text.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");

        stream.write_all(&data).await?;
        stream.flush().await?;

        debug!("已發送: {}", text);
        Ok(())
    }

    /// 讀取下一個資料塊
    ///
    /// 超過閒置逾時沒有資料視為連線失效。伺服器偶爾夾帶的 telnet
    /// 協商位元組會被 lossy 解碼留在文字裡，交給分類器的損毀哨兵
    /// 規則吸收。
    pub async fn read(&mut self) -> Result<String, ClientError> {
        let idle_timeout = self.idle_timeout;
        let capacity = self.read_buffer_size;
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;

        let mut buffer = BytesMut::with_capacity(capacity);
        let n = timeout(idle_timeout, stream.read_buf(&mut buffer))
            .await
            .map_err(|_| ClientError::Timeout)??;

        if n == 0 {
            self.state = ConnectionState::Disconnected;
            return Err(ClientError::NotConnected);
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Hades 客戶端
///
/// 對外部層的完整介面：`connect` 建立連線並訂閱事件流，`send`
/// 送出文字，`users`/`is_idle` 讀取會話狀態快照。
pub struct HadesClient {
    config: ClientConfig,
    state: Arc<Mutex<SessionState>>,
    command_tx: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl HadesClient {
    /// 創建新的客戶端
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(SessionState::new())),
            command_tx: None,
            worker: None,
        }
    }

    /// 目前房間內使用者的快照
    pub fn users(&self) -> Vec<String> {
        self.state.lock().map(|s| s.users()).unwrap_or_default()
    }

    /// 會話是否已被移入閒置區
    pub fn is_idle(&self) -> bool {
        self.state.lock().map(|s| s.is_idle()).unwrap_or(false)
    }

    /// 工作任務是否存活
    pub fn is_connected(&self) -> bool {
        self.worker.as_ref().map(|w| !w.is_finished()).unwrap_or(false)
    }

    /// 建立連線並啟動工作任務；已連線時重複呼叫是 no-op
    ///
    /// 事件依輸入處理順序送進 `event_tx`。連線失敗直接回報，
    /// 重連策略由外部層決定，這一層不自動重連。
    pub async fn connect(&mut self, event_tx: mpsc::Sender<ClientEvent>) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }

        let mut conn = Connection::new(&self.config);
        conn.connect(&self.config.host, self.config.port).await?;

        let (command_tx, command_rx) = mpsc::channel(32);
        let worker = tokio::spawn(run_session(
            conn,
            self.config.clone(),
            Arc::clone(&self.state),
            command_rx,
            event_tx,
        ));

        self.command_tx = Some(command_tx);
        self.worker = Some(worker);
        Ok(())
    }

    /// 送出一行文字
    ///
    /// 會話在閒置區時，工作任務會先送出返回指令再送本文，
    /// 確保指令不會被伺服器默默丟掉。
    pub async fn send(&self, text: &str) -> Result<(), ClientError> {
        let tx = self.command_tx.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(Command::Send(text.to_string()))
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    /// 結束會話並釋放連線；之後的 `send` 一律回 `NotConnected`
    pub async fn disconnect(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(Command::Disconnect).await;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

/// 工作任務主迴圈
///
/// 唯一持有 Connection 的地方；輸入塊依到達順序處理，
/// 與外部觸發的送出交錯但絕不並行。
async fn run_session(
    mut conn: Connection,
    config: ClientConfig,
    state: Arc<Mutex<SessionState>>,
    mut command_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<ClientEvent>,
) {
    let mut login = LoginMachine::new();

    let mut transcript = TranscriptLogger::new();
    if let Some(path) = &config.transcript_path {
        if let Err(e) = transcript.start(path) {
            warn!("無法開啟逐字稿 {}: {}", path.display(), e);
        }
    }

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(Command::Send(text)) => {
                        if let Err(e) = transmit(&mut conn, &state, &text).await {
                            error!("發送失敗: {}", e);
                            break;
                        }
                    }
                    Some(Command::Disconnect) | None => break,
                }
            }
            result = conn.read() => {
                match result {
                    Ok(chunk) if !chunk.is_empty() => {
                        let keep_going = handle_chunk(
                            &mut conn,
                            &config,
                            &state,
                            &mut login,
                            &mut transcript,
                            &event_tx,
                            &chunk,
                        )
                        .await;
                        if !keep_going {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("讀取錯誤: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let _ = transcript.stop();
    conn.disconnect().await;
}

/// 送出一行文字；閒置時先送返回指令再送本文並清旗標
async fn transmit(
    conn: &mut Connection,
    state: &Arc<Mutex<SessionState>>,
    text: &str,
) -> Result<(), ClientError> {
    let in_idle = state.lock().map(|s| s.is_idle()).unwrap_or(false);
    if in_idle {
        info!("會話在閒置區，先返回 styx");
        conn.send(IDLE_RETURN_COMMAND).await?;
        if let Ok(mut s) = state.lock() {
            s.set_idle(false);
        }
    }

    conn.send(text).await
}

/// 處理一個已到達的輸入塊；回傳 false 表示會話應結束
async fn handle_chunk(
    conn: &mut Connection,
    config: &ClientConfig,
    state: &Arc<Mutex<SessionState>>,
    login: &mut LoginMachine,
    transcript: &mut TranscriptLogger,
    event_tx: &mpsc::Sender<ClientEvent>,
    chunk: &str,
) -> bool {
    // 認證前全部交給登入狀態機
    if !login.is_authenticated() {
        let login_action = match state.lock() {
            Ok(mut s) => login.handle_chunk(chunk, &mut s),
            Err(_) => return false,
        };

        match login_action {
            LoginAction::SendUsername => {
                info!("送出帳號");
                if conn.send(&config.username).await.is_err() {
                    return false;
                }
            }
            LoginAction::SendPassword => {
                info!("送出密碼");
                if conn.send(&config.password).await.is_err() {
                    return false;
                }
            }
            LoginAction::Connected => {
                info!("登入完成");
                if event_tx.send(ClientEvent::Connected).await.is_err() {
                    warn!("接收端已關閉");
                    return false;
                }
            }
            LoginAction::Ignored => {}
        }
        return true;
    }

    // 鎖只包住分類本身，不跨越任何 await
    let msg = match state.lock() {
        Ok(mut s) => classify(chunk, &mut s),
        Err(_) => return false,
    };

    if transcript.is_recording() {
        if let Err(e) = transcript.log(chunk, &msg) {
            warn!("逐字稿寫入失敗: {}", e);
        }
    }

    // 被移入閒置區或無法發言時主動返回。這是伺服器推播，
    // 不走 send 路徑的旗標檢查，旗標留給下一次送出時清除。
    if needs_idle_return(&msg) {
        info!("被移入閒置區，返回 styx");
        if conn.send(IDLE_RETURN_COMMAND).await.is_err() {
            return false;
        }
    }

    // 自己發出的行不再回送給外部層
    if is_self_echo(&msg, &config.username) {
        return true;
    }

    if event_tx.send(ClientEvent::Message(msg)).await.is_err() {
        warn!("接收端已關閉");
        return false;
    }

    true
}

/// 分類結果是否代表本機被移入閒置區或無法在目前房間發言
fn needs_idle_return(msg: &HadesMessage) -> bool {
    msg.action == action::MOVED_TO_IDLE
        || (msg.user == SELF_USER && msg.action == action::EMOTE && msg.text == "are in the idle")
        || (msg.sys_message
            && msg.action == action::SYS_MESSAGE
            && msg.text == "You can't talk here")
}

/// 是否為自己造成的回音
fn is_self_echo(msg: &HadesMessage, username: &str) -> bool {
    msg.user == SELF_USER || msg.user == username
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "hades-talker.org");
        assert_eq!(config.port, 6660);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert!(config.transcript_path.is_none());
    }

    #[test]
    fn test_connection_creation() {
        let conn = Connection::new(&ClientConfig::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_without_connection() {
        let mut conn = Connection::new(&ClientConfig::default());
        let result = tokio_test::block_on(conn.send("test"));
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[test]
    fn test_read_without_connection() {
        let mut conn = Connection::new(&ClientConfig::default());
        let result = tokio_test::block_on(conn.read());
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_client_send_before_connect() {
        let client = HadesClient::new(ClientConfig::default());
        let result = client.send("hello").await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[test]
    fn test_needs_idle_return() {
        let moved = HadesMessage {
            action: action::MOVED_TO_IDLE.to_string(),
            sys_message: true,
            ..Default::default()
        };
        assert!(needs_idle_return(&moved));

        let cant_talk = HadesMessage {
            action: action::SYS_MESSAGE.to_string(),
            sys_message: true,
            text: "You can't talk here".to_string(),
            ..Default::default()
        };
        assert!(needs_idle_return(&cant_talk));

        let idle_emote = HadesMessage {
            user: "You".to_string(),
            action: action::EMOTE.to_string(),
            emote: true,
            text: "are in the idle".to_string(),
            ..Default::default()
        };
        assert!(needs_idle_return(&idle_emote));

        let chat = HadesMessage {
            user: "Bob".to_string(),
            action: "says".to_string(),
            text: "hi".to_string(),
            ..Default::default()
        };
        assert!(!needs_idle_return(&chat));
    }

    #[test]
    fn test_is_self_echo() {
        let mut msg = HadesMessage::default();
        msg.user = "You".to_string();
        assert!(is_self_echo(&msg, "tester"));

        msg.user = "tester".to_string();
        assert!(is_self_echo(&msg, "tester"));

        msg.user = "Bob".to_string();
        assert!(!is_self_echo(&msg, "tester"));
    }

    fn test_config(port: u16) -> ClientConfig {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: "tester".to_string(),
            password: "secret".to_string(),
            idle_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_login_handshake_and_event_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];

            sock.write_all(b"Please enter your name: ").await.unwrap();
            let n = sock.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"tester\r\n");

            sock.write_all(b"Please enter your password: ").await.unwrap();
            let n = sock.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"secret\r\n");

            sock.write_all(b"Greetings, Tester!\nYou can see: Alice, Bob\n")
                .await
                .unwrap();
            // 留一點時間讓問候與聊天行落在不同資料塊
            tokio::time::sleep(Duration::from_millis(100)).await;

            sock.write_all(b"You say: hi all\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            sock.write_all(b"Alice says: welcome\n").await.unwrap();

            tokio::time::sleep(Duration::from_millis(300)).await;
        });

        let mut client = HadesClient::new(test_config(port));
        let (tx, mut rx) = mpsc::channel(16);
        client.connect(tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(ClientEvent::Connected));
        assert_eq!(client.users(), vec!["alice", "bob"]);

        // 自己的發言（user = You）被抑制，下一個事件直接是 Alice
        match rx.recv().await {
            Some(ClientEvent::Message(msg)) => {
                assert_eq!(msg.user, "Alice");
                assert_eq!(msg.action, "says");
                assert_eq!(msg.text, "welcome");
            }
            other => panic!("預期收到 Alice 的訊息，卻是 {:?}", other),
        }

        client.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_return_precedes_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();

            // 直接送問候，跳過帳密提示
            sock.write_all(b"Greetings, Tester!\nYou can see: Alice\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;

            sock.write_all(b"You are in the idle area.\n").await.unwrap();

            // 收集送出的所有資料直到 hello 出現
            let mut collected = Vec::new();
            let mut buf = vec![0u8; 256];
            while !collected.ends_with(b"hello\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                assert!(n > 0, "連線在收到 hello 前被關閉");
                collected.extend_from_slice(&buf[..n]);
            }

            // 推播觸發的返回指令在前，send 路徑的返回指令接著本文
            assert_eq!(collected, b".go styx\r\n.go styx\r\nhello\r\n".to_vec());
        });

        let mut client = HadesClient::new(test_config(port));
        let (tx, mut rx) = mpsc::channel(16);
        client.connect(tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(ClientEvent::Connected));

        match rx.recv().await {
            Some(ClientEvent::Message(msg)) => {
                assert_eq!(msg.action, "Moved to Idle");
            }
            other => panic!("預期收到閒置通知，卻是 {:?}", other),
        }
        assert!(client.is_idle());

        client.send("hello").await.unwrap();
        server.await.unwrap();

        // send 路徑清掉了閒置旗標
        assert!(!client.is_idle());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
        });

        let mut client = HadesClient::new(test_config(port));
        let (tx, _rx) = mpsc::channel(16);
        client.connect(tx).await.unwrap();
        assert!(client.is_connected());

        // 第二次 connect 是 no-op，不會建立第二條連線
        let (tx2, _rx2) = mpsc::channel(16);
        client.connect(tx2).await.unwrap();

        client.disconnect().await;
        assert!(!client.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_disconnect_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let mut client = HadesClient::new(test_config(port));
        let (tx, _rx) = mpsc::channel(16);
        client.connect(tx).await.unwrap();
        client.disconnect().await;

        let result = client.send("hello").await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
        server.await.unwrap();
    }
}
