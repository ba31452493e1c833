//! WebSocket test client for room channel tests
//!
//! Note: Some methods may appear unused because they're only used in specific
//! test files and clippy checks each test independently.

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use poker_core::RoomId;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One participant's room connection
pub struct RoomClient {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl RoomClient {
    /// Connect to a room, optionally carrying a session cookie
    pub async fn connect(addr: SocketAddr, room: &RoomId, cookie: Option<&str>) -> Self {
        let url = format!("ws://{}/echo?roomId={}", addr, room);
        let mut request = url.into_client_request().unwrap();
        if let Some(cookie) = cookie {
            request
                .headers_mut()
                .insert("Cookie", HeaderValue::from_str(cookie).unwrap());
        }

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .expect("Failed to connect");
        let (sink, stream) = ws.split();
        Self { sink, stream }
    }

    /// Send a text frame
    pub async fn send(&mut self, frame: &str) {
        self.sink
            .send(Message::Text(frame.to_string().into()))
            .await
            .unwrap();
    }

    /// Send a binary frame
    #[allow(dead_code)]
    pub async fn send_binary(&mut self, frame: &[u8]) {
        self.sink
            .send(Message::Binary(frame.to_vec().into()))
            .await
            .unwrap();
    }

    /// Receive the next text or binary payload
    pub async fn recv(&mut self) -> String {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec()).unwrap();
                }
                Some(Ok(Message::Close(_))) | None => panic!("WebSocket closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("WebSocket error: {}", e),
            }
        }
    }

    /// Receive with timeout, returns None if timeout
    #[allow(dead_code)]
    pub async fn recv_timeout(&mut self, duration: Duration) -> Option<String> {
        tokio::time::timeout(duration, self.recv()).await.ok()
    }

    /// Assert no payload arrives within duration
    #[allow(dead_code)]
    pub async fn expect_no_message(&mut self, duration: Duration) {
        assert!(
            self.recv_timeout(duration).await.is_none(),
            "Expected no message but received one"
        );
    }

    /// Wait for the server to close the connection
    #[allow(dead_code)]
    pub async fn expect_closed(&mut self, duration: Duration) {
        let closed = tokio::time::timeout(duration, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "Expected the server to close the connection");
    }

    /// Close from the client side
    #[allow(dead_code)]
    pub async fn close(mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
    }
}

/// Perform a raw upgrade request and return the response status and Location
#[allow(dead_code)]
pub async fn upgrade_status(
    addr: SocketAddr,
    room_id: &str,
    cookie: Option<&str>,
) -> (u16, Option<String>) {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let mut request = client
        .get(format!("http://{}/echo?roomId={}", addr, room_id))
        .header("Connection", "upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
    if let Some(cookie) = cookie {
        request = request.header("Cookie", cookie);
    }

    let response = request.send().await.unwrap();
    let location = response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    (response.status().as_u16(), location)
}
