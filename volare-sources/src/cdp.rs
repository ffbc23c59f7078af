//! Minimal Chrome DevTools Protocol client over the debugging websocket.
//!
//! Talks to a system-installed browser launched with
//! `--remote-debugging-port`; only the handful of domains the browser
//! source needs (Page, Runtime, Network) are implemented.

use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use volare_core::adapter::FetchContext;
use volare_core::error::VolareError;

const NAME: &str = "browser";

#[derive(Debug, Deserialize)]
struct NewTarget {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// One DevTools websocket connection to one browser tab.
pub struct CdpConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    events: VecDeque<Value>,
}

impl CdpConnection {
    /// Open a fresh tab on the browser listening at `port` and attach to
    /// its debugger websocket.
    ///
    /// # Errors
    /// Connection failures as `Transient`; deadline expiry as timeouts.
    pub async fn connect(
        http: &reqwest::Client,
        port: u16,
        cx: &FetchContext,
    ) -> Result<Self, VolareError> {
        let endpoint = format!("http://127.0.0.1:{port}/json/new?about:blank");
        let resp = cx
            .io(
                http.put(&endpoint).send(),
                VolareError::source_timeout(NAME),
            )
            .await?
            .map_err(|e| VolareError::transient(NAME, format!("devtools http: {e}")))?;
        let target: NewTarget = cx
            .io(resp.json(), VolareError::source_timeout(NAME))
            .await?
            .map_err(|e| VolareError::transient(NAME, format!("devtools target: {e}")))?;
        let connect = connect_async(&target.web_socket_debugger_url);
        let (ws, _) = cx
            .io(connect, VolareError::source_timeout(NAME))
            .await?
            .map_err(|e| VolareError::transient(NAME, format!("devtools ws: {e}")))?;
        Ok(Self {
            ws,
            next_id: 0,
            events: VecDeque::new(),
        })
    }

    /// Send one command and wait for its result, buffering any events
    /// that arrive in between.
    ///
    /// # Errors
    /// Protocol errors as `Source`, transport failures as `Transient`.
    pub async fn command(
        &mut self,
        method: &str,
        params: Value,
        cx: &FetchContext,
    ) -> Result<Value, VolareError> {
        self.next_id += 1;
        let id = self.next_id;
        let frame = json!({ "id": id, "method": method, "params": params }).to_string();
        cx.io(
            self.ws.send(Message::Text(frame.into())),
            VolareError::source_timeout(NAME),
        )
        .await?
        .map_err(|e| VolareError::transient(NAME, format!("ws send: {e}")))?;

        loop {
            let msg = self.next_message(cx).await?;
            if msg.get("id").and_then(Value::as_u64) == Some(id) {
                if let Some(err) = msg.get("error") {
                    return Err(VolareError::source(NAME, format!("{method}: {err}")));
                }
                return Ok(msg.get("result").cloned().unwrap_or(Value::Null));
            }
            if msg.get("method").is_some() {
                self.events.push_back(msg);
            }
        }
    }

    /// Wait for the next event matching `method` whose params satisfy
    /// `pred`, consuming buffered events first.
    ///
    /// # Errors
    /// Transport failures and deadline expiry.
    pub async fn wait_event<F>(
        &mut self,
        method: &str,
        mut pred: F,
        cx: &FetchContext,
    ) -> Result<Value, VolareError>
    where
        F: FnMut(&Value) -> bool,
    {
        let mut i = 0;
        while i < self.events.len() {
            let matches = self.events[i].get("method").and_then(Value::as_str) == Some(method)
                && pred(&self.events[i]["params"]);
            if matches {
                return Ok(self.events.remove(i).map(|m| m["params"].clone()).unwrap_or(Value::Null));
            }
            i += 1;
        }
        loop {
            let msg = self.next_message(cx).await?;
            if msg.get("method").and_then(Value::as_str) == Some(method) && pred(&msg["params"]) {
                return Ok(msg["params"].clone());
            }
            if msg.get("method").is_some() {
                self.events.push_back(msg);
            }
        }
    }

    async fn next_message(&mut self, cx: &FetchContext) -> Result<Value, VolareError> {
        loop {
            let frame = cx
                .io(self.ws.next(), VolareError::source_timeout(NAME))
                .await?
                .ok_or_else(|| VolareError::transient(NAME, "devtools ws closed"))?
                .map_err(|e| VolareError::transient(NAME, format!("ws read: {e}")))?;
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(&text).map_err(|e| {
                        VolareError::parse_unusable(NAME, format!("devtools frame: {e}"))
                    });
                }
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
                Message::Close(_) => {
                    return Err(VolareError::transient(NAME, "devtools ws closed"));
                }
            }
        }
    }

    /// Close the websocket; the tab itself is left to the browser pool.
    pub async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
