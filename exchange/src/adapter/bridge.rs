//! Client for the MetaTrader WebSocket bridge.
//!
//! Every request opens a fresh connection, sends a single JSON text frame and
//! waits for a single JSON reply of the form
//! `{"type": "rates", "symbol": .., "timeframe": .., "data": [..]}` or
//! `{"error": ".."}`.

use super::{AdapterError, RateSource};
use crate::connect::{Endpoint, WsStream, connect_ws};
use crate::{Bar, RateRequest};

use fastwebsockets::{Frame, OpCode, Payload};
use serde::Deserialize;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8765";

#[derive(Debug, Clone)]
pub struct BridgeClient {
    endpoint: String,
}

impl Default for BridgeClient {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl BridgeClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn round_trip(&self, payload: &[u8]) -> Result<Vec<u8>, AdapterError> {
        let endpoint = Endpoint::parse(&self.endpoint)?;
        let mut ws = connect_ws(&endpoint).await?;

        ws.write_frame(Frame::text(Payload::Borrowed(payload)))
            .await
            .map_err(|e| AdapterError::WebsocketError(e.to_string()))?;

        let reply = read_reply(&mut ws).await;

        if let Err(e) = ws.write_frame(Frame::close(1000, &[])).await {
            log::debug!("Bridge close handshake failed: {e}");
        }

        reply
    }
}

async fn read_reply(ws: &mut WsStream) -> Result<Vec<u8>, AdapterError> {
    loop {
        let (opcode, body) = {
            let frame = ws
                .read_frame()
                .await
                .map_err(|e| AdapterError::WebsocketError(e.to_string()))?;
            (frame.opcode, frame.payload.to_vec())
        };

        match opcode {
            OpCode::Text | OpCode::Binary => return Ok(body),
            OpCode::Close => {
                return Err(AdapterError::WebsocketError(
                    "Connection closed before a reply arrived".to_string(),
                ));
            }
            _ => {}
        }
    }
}

impl RateSource for BridgeClient {
    async fn fetch_rates(&self, request: &RateRequest) -> Result<Vec<Bar>, AdapterError> {
        if request.symbol.is_empty() || request.count == 0 {
            return Err(AdapterError::InvalidRequest(format!("{request:?}")));
        }

        let payload = serde_json::to_vec(request)
            .map_err(|e| AdapterError::InvalidRequest(e.to_string()))?;

        log::debug!(
            "Requesting {} {} x{} from {}",
            request.symbol,
            request.timeframe,
            request.count,
            self.endpoint
        );

        let body = self.round_trip(&payload).await?;
        parse_reply(&body)
    }
}

#[derive(Deserialize)]
struct BridgeReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<Vec<Bar>>,
}

/// Decodes a bridge reply into time-ascending bars.
pub fn parse_reply(body: &[u8]) -> Result<Vec<Bar>, AdapterError> {
    let reply: BridgeReply = serde_json::from_slice(body)
        .map_err(|e| AdapterError::ParseError(format!("Invalid reply: {e}")))?;

    if let Some(err) = reply.error {
        return Err(AdapterError::Upstream(err));
    }

    let mut bars = reply
        .data
        .ok_or_else(|| AdapterError::ParseError("No 'data' field in reply".to_string()))?;

    bars.sort_by_key(|bar| bar.time);
    Ok(bars)
}
