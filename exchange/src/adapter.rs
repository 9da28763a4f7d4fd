pub mod bridge;

use crate::{Bar, RateRequest};

use std::future::Future;

#[derive(thiserror::Error, Debug, Clone)]
pub enum AdapterError {
    #[error("Stream: {0}")]
    WebsocketError(String),
    #[error("Parsing: {0}")]
    ParseError(String),
    #[error("Upstream: {0}")]
    Upstream(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AdapterError {
    pub fn to_user_message(&self) -> &'static str {
        match self {
            AdapterError::InvalidRequest(err) => {
                log::error!("Adapter invalid request: {err}");
                "Invalid request made to the rate bridge. Check logs for details."
            }
            AdapterError::WebsocketError(err) => {
                log::error!("Adapter websocket error: {err}");
                "Connection to the rate bridge failed. Retrying on the next tick."
            }
            AdapterError::ParseError(err) => {
                log::error!("Adapter parse error: {err}");
                "Unexpected response from the rate bridge. Check logs for details."
            }
            AdapterError::Upstream(err) => {
                log::error!("Rate bridge reported: {err}");
                "The terminal behind the rate bridge rejected the request."
            }
        }
    }
}

/// Anything that can deliver bars for a symbol and timeframe.
///
/// Errors are surfaced as-is; implementations do not retry and do not impose
/// timeouts of their own.
pub trait RateSource {
    fn fetch_rates(
        &self,
        request: &RateRequest,
    ) -> impl Future<Output = Result<Vec<Bar>, AdapterError>> + Send;
}
