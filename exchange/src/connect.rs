use crate::adapter::AdapterError;
use bytes::Bytes;
use fastwebsockets::FragmentCollector;
use http_body_util::Empty;
use hyper::{
    Request, Uri,
    header::{CONNECTION, UPGRADE},
    upgrade::Upgraded,
};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, OwnedTrustAnchor},
};

pub type WsStream = FragmentCollector<TokioIo<Upgraded>>;

/// A parsed `ws://` or `wss://` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub url: String,
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, AdapterError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| AdapterError::InvalidRequest(format!("{url}: {e}")))?;

        let secure = match uri.scheme_str() {
            Some("ws") => false,
            Some("wss") => true,
            other => {
                return Err(AdapterError::InvalidRequest(format!(
                    "unsupported scheme {other:?} in {url}"
                )));
            }
        };

        let host = uri
            .host()
            .ok_or_else(|| AdapterError::InvalidRequest(format!("missing host in {url}")))?
            .to_string();
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

        Ok(Self {
            host,
            port,
            secure,
            url: url.to_string(),
        })
    }

    fn host_header(&self) -> String {
        match (self.secure, self.port) {
            (false, 80) | (true, 443) => self.host.clone(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

pub async fn connect_ws(endpoint: &Endpoint) -> Result<WsStream, AdapterError> {
    let tcp_stream = setup_tcp(endpoint).await?;

    if endpoint.secure {
        let tls_stream = upgrade_to_tls(&endpoint.host, tcp_stream).await?;
        upgrade_to_websocket(endpoint, tls_stream).await
    } else {
        upgrade_to_websocket(endpoint, tcp_stream).await
    }
}

struct SpawnExecutor;

impl<Fut> hyper::rt::Executor<Fut> for SpawnExecutor
where
    Fut: std::future::Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    fn execute(&self, fut: Fut) {
        tokio::task::spawn(fut);
    }
}

async fn setup_tcp(endpoint: &Endpoint) -> Result<TcpStream, AdapterError> {
    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| AdapterError::WebsocketError(format!("{addr}: {e}")))?;

    stream
        .set_nodelay(true)
        .map_err(|e| AdapterError::WebsocketError(e.to_string()))?;

    // the bridge usually sits on another machine on the LAN
    let sock_ref = socket2::SockRef::from(&stream);
    let ka = socket2::TcpKeepalive::new()
        .with_time(std::time::Duration::from_secs(20))
        .with_interval(std::time::Duration::from_secs(20));

    if let Err(e) = sock_ref.set_tcp_keepalive(&ka) {
        log::warn!("Failed to set keepalive: {}", e);
    }

    Ok(stream)
}

fn tls_connector() -> TlsConnector {
    let mut root_store = tokio_rustls::rustls::RootCertStore::empty();

    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(std::sync::Arc::new(config))
}

async fn upgrade_to_tls(
    domain: &str,
    tcp_stream: TcpStream,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, AdapterError> {
    let domain: tokio_rustls::rustls::ServerName =
        tokio_rustls::rustls::ServerName::try_from(domain)
            .map_err(|_| AdapterError::ParseError("invalid dnsname".to_string()))?;

    tls_connector()
        .connect(domain, tcp_stream)
        .await
        .map_err(|e| AdapterError::WebsocketError(e.to_string()))
}

async fn upgrade_to_websocket<S>(endpoint: &Endpoint, stream: S) -> Result<WsStream, AdapterError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let req: Request<Empty<Bytes>> = Request::builder()
        .method("GET")
        .uri(endpoint.url.as_str())
        .header("Host", endpoint.host_header())
        .header(UPGRADE, "websocket")
        .header(CONNECTION, "upgrade")
        .header(
            "Sec-WebSocket-Key",
            fastwebsockets::handshake::generate_key(),
        )
        .header("Sec-WebSocket-Version", "13")
        .body(Empty::<Bytes>::new())
        .map_err(|e| AdapterError::WebsocketError(e.to_string()))?;

    let (ws, _) = fastwebsockets::handshake::client(&SpawnExecutor, req, stream)
        .await
        .map_err(|e| AdapterError::WebsocketError(e.to_string()))?;

    Ok(FragmentCollector::new(ws))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_bridge_address() {
        let ep = Endpoint::parse("ws://192.168.1.39:8765").unwrap();
        assert_eq!(ep.host, "192.168.1.39");
        assert_eq!(ep.port, 8765);
        assert!(!ep.secure);
        assert_eq!(ep.host_header(), "192.168.1.39:8765");
    }

    #[test]
    fn secure_defaults_to_443() {
        let ep = Endpoint::parse("wss://bridge.example.com/rates").unwrap();
        assert_eq!(ep.port, 443);
        assert!(ep.secure);
        assert_eq!(ep.host_header(), "bridge.example.com");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            Endpoint::parse("http://localhost:8765"),
            Err(AdapterError::InvalidRequest(_))
        ));
        assert!(Endpoint::parse("not a url").is_err());
    }
}
