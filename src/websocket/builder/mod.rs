mod certificate;
mod identity;
mod protocol;

use std::convert::TryFrom;

use native_tls::{TlsConnector, TlsConnectorBuilder};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, warn};
use url::Url;

use super::failure::FailureTable;
use super::scheme::Scheme;
use super::socket::SocketWebSocket;
use crate::error::WebSocketError;
pub use certificate::Certificate;
pub use identity::Identity;
pub use protocol::Protocol;

/// A builder used to customize the connection and its handshake.
/// ```no_run
/// # use websockets_core::{SocketWebSocket, WebSocket, WebSocketError};
/// # #[tokio::main]
/// # async fn main() -> Result<(), WebSocketError> {
/// let ws = SocketWebSocket::builder()
///     .handshake_add_subprotocol("wamp")
///     .connect("wss://echo.websocket.org")
///     .await?;
/// println!("negotiated {:?}", ws.protocol());
/// # Ok(())
/// # }
/// ```
#[allow(missing_debug_implementations)]
pub struct WebSocketBuilder {
    tls_builder: TlsConnectorBuilder,
    additional_handshake_headers: Vec<(String, String)>,
    subprotocols: Vec<String>,
    tcp_nodelay: bool,
    failures: FailureTable,
}

impl WebSocketBuilder {
    pub(crate) fn new() -> Self {
        Self {
            tls_builder: TlsConnector::builder(),
            additional_handshake_headers: Vec::new(),
            subprotocols: Vec::new(),
            tcp_nodelay: false,
            failures: FailureTable::default(),
        }
    }

    /// Adds a header to be sent in the WebSocket handshake.
    pub fn handshake_add_header(&mut self, header_name: &str, header_value: &str) -> &mut Self {
        // https://tools.ietf.org/html/rfc6455#section-4.2.2
        self.additional_handshake_headers
            .push((header_name.into(), header_value.into()));
        self
    }

    /// Removes a header which would be sent in the WebSocket handshake.
    pub fn handshake_remove_header(&mut self, header_name: &str) -> &mut Self {
        self.additional_handshake_headers
            .retain(|header| header.0 != header_name);
        self
    }

    /// Adds a subprotocol to the list of subprotocols to be sent in the
    /// WebSocket handshake. The server may select a subprotocol from this list.
    /// If it does, the selected subprotocol can be found using
    /// [`WebSocket::protocol()`](crate::WebSocket::protocol()).
    pub fn handshake_add_subprotocol(&mut self, subprotocol: &str) -> &mut Self {
        // https://tools.ietf.org/html/rfc6455#section-1.9
        self.subprotocols.push(subprotocol.into());
        self
    }

    /// Removes a subprotocol from the list of subprotocols that would be sent
    /// in the WebSocket handshake.
    pub fn handshake_remove_subprotocol(&mut self, subprotocol: &str) -> &mut Self {
        self.subprotocols.retain(|s| s != subprotocol);
        self
    }

    /// Sets the identity to be used for client certificate authentication.
    pub fn tls_identity(&mut self, identity: Identity) -> &mut Self {
        self.tls_builder.identity(identity.into());
        self
    }

    /// Sets the minimum supported TLS protocol version.
    /// A value of None enables support for the oldest protocols supported by the implementation.
    pub fn tls_min_protocol_version(&mut self, protocol: Option<Protocol>) -> &mut Self {
        self.tls_builder
            .min_protocol_version(protocol.map(|p| p.into()));
        self
    }

    /// Sets the maximum supported TLS protocol version.
    /// A value of None enables support for the newest protocols supported by the implementation.
    pub fn tls_max_protocol_version(&mut self, protocol: Option<Protocol>) -> &mut Self {
        self.tls_builder
            .max_protocol_version(protocol.map(|p| p.into()));
        self
    }

    /// Adds a certificate to the set of roots that the connector will trust.
    /// The system's trust roots are used as well.
    pub fn tls_add_root_certificate(&mut self, cert: Certificate) -> &mut Self {
        self.tls_builder.add_root_certificate(cert.into());
        self
    }

    /// Controls the use of certificate validation. Defaults to false.
    pub fn tls_danger_accept_invalid_certs(&mut self, accept_invalid_certs: bool) -> &mut Self {
        self.tls_builder
            .danger_accept_invalid_certs(accept_invalid_certs);
        self
    }

    /// Controls the use of Server Name Indication (SNI). Defaults to true.
    pub fn tls_use_sni(&mut self, use_sni: bool) -> &mut Self {
        self.tls_builder.use_sni(use_sni);
        self
    }

    /// Controls the use of hostname verification. Defaults to false.
    pub fn tls_danger_accept_invalid_hostnames(
        &mut self,
        accept_invalid_hostnames: bool,
    ) -> &mut Self {
        self.tls_builder
            .danger_accept_invalid_hostnames(accept_invalid_hostnames);
        self
    }

    /// Sets `TCP_NODELAY` on the underlying socket. Defaults to false.
    pub fn tcp_nodelay(&mut self, nodelay: bool) -> &mut Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Sets how transport failures are turned into close codes.
    /// Defaults to [`FailureTable::default()`].
    pub fn failure_table(&mut self, failures: FailureTable) -> &mut Self {
        self.failures = failures;
        self
    }

    /// Connects to a URL and performs the WebSocket handshake.
    ///
    /// Resolves once the server has accepted the handshake. The returned
    /// connection reports the subprotocol the server selected, if any.
    pub async fn connect(&mut self, url: &str) -> Result<SocketWebSocket, WebSocketError> {
        let parsed_url = Url::parse(url).map_err(WebSocketError::ParseError)?;
        let scheme = Scheme::try_from(parsed_url.scheme())?;
        let request = self.request(&parsed_url)?;
        let connector = match scheme {
            // https://tools.ietf.org/html/rfc6455#section-11.1.1
            Scheme::Plain => None,
            // https://tools.ietf.org/html/rfc6455#section-11.1.2
            Scheme::Secure => Some(Connector::NativeTls(
                self.tls_builder
                    .build()
                    .map_err(WebSocketError::TlsConfigError)?,
            )),
        };

        let (stream, response) =
            connect_async_tls_with_config(request, None, self.tcp_nodelay, connector)
                .await
                .map_err(|e| {
                    warn!(url = %parsed_url, error = %e, "websocket connection failed");
                    WebSocketError::ConnectionError {
                        message: format!("could not connect to {}", parsed_url),
                        source: e,
                    }
                })?;

        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        debug!(url = %parsed_url, ?scheme, protocol = %protocol, "websocket connected");
        Ok(SocketWebSocket::from_stream(
            stream,
            protocol,
            self.failures.clone(),
        ))
    }

    fn request(&self, url: &Url) -> Result<Request, WebSocketError> {
        // https://tools.ietf.org/html/rfc6455#section-1.3
        let mut request = url.as_str().into_client_request().map_err(|e| {
            WebSocketError::ConnectionError {
                message: format!("could not build handshake request for {}", url),
                source: e,
            }
        })?;
        let headers = request.headers_mut();
        if !self.subprotocols.is_empty() {
            let value = HeaderValue::from_str(&self.subprotocols.join(", "))
                .map_err(|_e| WebSocketError::HeaderError)?;
            headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
        for (field, value) in &self.additional_handshake_headers {
            let name =
                HeaderName::from_bytes(field.as_bytes()).map_err(|_e| WebSocketError::HeaderError)?;
            let value = HeaderValue::from_str(value).map_err(|_e| WebSocketError::HeaderError)?;
            headers.append(name, value);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
    use url::Url;

    use super::WebSocketBuilder;
    use crate::WebSocketError;

    #[test]
    fn request_carries_headers_and_subprotocols() {
        let mut builder = WebSocketBuilder::new();
        builder
            .handshake_add_header("Authorization", "Bearer abc")
            .handshake_add_header("X-Removed", "1")
            .handshake_remove_header("X-Removed")
            .handshake_add_subprotocol("graphql-ws")
            .handshake_add_subprotocol("wamp")
            .handshake_add_subprotocol("gone")
            .handshake_remove_subprotocol("gone");

        let url = Url::parse("ws://localhost:9001/socket").unwrap();
        let request = builder.request(&url).unwrap();
        let headers = request.headers();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc");
        assert!(headers.get("x-removed").is_none());
        assert_eq!(headers.get(SEC_WEBSOCKET_PROTOCOL).unwrap(), "graphql-ws, wamp");
        assert_eq!(request.uri().path(), "/socket");
    }

    #[test]
    fn invalid_header_is_rejected() {
        let mut builder = WebSocketBuilder::new();
        builder.handshake_add_header("bad header", "value");
        let url = Url::parse("ws://localhost:9001").unwrap();
        match builder.request(&url) {
            Err(WebSocketError::HeaderError) => (),
            other => panic!("expected header error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn bad_scheme() {
        let resp = WebSocketBuilder::new().connect("http://echo.websocket.org").await;
        match resp {
            Err(WebSocketError::SchemeError) => (),
            other => panic!("expected scheme error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn bad_url() {
        let resp = WebSocketBuilder::new().connect("not a url").await;
        assert!(matches!(resp, Err(WebSocketError::ParseError(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let resp = WebSocketBuilder::new()
            .connect(&format!("ws://{}", addr))
            .await;
        match resp {
            Err(e @ WebSocketError::ConnectionError { .. }) => {
                assert!(e.to_string().starts_with("could not connect to ws://127.0.0.1"));
            }
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }
}
