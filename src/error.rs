use native_tls::Error as NativeTlsError;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as TransportError;
use url::ParseError;

/// Errors returned while configuring or establishing a connection.
///
/// Once a connection is established nothing it does returns an error: failures
/// are reported as an [`Event::Close`](crate::Event::Close) instead.
#[derive(Error, Debug)]
pub enum WebSocketError {
    // TLS configuration errors
    #[error("could not use given TLS configuration")]
    TlsConfigError(#[source] NativeTlsError),
    #[error("could not use certificate")]
    CertificateError(#[source] NativeTlsError),
    #[error("could not convert certficate to DER")]
    DerConversionError(#[source] NativeTlsError),
    #[error("could not parse PKCS #12 archive")]
    IdentityParseError(#[source] NativeTlsError),

    // handshake configuration errors
    #[error("invalid handshake header name or value")]
    HeaderError,

    // url errors
    #[error("url could not be parsed")]
    ParseError(#[source] ParseError),
    #[error(r#"invalid websocket scheme (use "ws" or "wss")"#)]
    SchemeError,

    // connection errors
    #[error("{message}: {source}")]
    ConnectionError {
        message: String,
        #[source]
        source: TransportError,
    },
}
