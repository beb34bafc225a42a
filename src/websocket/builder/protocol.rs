use native_tls::Protocol as NativeTlsProtocol;

/// A TLS protocol version, used to bound the versions the connector accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// The SSL 3.0 protocol.
    ///
    /// # Warning
    ///
    /// SSL 3.0 has severe security flaws, and should not be used unless absolutely necessary. If
    /// you are not sure if you need to enable this protocol, you should not.
    Sslv3,
    /// The TLS 1.0 protocol.
    Tlsv10,
    /// The TLS 1.1 protocol.
    Tlsv11,
    /// The TLS 1.2 protocol.
    Tlsv12,
}

impl From<Protocol> for NativeTlsProtocol {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Sslv3 => NativeTlsProtocol::Sslv3,
            Protocol::Tlsv10 => NativeTlsProtocol::Tlsv10,
            Protocol::Tlsv11 => NativeTlsProtocol::Tlsv11,
            Protocol::Tlsv12 => NativeTlsProtocol::Tlsv12,
        }
    }
}
