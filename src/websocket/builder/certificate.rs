use std::fmt::{Debug, Error as FmtError, Formatter};

use native_tls::Certificate as NativeTlsCertificate;

use crate::error::WebSocketError;

/// An X509 certificate, added to the trusted roots with
/// [`WebSocketBuilder::tls_add_root_certificate()`](super::WebSocketBuilder::tls_add_root_certificate()).
#[derive(Clone)]
pub struct Certificate(NativeTlsCertificate);

impl Certificate {
    /// Parses a DER-formatted X509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, WebSocketError> {
        Ok(Self(
            NativeTlsCertificate::from_der(der).map_err(WebSocketError::CertificateError)?,
        ))
    }

    /// Parses a PEM-formatted X509 certificate.
    pub fn from_pem(pem: &[u8]) -> Result<Self, WebSocketError> {
        Ok(Self(
            NativeTlsCertificate::from_pem(pem).map_err(WebSocketError::CertificateError)?,
        ))
    }

    /// Returns the DER-encoded representation of this certificate.
    pub fn to_der(&self) -> Result<Vec<u8>, WebSocketError> {
        self.0.to_der().map_err(WebSocketError::DerConversionError)
    }
}

impl From<Certificate> for NativeTlsCertificate {
    fn from(certificate: Certificate) -> Self {
        certificate.0
    }
}

impl Debug for Certificate {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.write_str("Certificate")
    }
}
