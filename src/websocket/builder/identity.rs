use std::fmt::{Debug, Error as FmtError, Formatter};

use native_tls::Identity as NativeTlsIdentity;

use crate::error::WebSocketError;

/// A cryptographic identity used for client certificate authentication.
///
/// An identity is an X509 certificate along with its corresponding private key and chain of certificates to a trusted
/// root.
#[derive(Clone)]
pub struct Identity(NativeTlsIdentity);

impl Identity {
    /// Parses a DER-formatted PKCS #12 archive, using the specified password to decrypt the key.
    ///
    /// PKCS #12 archives typically have the file extension `.p12` or `.pfx`, and can be created
    /// with the OpenSSL `pkcs12` tool:
    ///
    /// ```bash
    /// openssl pkcs12 -export -out identity.pfx -inkey key.pem -in cert.pem -certfile chain_certs.pem
    /// ```
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self, WebSocketError> {
        Ok(Self(
            NativeTlsIdentity::from_pkcs12(der, password)
                .map_err(WebSocketError::IdentityParseError)?,
        ))
    }
}

impl From<Identity> for NativeTlsIdentity {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl Debug for Identity {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        f.write_str("Identity")
    }
}
