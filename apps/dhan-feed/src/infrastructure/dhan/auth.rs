//! Dhan Feed Authentication
//!
//! Dhan accepts two ways of authenticating a live feed connection.
//!
//! # Authentication Flow
//!
//! ## Version 2 (token in URL)
//! 1. Connect to `{base}?version=2&token=...&clientId=...&authType=2`
//! 2. The connection is authenticated as soon as it opens
//!
//! ## Version 1 (binary handshake)
//! 1. Connect to the bare base URL
//! 2. Send a 585-byte binary frame before anything else
//! 3. No acknowledgement is sent back; the server disconnects with a
//!    reason code if the credentials are rejected
//!
//! # Handshake Frame (v1)
//!
//! | Offset | Width | Field                         |
//! |--------|-------|-------------------------------|
//! | 0      | 1     | request code `11`             |
//! | 1      | 2     | message length `585` (LE u16) |
//! | 3      | 30    | client id, zero padded        |
//! | 33     | 50    | reserved, zero                |
//! | 83     | 500   | access token, zero padded     |
//! | 583    | 2     | auth type `"2P"`              |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::wire::{WireError, WireWriter};

// =============================================================================
// Constants
// =============================================================================

/// Request code of the v1 authorization frame.
pub const AUTH_REQUEST_CODE: u8 = 11;

/// Width of the client id slot.
pub const CLIENT_ID_WIDTH: usize = 30;

/// Width of the reserved slot after the client id.
pub const RESERVED_WIDTH: usize = 50;

/// Width of the access token slot.
pub const ACCESS_TOKEN_WIDTH: usize = 500;

/// Auth type marker closing the frame.
pub const AUTH_TYPE: &[u8; 2] = b"2P";

/// Bytes before the token slot.
const FRAME_PREFIX_LEN: usize = 1 + 2 + CLIENT_ID_WIDTH + RESERVED_WIDTH;

/// Total length of the v1 authorization frame.
pub const AUTH_FRAME_LEN: usize = FRAME_PREFIX_LEN + ACCESS_TOKEN_WIDTH + AUTH_TYPE.len();

/// Message length field of the frame.
const AUTH_MESSAGE_LENGTH: u16 = 585;

const _: () = assert!(FRAME_PREFIX_LEN == 83);
const _: () = assert!(AUTH_MESSAGE_LENGTH as usize == AUTH_FRAME_LEN);

// =============================================================================
// Error Types
// =============================================================================

/// Credential problems detected before a connection is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A credential is empty.
    #[error("{field} cannot be empty")]
    EmptyCredential {
        /// Which credential.
        field: &'static str,
    },

    /// A credential does not fit its fixed-width slot.
    #[error("{field} is {actual} bytes, maximum is {max}")]
    CredentialTooLong {
        /// Which credential.
        field: &'static str,
        /// Slot width.
        max: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Protocol version text was not recognised.
    #[error("unknown feed protocol version: {0}")]
    UnknownVersion(String),

    /// The v2 query string could not be encoded.
    #[error("failed to encode feed URL: {0}")]
    UrlEncode(String),
}

// =============================================================================
// Protocol Version
// =============================================================================

/// Feed protocol version, which decides how credentials are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// Binary handshake frame after connecting.
    V1,
    /// Credentials in the connection URL.
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Version label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "v1" => Ok(Self::V1),
            "2" | "v2" => Ok(Self::V2),
            other => Err(AuthError::UnknownVersion(other.to_string())),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Dhan client id and access token.
///
/// `Debug` redacts the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    access_token: String,
}

impl Credentials {
    /// Create credentials.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmptyCredential` if either value is empty.
    pub fn new(
        client_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let client_id = client_id.into();
        let access_token = access_token.into();

        if client_id.is_empty() {
            return Err(AuthError::EmptyCredential { field: "client id" });
        }
        if access_token.is_empty() {
            return Err(AuthError::EmptyCredential {
                field: "access token",
            });
        }

        Ok(Self {
            client_id,
            access_token,
        })
    }

    /// Client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Check both values fit their frame slots.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CredentialTooLong` for the first value that does
    /// not fit.
    pub fn check_lengths(&self) -> Result<(), AuthError> {
        if self.client_id.len() > CLIENT_ID_WIDTH {
            return Err(AuthError::CredentialTooLong {
                field: "client id",
                max: CLIENT_ID_WIDTH,
                actual: self.client_id.len(),
            });
        }
        if self.access_token.len() > ACCESS_TOKEN_WIDTH {
            return Err(AuthError::CredentialTooLong {
                field: "access token",
                max: ACCESS_TOKEN_WIDTH,
                actual: self.access_token.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials(client_id={})", self.client_id)
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// Build the v1 authorization frame.
///
/// # Errors
///
/// Returns `AuthError::CredentialTooLong` if a value would need truncating.
pub fn build_auth_frame(credentials: &Credentials) -> Result<Vec<u8>, AuthError> {
    credentials.check_lengths()?;

    let too_long = |field: &'static str, max: usize, actual: usize| {
        move |_: WireError| AuthError::CredentialTooLong { field, max, actual }
    };

    let client_id = credentials.client_id.as_bytes();
    let access_token = credentials.access_token.as_bytes();

    let mut writer = WireWriter::with_capacity(AUTH_FRAME_LEN);
    writer.put_u8(AUTH_REQUEST_CODE).put_u16(AUTH_MESSAGE_LENGTH);
    writer
        .put_padded(client_id, CLIENT_ID_WIDTH)
        .map_err(too_long("client id", CLIENT_ID_WIDTH, client_id.len()))?;
    writer.put_zeros(RESERVED_WIDTH);
    writer
        .put_padded(access_token, ACCESS_TOKEN_WIDTH)
        .map_err(too_long("access token", ACCESS_TOKEN_WIDTH, access_token.len()))?;
    writer.put_bytes(AUTH_TYPE);

    Ok(writer.into_bytes())
}

/// Connection URL for a protocol version.
///
/// Query values are percent-encoded, so credentials may contain any
/// characters.
///
/// # Errors
///
/// Returns `AuthError::UrlEncode` if the query cannot be serialized.
pub fn feed_url(
    base: &str,
    version: ProtocolVersion,
    credentials: &Credentials,
) -> Result<String, AuthError> {
    match version {
        ProtocolVersion::V1 => Ok(base.to_string()),
        ProtocolVersion::V2 => {
            let query = serde_urlencoded::to_string([
                ("version", "2"),
                ("token", credentials.access_token.as_str()),
                ("clientId", credentials.client_id.as_str()),
                ("authType", "2"),
            ])
            .map_err(|e| AuthError::UrlEncode(e.to_string()))?;
            Ok(format!("{base}?{query}"))
        }
    }
}

/// Everything needed to authenticate one connection, prepared before the
/// socket is opened.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHandshake {
    version: ProtocolVersion,
    url: String,
    frame: Option<Vec<u8>>,
}

impl AuthHandshake {
    /// Prepare the URL and, for v1, the authorization frame.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CredentialTooLong` if a credential does not fit
    /// its slot. Nothing has touched the network at that point.
    pub fn prepare(
        base_url: &str,
        version: ProtocolVersion,
        credentials: &Credentials,
    ) -> Result<Self, AuthError> {
        credentials.check_lengths()?;

        let frame = match version {
            ProtocolVersion::V1 => Some(build_auth_frame(credentials)?),
            ProtocolVersion::V2 => None,
        };

        Ok(Self {
            version,
            url: feed_url(base_url, version, credentials)?,
            frame,
        })
    }

    /// Protocol version.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// URL to connect to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Frame to send right after the socket opens, if any.
    #[must_use]
    pub fn frame(&self) -> Option<&[u8]> {
        self.frame.as_deref()
    }
}

impl fmt::Debug for AuthHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHandshake")
            .field("version", &self.version)
            .field("url", &"[REDACTED]")
            .field("frame_len", &self.frame.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("100042", "eyJhbGciOiJI").unwrap()
    }

    #[test]
    fn v1_frame_layout() {
        let frame = build_auth_frame(&creds()).unwrap();
        assert_eq!(frame.len(), 585);
        assert_eq!(frame[0], 11);
        assert_eq!(u16::from_le_bytes([frame[1], frame[2]]), 585);
        assert_eq!(&frame[3..9], b"100042");
        assert!(frame[9..33].iter().all(|b| *b == 0));
        assert!(frame[33..83].iter().all(|b| *b == 0));
        assert_eq!(&frame[83..95], b"eyJhbGciOiJI");
        assert!(frame[95..583].iter().all(|b| *b == 0));
        assert_eq!(&frame[583..], b"2P");
    }

    #[test]
    fn full_width_credentials_fit() {
        let credentials = Credentials::new("c".repeat(30), "t".repeat(500)).unwrap();
        let frame = build_auth_frame(&credentials).unwrap();
        assert_eq!(frame.len(), AUTH_FRAME_LEN);
        assert_eq!(frame[32], b'c');
        assert_eq!(frame[582], b't');
    }

    #[test]
    fn long_client_id_is_rejected() {
        let credentials = Credentials::new("c".repeat(31), "token").unwrap();
        assert_eq!(
            build_auth_frame(&credentials),
            Err(AuthError::CredentialTooLong {
                field: "client id",
                max: 30,
                actual: 31
            })
        );
    }

    #[test]
    fn long_token_is_rejected() {
        let credentials = Credentials::new("client", "t".repeat(501)).unwrap();
        assert!(matches!(
            AuthHandshake::prepare("wss://feed", ProtocolVersion::V2, &credentials),
            Err(AuthError::CredentialTooLong {
                field: "access token",
                max: 500,
                ..
            })
        ));
    }

    #[test]
    fn empty_credentials_are_rejected() {
        assert_eq!(
            Credentials::new("", "token"),
            Err(AuthError::EmptyCredential { field: "client id" })
        );
        assert_eq!(
            Credentials::new("client", ""),
            Err(AuthError::EmptyCredential {
                field: "access token"
            })
        );
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", creds());
        assert!(debug.contains("100042"));
        assert!(!debug.contains("eyJhbGciOiJI"));

        let handshake =
            AuthHandshake::prepare("wss://api-feed.dhan.co", ProtocolVersion::V2, &creds())
                .unwrap();
        assert!(!format!("{handshake:?}").contains("eyJhbGciOiJI"));
    }

    #[test]
    fn v2_url_carries_credentials() {
        let handshake =
            AuthHandshake::prepare("wss://api-feed.dhan.co", ProtocolVersion::V2, &creds())
                .unwrap();
        assert_eq!(
            handshake.url(),
            "wss://api-feed.dhan.co?version=2&token=eyJhbGciOiJI&clientId=100042&authType=2"
        );
        assert!(handshake.frame().is_none());
    }

    #[test]
    fn v2_url_escapes_reserved_characters() {
        let credentials = Credentials::new("id 7", "a&b=c#d+e/f").unwrap();
        let url = feed_url("wss://api-feed.dhan.co", ProtocolVersion::V2, &credentials).unwrap();
        assert_eq!(
            url,
            "wss://api-feed.dhan.co?version=2&token=a%26b%3Dc%23d%2Be%2Ff&clientId=id+7&authType=2"
        );
    }

    #[test]
    fn v1_uses_bare_url_and_frame() {
        let handshake =
            AuthHandshake::prepare("wss://api-feed.dhan.co", ProtocolVersion::V1, &creds())
                .unwrap();
        assert_eq!(handshake.url(), "wss://api-feed.dhan.co");
        assert_eq!(handshake.frame().map(<[u8]>::len), Some(585));
        assert_eq!(handshake.version(), ProtocolVersion::V1);
    }

    #[test]
    fn version_parsing() {
        assert_eq!("v1".parse::<ProtocolVersion>(), Ok(ProtocolVersion::V1));
        assert_eq!("2".parse::<ProtocolVersion>(), Ok(ProtocolVersion::V2));
        assert!("v3".parse::<ProtocolVersion>().is_err());
    }
}
