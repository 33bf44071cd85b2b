//! HTTP upgrade negotiation.
//!
//! Takes the raw bytes of a client's upgrade request and produces the fixed
//! `101 Switching Protocols` response. Only the nonce header is required;
//! version and sub-protocol headers are not inspected.

use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

/// Header carrying the client nonce.
pub const NONCE_HEADER: &str = "sec-websocket-key";

/// Why an upgrade request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("request is not valid UTF-8")]
    NotUtf8,

    #[error("request does not ask for a websocket upgrade")]
    NotUpgrade,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

/// Compute the `Sec-WebSocket-Accept` value for a client nonce.
pub fn accept_token(nonce: &str) -> String {
    derive_accept_key(nonce.trim().as_bytes())
}

/// Validate an upgrade request and build the response bytes.
pub fn negotiate(request: &[u8]) -> Result<Vec<u8>, HandshakeError> {
    let text = std::str::from_utf8(request).map_err(|_| HandshakeError::NotUtf8)?;

    let mut upgrade = false;
    let mut nonce = None;
    for line in text.split("\r\n").skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("upgrade") {
            upgrade |= value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("websocket"));
        } else if name.eq_ignore_ascii_case(NONCE_HEADER) {
            let value = value.trim();
            if !value.is_empty() {
                nonce = Some(value);
            }
        }
    }

    if !upgrade {
        return Err(HandshakeError::NotUpgrade);
    }
    let nonce = nonce.ok_or(HandshakeError::MissingKey)?;

    Ok(format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_token(nonce)
    )
    .into_bytes())
}
