use thiserror::Error;

/// Errors from the per-user record cipher.
///
/// Variants carry no payload beyond the failure class: error values must
/// never embed plaintext, ciphertext, or key material.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed")]
    Encryption,

    #[error("ciphertext is not valid base64")]
    InvalidEncoding,

    #[error("ciphertext too short to contain a nonce")]
    CiphertextTooShort,

    #[error("decryption failed (wrong key or tampered data)")]
    Decryption,

    #[error("decrypted bytes are not valid UTF-8")]
    InvalidUtf8,
}

/// Errors from chat store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query error: {0}")]
    Query(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Errors from the streaming chat transport.
///
/// These surface to subscribers only through `StreamState.error`; the
/// coordinator never lets them escape a `send_message` call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection dropped mid-stream.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status before streaming began.
    #[error("chat backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The backend reported a failure in-band over the event stream.
    #[error("{0}")]
    Server(String),

    /// The response body could not be read or framed as server-sent events.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Errors surfaced synchronously by the chat coordinator.
///
/// Everything else that can go wrong during a send is contained into the
/// affected stream's `error` field instead of being returned.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("user id is not set; call set_user_id before sending")]
    UserNotSet,
}
