//! Command framing, encryption and text encoding
//!
//! A command `(key, value)` crosses the wire as:
//!
//! 1. plaintext `"<key>: <value>+"`, or `"<key>+"` when the value is empty
//! 2. AES-128-CBC/PKCS#7 ciphertext of that plaintext
//! 3. base64 of the ciphertext
//! 4. lowercase hex of the base64 text's bytes
//!
//! so the command characteristic only ever carries printable ASCII.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::cipher::CipherContext;
use crate::error::{MirrorError, Result};
use crate::protocol::{COMMAND_TERMINATOR, KEY_VALUE_SEPARATOR};

// ----------------------------------------------------------------------------
// Command
// ----------------------------------------------------------------------------

/// A logical command sent to the mirror
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    pub key: String,
    /// May be empty, in which case only the key is sent
    pub value: String,
}

impl Command {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Command consisting of a bare key
    pub fn bare(key: impl Into<String>) -> Self {
        Self::new(key, String::new())
    }

    /// Parse a `"<key>: <value>"` or `"<key>"` line
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match line.split_once(KEY_VALUE_SEPARATOR.trim_end()) {
            Some((key, value)) if !key.trim().is_empty() => {
                Some(Self::new(key.trim(), value.trim()))
            }
            Some(_) => None,
            None => Some(Self::bare(line)),
        }
    }

    /// Plaintext including the terminator
    pub fn plaintext(&self) -> String {
        let mut text = if self.value.is_empty() {
            self.key.clone()
        } else {
            format!("{}{}{}", self.key, KEY_VALUE_SEPARATOR, self.value)
        };
        text.push(COMMAND_TERMINATOR);
        text
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}{}{}", self.key, KEY_VALUE_SEPARATOR, self.value)
        }
    }
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Turns commands into wire payloads and back
#[derive(Debug, Clone, Default)]
pub struct CommandCodec {
    cipher: CipherContext,
}

impl CommandCodec {
    pub fn new(cipher: CipherContext) -> Self {
        Self { cipher }
    }

    /// Encode a command into the ASCII payload written to the characteristic
    pub fn encode(&self, command: &Command) -> Vec<u8> {
        let ciphertext = self.cipher.encrypt(command.plaintext().as_bytes());
        let text = STANDARD.encode(ciphertext);
        hex::encode(text.as_bytes()).into_bytes()
    }

    /// Decode a wire payload back into its plaintext, terminator included
    pub fn decode(&self, payload: &[u8]) -> Result<String> {
        let text = hex::decode(payload)
            .map_err(|e| MirrorError::InvalidPayload(format!("hex: {}", e)))?;
        let ciphertext = STANDARD
            .decode(&text)
            .map_err(|e| MirrorError::InvalidPayload(format!("base64: {}", e)))?;
        let plaintext = self.cipher.decrypt(&ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| MirrorError::InvalidPayload(format!("utf-8: {}", e)))
    }

    /// Decode a payload and split it back into a command
    pub fn decode_command(&self, payload: &[u8]) -> Result<Command> {
        let plaintext = self.decode(payload)?;
        let body = plaintext.strip_suffix(COMMAND_TERMINATOR).ok_or_else(|| {
            MirrorError::InvalidPayload("missing command terminator".to_string())
        })?;
        Ok(match body.split_once(KEY_VALUE_SEPARATOR) {
            Some((key, value)) => Command::new(key, value),
            None => Command::bare(body),
        })
    }
}
