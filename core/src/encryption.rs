/*
 *   Copyright (c) 2024-2025 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! Command encryption envelope (spec.md §4.H): `X25519` key agreement plus
//! `XChaCha20-Poly1305` AEAD, with the public key encoded as
//! `protocol-version:base85-body`.
//!
//! The spec only requires a deterministic envelope-shape round-trip and
//! that `version` survives intact; the concrete algorithm choice here is
//! enrichment (see `DESIGN.md`), not dictated by the teacher.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::RcError;
use crate::rc_framing::RcCommand;

pub const PROTOCOL_VERSION: u32 = 1;
const NONCE_LEN: usize = 24;

/// A parsed `protocol-version:base85-body` public key.
#[derive(Debug, Clone)]
pub struct EncodedPublicKey {
    pub protocol_version: u32,
    pub key: PublicKey,
}

impl EncodedPublicKey {
    pub fn parse(encoded: &str) -> Result<EncodedPublicKey, RcError> {
        let (version_str, body) = encoded
            .split_once(':')
            .ok_or_else(|| RcError::Encryption(format!("malformed pubkey {encoded:?}")))?;
        let protocol_version: u32 = version_str
            .parse()
            .map_err(|_| RcError::Encryption(format!("bad pubkey version {version_str:?}")))?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(RcError::Encryption(format!(
                "unsupported encryption protocol version {protocol_version}"
            )));
        }
        let bytes = base85::decode(body)
            .map_err(|e| RcError::Encryption(format!("bad base85 pubkey body: {e}")))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RcError::Encryption("pubkey is not 32 bytes".to_string()))?;
        Ok(EncodedPublicKey {
            protocol_version,
            key: PublicKey::from(array),
        })
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}:{}",
            self.protocol_version,
            base85::encode(self.key.as_bytes())
        )
    }
}

/// The encrypted envelope carried as the DCS body in place of the plain
/// command JSON, per spec.md §4.H step 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub enc_version: u32,
    pub iv: String,
    pub tag: String,
    pub ciphertext: String,
    pub pubkey_used: String,
}

/// Encrypts `command` plus `password` for `pubkey`, returning the envelope.
/// An ephemeral X25519 keypair is generated per call; `pubkey_used` records
/// the host's public key so it can recover the shared secret.
pub fn encrypt_command(
    command: &RcCommand,
    password: &str,
    pubkey: &EncodedPublicKey,
) -> Result<Envelope, RcError> {
    let mut plaintext = match command.payload_with_password(password)? {
        Value::Object(map) => serde_json::to_vec(&map),
        other => serde_json::to_vec(&other),
    }
    .map_err(RcError::from)?;

    let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    let shared_secret = ephemeral_secret.diffie_hellman(&pubkey.key);

    let cipher = XChaCha20Poly1305::new_from_slice(shared_secret.as_bytes())
        .map_err(|e| RcError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|e| RcError::Encryption(e.to_string()))?;
    plaintext.zeroize_best_effort();

    // XChaCha20-Poly1305's `encrypt` appends the 16-byte tag; split it back
    // out so the envelope matches the spec's separate `tag` field.
    let tag_start = ciphertext.len().saturating_sub(16);
    let (body, tag) = ciphertext.split_at(tag_start);

    Ok(Envelope {
        enc_version: PROTOCOL_VERSION,
        iv: base85::encode(&nonce_bytes),
        tag: base85::encode(tag),
        ciphertext: base85::encode(body),
        pubkey_used: EncodedPublicKey {
            protocol_version: PROTOCOL_VERSION,
            key: ephemeral_public,
        }
        .encode(),
    })
}

/// Decrypts an envelope given the host's static secret key, returning the
/// command JSON plus password that were encrypted.
pub fn decrypt_envelope(
    envelope: &Envelope,
    host_secret: &StaticSecret,
) -> Result<Value, RcError> {
    if envelope.enc_version != PROTOCOL_VERSION {
        return Err(RcError::Encryption(format!(
            "unsupported envelope version {}",
            envelope.enc_version
        )));
    }
    let sender_pubkey = EncodedPublicKey::parse(&envelope.pubkey_used)?;
    let shared_secret = host_secret.diffie_hellman(&sender_pubkey.key);
    let cipher = XChaCha20Poly1305::new_from_slice(shared_secret.as_bytes())
        .map_err(|e| RcError::Encryption(e.to_string()))?;

    let nonce_bytes = base85::decode(&envelope.iv)
        .map_err(|e| RcError::Encryption(format!("bad iv: {e}")))?;
    let nonce = XNonce::from_slice(&nonce_bytes);

    let mut combined =
        base85::decode(&envelope.ciphertext).map_err(|e| RcError::Encryption(e.to_string()))?;
    combined.extend(base85::decode(&envelope.tag).map_err(|e| RcError::Encryption(e.to_string()))?);

    let plaintext = cipher
        .decrypt(nonce, combined.as_slice())
        .map_err(|_| RcError::Encryption("authentication failed".to_string()))?;

    serde_json::from_slice(&plaintext).map_err(RcError::from)
}

impl RcCommand {
    fn payload_with_password(&self, password: &str) -> Result<Value, RcError> {
        let mut envelope_body = serde_json::json!({
            "cmd": self.cmd_name,
            "version": [self.version.0, self.version.1, self.version.2],
            "payload": self.payload,
            "password": password,
        });
        if self.flags.no_response {
            envelope_body["no_response"] = Value::Bool(true);
        }
        if self.flags.stream {
            envelope_body["stream"] = Value::Bool(true);
        }
        Ok(envelope_body)
    }
}

/// Best-effort zeroing; avoids leaving plaintext password material behind
/// in a buffer we are about to drop.
trait ZeroizeBestEffort {
    fn zeroize_best_effort(&mut self);
}
impl ZeroizeBestEffort for Vec<u8> {
    fn zeroize_best_effort(&mut self) {
        for byte in self.iter_mut() {
            *byte = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_round_trips_through_encode_parse() {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        let encoded = EncodedPublicKey {
            protocol_version: PROTOCOL_VERSION,
            key: public,
        };
        let wire = encoded.encode();
        let parsed = EncodedPublicKey::parse(&wire).unwrap();
        assert_eq!(parsed.key.as_bytes(), public.as_bytes());
    }

    #[test]
    fn rejects_version_mismatch() {
        let bad = format!("{}:{}", PROTOCOL_VERSION + 1, base85::encode(&[0u8; 32]));
        assert!(EncodedPublicKey::parse(&bad).is_err());
    }

    #[test]
    fn rejects_malformed_pubkey_without_separator() {
        assert!(EncodedPublicKey::parse("not-a-valid-key").is_err());
    }

    #[test]
    fn envelope_round_trips_command_and_password() {
        let host_secret = StaticSecret::random_from_rng(OsRng);
        let host_public = PublicKey::from(&host_secret);
        let host_pubkey = EncodedPublicKey {
            protocol_version: PROTOCOL_VERSION,
            key: host_public,
        };

        let command = RcCommand::new("ls", (0, 26, 0), serde_json::json!({"path": "/"}));
        let envelope = encrypt_command(&command, "hunter2", &host_pubkey).unwrap();
        assert_eq!(envelope.enc_version, PROTOCOL_VERSION);

        let decrypted = decrypt_envelope(&envelope, &host_secret).unwrap();
        assert_eq!(decrypted["cmd"], "ls");
        assert_eq!(decrypted["password"], "hunter2");
        assert_eq!(decrypted["version"], serde_json::json!([0, 26, 0]));
    }

    #[test]
    fn decrypting_with_the_wrong_key_fails() {
        let host_secret = StaticSecret::random_from_rng(OsRng);
        let host_public = PublicKey::from(&host_secret);
        let host_pubkey = EncodedPublicKey {
            protocol_version: PROTOCOL_VERSION,
            key: host_public,
        };
        let command = RcCommand::new("ls", (0, 26, 0), serde_json::json!({}));
        let envelope = encrypt_command(&command, "hunter2", &host_pubkey).unwrap();

        let wrong_secret = StaticSecret::random_from_rng(OsRng);
        assert!(decrypt_envelope(&envelope, &wrong_secret).is_err());
    }
}
