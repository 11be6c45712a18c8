//! Crypto boundary: X25519 ECDH key exchange binding a ChaCha20-Poly1305
//! AEAD session. The primitives themselves are
//! black-box operations the core never reimplements; this module only
//! binds them into the handshake/seal/open shape the core calls.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::CollabError;

/// One side of a handshake-then-AEAD-session exchange (§6.1:
/// `handshake_begin`, `handshake_step`, `seal`, `open`).
pub trait Crypto: Send {
    /// Generates this side's ephemeral keypair and returns the public key
    /// bytes to send to the peer.
    fn handshake_begin(&mut self) -> Vec<u8>;

    /// Consumes the peer's handshake bytes. For a one-round-trip ECDH
    /// handshake this always completes the session and returns an empty
    /// `bytes_out` with `done = true`; the shape stays generic to allow a
    /// multi-round protocol to swap in later without changing the trait.
    fn handshake_step(&mut self, peer_bytes: &[u8]) -> Result<(Vec<u8>, bool), CollabError>;

    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CollabError>;
    fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CollabError>;
}

enum State {
    Unstarted,
    AwaitingPeer(EphemeralSecret),
    Established {
        cipher: ChaCha20Poly1305,
        send_nonce: u64,
        recv_nonce_floor: u64,
    },
}

/// ECDH-over-X25519 handshake binding a ChaCha20-Poly1305 session. Outgoing
/// nonces are a monotonic counter (12 bytes, zero-padded), which is safe
/// here because each side keeps its own independent counter and a fresh
/// ephemeral key is generated per connection.
pub struct X25519ChaChaSession {
    state: State,
}

impl X25519ChaChaSession {
    pub fn new() -> Self {
        Self {
            state: State::Unstarted,
        }
    }

    fn derive_key(shared_secret: &x25519_dalek::SharedSecret) -> Key {
        let mut hasher = Sha256::new();
        hasher.update(b"glyphcast-session-key-v1");
        hasher.update(shared_secret.as_bytes());
        let digest = hasher.finalize();
        Key::clone_from_slice(&digest)
    }

    fn nonce_from_counter(counter: u64) -> Nonce {
        let mut bytes = [0u8; 12];
        bytes[4..12].copy_from_slice(&counter.to_le_bytes());
        Nonce::clone_from_slice(&bytes)
    }
}

impl Default for X25519ChaChaSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Crypto for X25519ChaChaSession {
    fn handshake_begin(&mut self) -> Vec<u8> {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        self.state = State::AwaitingPeer(secret);
        public.as_bytes().to_vec()
    }

    fn handshake_step(&mut self, peer_bytes: &[u8]) -> Result<(Vec<u8>, bool), CollabError> {
        let peer_bytes: [u8; 32] = peer_bytes
            .try_into()
            .map_err(|_| CollabError::Handshake("peer public key must be 32 bytes"))?;
        let peer_public = PublicKey::from(peer_bytes);

        let secret = match std::mem::replace(&mut self.state, State::Unstarted) {
            State::AwaitingPeer(secret) => secret,
            _ => return Err(CollabError::Handshake("handshake_step called before handshake_begin")),
        };

        let shared = secret.diffie_hellman(&peer_public);
        let key = Self::derive_key(&shared);
        let cipher = ChaCha20Poly1305::new(&key);

        self.state = State::Established {
            cipher,
            send_nonce: 0,
            recv_nonce_floor: 0,
        };

        Ok((Vec::new(), true))
    }

    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CollabError> {
        let State::Established {
            cipher, send_nonce, ..
        } = &mut self.state
        else {
            return Err(CollabError::Handshake("seal called before handshake completed"));
        };

        let nonce = Self::nonce_from_counter(*send_nonce);
        let mut ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CollabError::AeadOpen)?;
        let counter = *send_nonce;
        *send_nonce += 1;

        let mut out = counter.to_le_bytes().to_vec();
        out.append(&mut ciphertext);
        Ok(out)
    }

    fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CollabError> {
        let State::Established {
            cipher,
            recv_nonce_floor,
            ..
        } = &mut self.state
        else {
            return Err(CollabError::Handshake("open called before handshake completed"));
        };

        if ciphertext.len() < 8 {
            return Err(CollabError::AeadOpen);
        }
        let (counter_bytes, sealed) = ciphertext.split_at(8);
        let counter = u64::from_le_bytes(counter_bytes.try_into().unwrap());

        if counter < *recv_nonce_floor {
            return Err(CollabError::AeadOpen);
        }

        let nonce = Self::nonce_from_counter(counter);
        let plaintext = cipher.decrypt(&nonce, sealed).map_err(|_| CollabError::AeadOpen)?;
        *recv_nonce_floor = counter + 1;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_establishes_matching_sessions() {
        let mut alice = X25519ChaChaSession::new();
        let mut bob = X25519ChaChaSession::new();

        let alice_pub = alice.handshake_begin();
        let bob_pub = bob.handshake_begin();

        let (_, alice_done) = alice.handshake_step(&bob_pub).unwrap();
        let (_, bob_done) = bob.handshake_step(&alice_pub).unwrap();
        assert!(alice_done && bob_done);

        let sealed = alice.seal(b"hello bob").unwrap();
        let opened = bob.open(&sealed).unwrap();
        assert_eq!(opened, b"hello bob");
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let mut alice = X25519ChaChaSession::new();
        let mut bob = X25519ChaChaSession::new();
        let alice_pub = alice.handshake_begin();
        let bob_pub = bob.handshake_begin();
        alice.handshake_step(&bob_pub).unwrap();
        bob.handshake_step(&alice_pub).unwrap();

        let mut sealed = alice.seal(b"hello").unwrap();
        *sealed.last_mut().unwrap() ^= 0xFF;
        assert!(bob.open(&sealed).is_err());
    }

    #[test]
    fn seal_before_handshake_errors() {
        let mut session = X25519ChaChaSession::new();
        assert!(session.seal(b"x").is_err());
    }
}
