//! The authenticated-encryption envelope around every datagram.
//!
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────┐
//! │ nonce (12 B) │ ciphertext (n bytes) │ tag (16 B)   │
//! └──────────────┴──────────────────────┴──────────────┘
//!   prefix (4 B) ‖ counter (8 B, big-endian)
//! ```
//!
//! The prefix is random per [`NonceSequence`] and never changes; the
//! counter goes up by exactly one per sealed packet. Two sessions (or two
//! socket rebinds) therefore never produce the same nonce under the shared
//! key, even for identical plaintexts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::Rng;
use sha2::Sha256;

use crate::window::SlidingWindow;
use crate::{AuthError, SealError};

/// Key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;
/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;
/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;
/// Length of the random nonce prefix.
pub const PREFIX_LEN: usize = 4;

/// PBKDF2 rounds used by [`SecretKey::derive`].
pub const PBKDF2_ROUNDS: u32 = 600_000;
const KEY_SALT: &[u8] = b"voudp";

// ---------------------------------------------------------------------------
// SecretKey
// ---------------------------------------------------------------------------

/// The shared 32-byte key every peer of a deployment uses.
#[derive(Clone)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Derives a key from a passphrase with PBKDF2-HMAC-SHA256.
    ///
    /// This is deliberately slow (hundreds of milliseconds). Call it once at
    /// startup.
    pub fn derive(passphrase: &str) -> Self {
        Self::derive_with_rounds(passphrase, PBKDF2_ROUNDS)
    }

    pub fn derive_with_rounds(passphrase: &str, rounds: u32) -> Self {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KEY_SALT, rounds, &mut key);
        Self(key)
    }
}

/// Never print key material.
impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

// ---------------------------------------------------------------------------
// NonceSequence
// ---------------------------------------------------------------------------

/// The outbound nonce source for one session.
///
/// The counter is an `AtomicU64`, so any number of tasks holding a shared
/// reference can seal concurrently without ever drawing the same nonce.
#[derive(Debug)]
pub struct NonceSequence {
    prefix: [u8; PREFIX_LEN],
    counter: AtomicU64,
}

impl NonceSequence {
    /// A fresh sequence with a random prefix, counting from zero.
    pub fn random() -> Self {
        let prefix: [u8; PREFIX_LEN] = rand::rng().random();
        Self::with_prefix(prefix)
    }

    pub fn with_prefix(prefix: [u8; PREFIX_LEN]) -> Self {
        Self::starting_at(prefix, 0)
    }

    pub fn starting_at(prefix: [u8; PREFIX_LEN], counter: u64) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(counter),
        }
    }

    pub fn prefix(&self) -> [u8; PREFIX_LEN] {
        self.prefix
    }

    /// Draws the next nonce.
    ///
    /// `fetch_update` retries the compare-and-swap until it wins, so every
    /// caller observes a distinct counter value. Once the counter reaches
    /// `u64::MAX` it refuses instead of wrapping.
    pub fn next_nonce(&self) -> Result<[u8; NONCE_LEN], SealError> {
        let counter = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_add(1))
            .map_err(|_| SealError::NonceExhausted)?;

        let mut nonce = [0u8; NONCE_LEN];
        nonce[..PREFIX_LEN].copy_from_slice(&self.prefix);
        nonce[PREFIX_LEN..].copy_from_slice(&counter.to_be_bytes());
        Ok(nonce)
    }
}

// ---------------------------------------------------------------------------
// Cipher
// ---------------------------------------------------------------------------

/// A decrypted datagram together with the nonce it arrived under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub nonce: [u8; NONCE_LEN],
    pub plaintext: Vec<u8>,
}

impl Opened {
    pub fn prefix(&self) -> [u8; PREFIX_LEN] {
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&self.nonce[..PREFIX_LEN]);
        prefix
    }

    pub fn counter(&self) -> u64 {
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&self.nonce[PREFIX_LEN..]);
        u64::from_be_bytes(counter)
    }
}

/// ChaCha20-Poly1305 keyed with the deployment key.
///
/// Stateless apart from the key: nonces come from the caller's
/// [`NonceSequence`], replay state lives in a [`ReplayWindow`].
#[derive(Clone)]
pub struct Cipher {
    aead: ChaCha20Poly1305,
}

impl Cipher {
    pub fn new(key: &SecretKey) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(&key.0)),
        }
    }

    /// Encrypts `plaintext` under the next nonce of `nonces` and returns the
    /// full datagram.
    pub fn seal(&self, nonces: &NonceSequence, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        let nonce = nonces.next_nonce()?;
        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SealError::Encrypt)?;

        let mut datagram = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        datagram.extend_from_slice(&nonce);
        datagram.extend_from_slice(&ciphertext);
        Ok(datagram)
    }

    /// Authenticates and decrypts a datagram.
    ///
    /// A successful `open` says nothing about freshness; run the nonce
    /// through the peer's [`ReplayWindow`] before acting on it.
    pub fn open(&self, datagram: &[u8]) -> Result<Opened, AuthError> {
        if datagram.len() < NONCE_LEN + TAG_LEN {
            return Err(AuthError::TooShort);
        }
        let (nonce_bytes, ciphertext) = datagram.split_at(NONCE_LEN);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| AuthError::Rejected)?;

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        Ok(Opened { nonce, plaintext })
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cipher(..)")
    }
}

// ---------------------------------------------------------------------------
// ReplayWindow
// ---------------------------------------------------------------------------

/// Inbound replay protection for one peer.
///
/// The first authenticated datagram pins the peer's nonce prefix. Later
/// datagrams must carry the same prefix and a counter not seen before
/// (within a 64-packet window behind the highest one).
#[derive(Debug, Default)]
pub struct ReplayWindow {
    prefix: Option<[u8; PREFIX_LEN]>,
    seen: SlidingWindow,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, opened: &Opened) -> Result<(), AuthError> {
        let prefix = opened.prefix();
        match self.prefix {
            Some(pinned) if pinned != prefix => return Err(AuthError::PrefixMismatch),
            Some(_) => {}
            None => self.prefix = Some(prefix),
        }
        if self.seen.check_and_record(opened.counter()) {
            Ok(())
        } else {
            Err(AuthError::Replayed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn cipher() -> Cipher {
        Cipher::new(&SecretKey::from_bytes([7u8; KEY_LEN]))
    }

    #[test]
    fn test_seal_open_round_trip() {
        let c = cipher();
        let nonces = NonceSequence::random();
        let datagram = c.seal(&nonces, b"\x01\x00\x00\x00\x01").unwrap();

        assert_eq!(datagram.len(), NONCE_LEN + 5 + TAG_LEN);
        let opened = c.open(&datagram).unwrap();
        assert_eq!(opened.plaintext, b"\x01\x00\x00\x00\x01");
        assert_eq!(opened.prefix(), nonces.prefix());
        assert_eq!(opened.counter(), 0);
    }

    #[test]
    fn test_open_wrong_key_returns_rejected() {
        let nonces = NonceSequence::random();
        let datagram = cipher().seal(&nonces, b"hello").unwrap();

        let other = Cipher::new(&SecretKey::from_bytes([8u8; KEY_LEN]));
        assert_eq!(other.open(&datagram), Err(AuthError::Rejected));
    }

    #[test]
    fn test_open_flipped_bit_returns_rejected() {
        let c = cipher();
        let mut datagram = c.seal(&NonceSequence::random(), b"hello").unwrap();
        let last = datagram.len() - 1;
        datagram[last] ^= 0x01;
        assert_eq!(c.open(&datagram), Err(AuthError::Rejected));
    }

    #[test]
    fn test_open_short_datagram_returns_too_short() {
        assert_eq!(cipher().open(&[0u8; 27]), Err(AuthError::TooShort));
        assert_eq!(cipher().open(&[]), Err(AuthError::TooShort));
    }

    #[test]
    fn test_open_empty_plaintext_is_not_an_error() {
        // An empty packet authenticates fine; the codec rejects it later.
        let c = cipher();
        let datagram = c.seal(&NonceSequence::random(), b"").unwrap();
        assert!(c.open(&datagram).unwrap().plaintext.is_empty());
    }

    #[test]
    fn test_identical_plaintexts_differ_across_sessions() {
        let c = cipher();
        let a = c.seal(&NonceSequence::with_prefix([1, 1, 1, 1]), b"same").unwrap();
        let b = c.seal(&NonceSequence::with_prefix([2, 2, 2, 2]), b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_nonce_sequence_strictly_increases() {
        let nonces = NonceSequence::with_prefix([9, 9, 9, 9]);
        let mut last = None;
        for _ in 0..1_000 {
            let nonce = nonces.next_nonce().unwrap();
            assert_eq!(&nonce[..4], &[9, 9, 9, 9]);
            let counter = u64::from_be_bytes(nonce[4..].try_into().unwrap());
            if let Some(prev) = last {
                assert!(counter > prev);
            }
            last = Some(counter);
        }
    }

    #[test]
    fn test_nonce_sequence_concurrent_senders_never_collide() {
        let nonces = Arc::new(NonceSequence::random());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let nonces = Arc::clone(&nonces);
                std::thread::spawn(move || {
                    (0..500).map(|_| nonces.next_nonce().unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for nonce in handle.join().unwrap() {
                assert!(seen.insert(nonce), "nonce reused");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }

    #[test]
    fn test_nonce_sequence_exhausted_refuses_to_wrap() {
        let nonces = NonceSequence::starting_at([0; 4], u64::MAX - 1);
        assert!(nonces.next_nonce().is_ok());
        assert_eq!(nonces.next_nonce(), Err(SealError::NonceExhausted));
        assert_eq!(nonces.next_nonce(), Err(SealError::NonceExhausted));
    }

    #[test]
    fn test_replay_window_rejects_duplicate_datagram() {
        let c = cipher();
        let datagram = c.seal(&NonceSequence::random(), b"x").unwrap();
        let mut window = ReplayWindow::new();

        assert_eq!(window.accept(&c.open(&datagram).unwrap()), Ok(()));
        assert_eq!(
            window.accept(&c.open(&datagram).unwrap()),
            Err(AuthError::Replayed)
        );
    }

    #[test]
    fn test_replay_window_rejects_foreign_prefix() {
        let c = cipher();
        let mut window = ReplayWindow::new();
        let first = c.seal(&NonceSequence::with_prefix([1; 4]), b"x").unwrap();
        let other = c.seal(&NonceSequence::with_prefix([2; 4]), b"x").unwrap();

        assert_eq!(window.accept(&c.open(&first).unwrap()), Ok(()));
        assert_eq!(
            window.accept(&c.open(&other).unwrap()),
            Err(AuthError::PrefixMismatch)
        );
    }

    #[test]
    fn test_derive_is_deterministic_and_phrase_sensitive() {
        let a = SecretKey::derive_with_rounds("correct horse", 10);
        let b = SecretKey::derive_with_rounds("correct horse", 10);
        let c = SecretKey::derive_with_rounds("battery staple", 10);
        assert_eq!(a.0, b.0);
        assert_ne!(a.0, c.0);
    }

    #[test]
    fn test_secret_key_debug_hides_bytes() {
        let key = SecretKey::from_bytes([0xab; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "SecretKey(..)");
    }
}
