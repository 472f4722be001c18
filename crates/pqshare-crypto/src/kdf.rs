//! Session key derivation
//!
//! A [`SharedSecret`] is expanded once with HKDF-SHA256 into independent
//! keys, each under its own fixed label. The secret is consumed (and wiped)
//! by [`SharedSecret::into_session_keys`].

use crate::{
    constant_time::ct_eq,
    hashing,
    hybrid_kem::SharedSecret,
    keys::{SymmetricKey, KEY_SIZE},
    CryptoError, Result,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Size of the session identifier
pub const SESSION_ID_SIZE: usize = 16;

/// Size of a key confirmation tag
pub const CONFIRMATION_TAG_SIZE: usize = 32;

const SESSION_SALT: &[u8] = b"pqshare/v1/session-keys";
const LABEL_ENCRYPTION: &[u8] = b"encryption";
const LABEL_AUTH: &[u8] = b"auth";
const LABEL_SESSION_ID: &[u8] = b"session-id";

const CONFIRM_SENDER: &[u8] = b"pqshare/v1/confirm/sender";
const CONFIRM_RECEIVER: &[u8] = b"pqshare/v1/confirm/receiver";
const VERIFICATION_CONTEXT: &str = "pqshare v1 verification code";

/// Which side of the exchange a party plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Encapsulates to the peer's public key and later encrypts the file
    Sender,
    /// Publishes its public key and decapsulates the sender's ciphertext
    Receiver,
}

impl Role {
    /// The other side
    pub fn peer(&self) -> Role {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }

    fn confirmation_label(&self) -> &'static [u8] {
        match self {
            Self::Sender => CONFIRM_SENDER,
            Self::Receiver => CONFIRM_RECEIVER,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sender => f.write_str("sender"),
            Self::Receiver => f.write_str("receiver"),
        }
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Keys for one transfer session
pub struct SessionKeys {
    encryption_key: SymmetricKey,
    auth_key: SymmetricKey,
    session_id: [u8; SESSION_ID_SIZE],
}

impl SessionKeys {
    /// Derive the session keys from a shared secret
    ///
    /// Deterministic: equal secrets give byte-identical keys.
    pub fn derive(shared: &SharedSecret) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(Some(SESSION_SALT), shared.as_bytes());

        let mut encryption = Zeroizing::new([0u8; KEY_SIZE]);
        let mut auth = Zeroizing::new([0u8; KEY_SIZE]);
        let mut session_id = [0u8; SESSION_ID_SIZE];

        hk.expand(LABEL_ENCRYPTION, encryption.as_mut_slice())
            .and_then(|_| hk.expand(LABEL_AUTH, auth.as_mut_slice()))
            .and_then(|_| hk.expand(LABEL_SESSION_ID, &mut session_id))
            .map_err(|e| CryptoError::Generation(format!("session key expansion: {}", e)))?;

        Ok(Self {
            encryption_key: SymmetricKey::from_array(*encryption),
            auth_key: SymmetricKey::from_array(*auth),
            session_id,
        })
    }

    /// Key used for file encryption
    pub fn encryption_key(&self) -> &SymmetricKey {
        &self.encryption_key
    }

    /// Key used for confirmation tags
    pub fn auth_key(&self) -> &SymmetricKey {
        &self.auth_key
    }

    /// Public identifier for the session
    pub fn session_id(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.session_id
    }

    /// HMAC-SHA256 proving possession of the keys for the given role
    pub fn confirmation_tag(&self, role: Role) -> Result<[u8; CONFIRMATION_TAG_SIZE]> {
        let mut mac = HmacSha256::new_from_slice(self.auth_key.as_bytes())
            .map_err(|e| CryptoError::Generation(format!("HMAC init: {}", e)))?;
        mac.update(role.confirmation_label());
        mac.update(&self.session_id);

        let mut tag = [0u8; CONFIRMATION_TAG_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    }

    /// Check a peer's confirmation tag in constant time
    pub fn verify_confirmation(&self, role: Role, tag: &[u8]) -> Result<()> {
        let expected = self.confirmation_tag(role)?;
        if ct_eq(&expected, tag) {
            Ok(())
        } else {
            Err(CryptoError::Authentication(format!(
                "{} confirmation tag does not match",
                role
            )))
        }
    }

    /// Six-digit code both users compare out of band before confirming
    pub fn verification_code(&self) -> String {
        let mut input = Zeroizing::new(Vec::with_capacity(KEY_SIZE + SESSION_ID_SIZE));
        input.extend_from_slice(self.auth_key.as_bytes());
        input.extend_from_slice(&self.session_id);
        let digest = hashing::derive_key(VERIFICATION_CONTEXT, &input);

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        format!("{:06}", u64::from_be_bytes(head) % 1_000_000)
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("session_id", &hex::encode(self.session_id))
            .finish_non_exhaustive()
    }
}

impl SharedSecret {
    /// Derive session keys, wiping the shared secret
    pub fn into_session_keys(self) -> Result<SessionKeys> {
        SessionKeys::derive(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid_kem::{decapsulate, encapsulate, HybridKeypair};

    fn agreed_keys() -> (SessionKeys, SessionKeys) {
        let receiver = HybridKeypair::generate().unwrap();
        let (ciphertext, sender_secret) = encapsulate(receiver.public_key()).unwrap();
        let receiver_secret = decapsulate(ciphertext, &receiver).unwrap();
        (
            sender_secret.into_session_keys().unwrap(),
            receiver_secret.into_session_keys().unwrap(),
        )
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let (sender, receiver) = agreed_keys();
        assert_eq!(sender.encryption_key().as_bytes(), receiver.encryption_key().as_bytes());
        assert_eq!(sender.auth_key().as_bytes(), receiver.auth_key().as_bytes());
        assert_eq!(sender.session_id(), receiver.session_id());
    }

    #[test]
    fn test_outputs_are_independent() {
        let (keys, _) = agreed_keys();
        assert_ne!(keys.encryption_key().as_bytes(), keys.auth_key().as_bytes());
        assert_ne!(&keys.encryption_key().as_bytes()[..SESSION_ID_SIZE], keys.session_id());
    }

    #[test]
    fn test_confirmation_tags() {
        let (sender, receiver) = agreed_keys();

        let tag = receiver.confirmation_tag(Role::Receiver).unwrap();
        sender.verify_confirmation(Role::Receiver, &tag).unwrap();

        // A tag for one role never verifies as the other
        let err = sender.verify_confirmation(Role::Sender, &tag).unwrap_err();
        assert!(err.is_authentication());

        let mut forged = tag;
        forged[0] ^= 0x80;
        assert!(sender.verify_confirmation(Role::Receiver, &forged).is_err());
        assert!(sender.verify_confirmation(Role::Receiver, &tag[..16]).is_err());
    }

    #[test]
    fn test_confirmation_fails_across_sessions() {
        let (a, _) = agreed_keys();
        let (b, _) = agreed_keys();
        let tag = a.confirmation_tag(Role::Receiver).unwrap();
        assert!(b.verify_confirmation(Role::Receiver, &tag).is_err());
    }

    #[test]
    fn test_verification_code() {
        let (sender, receiver) = agreed_keys();
        let code = sender.verification_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(code, receiver.verification_code());
    }

    #[test]
    fn test_role_peer() {
        assert_eq!(Role::Sender.peer(), Role::Receiver);
        assert_eq!(Role::Receiver.peer(), Role::Sender);
    }

    #[test]
    fn test_debug_hides_keys() {
        let (keys, _) = agreed_keys();
        let rendered = format!("{:?}", keys);
        assert!(rendered.contains("session_id"));
        assert!(!rendered.contains(&hex::encode(keys.encryption_key().as_bytes())));
    }
}
