//! Manual key exchange orchestration
//!
//! Drives one hybrid key exchange between two people who move blobs by hand
//! (copy/paste, chat, QR). The session is an explicit state machine:
//!
//! ```text
//! Sender:   KeygenPending --PeerPublicKey--> AwaitingPeerMaterial
//!           AwaitingPeerMaterial --UserConfirmed | PeerConfirmation--> Secured
//! Receiver: KeygenPending --PeerCiphertext--> Secured
//! ```
//!
//! Transitions only move forward. Any failure (malformed peer material, a bad
//! confirmation tag, an event the state does not expect) moves the session to
//! `Aborted`, wipes its key material and makes every later event fail. The
//! caller restarts with a new session and a fresh keypair.

use crate::{
    encoding::TextEncoding,
    hybrid_kem::{decapsulate, encapsulate, HybridCiphertext, HybridKeypair, HybridPublicKey},
    kdf::{Role, SessionKeys},
    CryptoError,
};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

/// Where a session is in the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Own public key published, waiting for the peer's first blob
    KeygenPending,
    /// Sender only: ciphertext published, waiting for confirmation
    AwaitingPeerMaterial,
    /// Session keys are established
    Secured,
    /// Terminal failure state
    Aborted,
}

/// Discrete inputs delivered by the signaling collaborator or the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// The receiver's public key, text-encoded
    PeerPublicKey(String),
    /// The sender's hybrid ciphertext, text-encoded
    PeerCiphertext(String),
    /// The user compared verification codes and accepted
    UserConfirmed,
    /// The receiver's key confirmation tag, text-encoded
    PeerConfirmation(String),
}

impl ExchangeEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::PeerPublicKey(_) => "peer public key",
            Self::PeerCiphertext(_) => "peer ciphertext",
            Self::UserConfirmed => "user confirmation",
            Self::PeerConfirmation(_) => "peer confirmation",
        }
    }

    fn step(&self) -> ExchangeStep {
        match self {
            Self::PeerPublicKey(_) => ExchangeStep::ReadPeerKey,
            Self::PeerCiphertext(_) => ExchangeStep::ReadCiphertext,
            Self::UserConfirmed | Self::PeerConfirmation(_) => ExchangeStep::Confirm,
        }
    }
}

/// The step an exchange failed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStep {
    Keygen,
    ReadPeerKey,
    Encapsulate,
    ReadCiphertext,
    Decapsulate,
    Confirm,
}

impl std::fmt::Display for ExchangeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Keygen => "key generation",
            Self::ReadPeerKey => "reading peer public key",
            Self::Encapsulate => "encapsulation",
            Self::ReadCiphertext => "reading peer ciphertext",
            Self::Decapsulate => "decapsulation",
            Self::Confirm => "confirmation",
        };
        f.write_str(name)
    }
}

/// An exchange failure, tagged with the step that failed
#[derive(Error, Debug)]
#[error("exchange failed during {step}: {source}")]
pub struct ExchangeError {
    pub step: ExchangeStep,
    #[source]
    pub source: CryptoError,
}

type StepResult<T> = std::result::Result<T, (ExchangeStep, CryptoError)>;

fn at(step: ExchangeStep) -> impl FnOnce(CryptoError) -> (ExchangeStep, CryptoError) {
    move |e| (step, e)
}

/// Single-shot completion point for the next piece of peer material
pub struct PeerMaterial {
    rx: oneshot::Receiver<ExchangeEvent>,
}

impl PeerMaterial {
    /// Create the handle pair: the sender goes to whoever delivers the blob,
    /// the `PeerMaterial` goes to [`ExchangeSession::await_event`]
    pub fn channel() -> (oneshot::Sender<ExchangeEvent>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

/// One key exchange, for one role
pub struct ExchangeSession {
    role: Role,
    encoding: TextEncoding,
    state: ExchangeState,
    keypair: Option<HybridKeypair>,
    keys: Option<SessionKeys>,
}

impl ExchangeSession {
    /// Create a session; no key material exists yet
    pub fn new(role: Role, encoding: TextEncoding) -> Self {
        Self {
            role,
            encoding,
            state: ExchangeState::KeygenPending,
            keypair: None,
            keys: None,
        }
    }

    /// Create a session and generate its keypair, returning the public key text
    pub fn start(role: Role, encoding: TextEncoding) -> Result<(Self, String), ExchangeError> {
        let mut session = Self::new(role, encoding);
        let public = session.publish_public_key()?;
        Ok((session, public))
    }

    /// Generate the keypair (once) and return the public key as text
    pub fn publish_public_key(&mut self) -> Result<String, ExchangeError> {
        if self.state != ExchangeState::KeygenPending {
            return Err(self.reject(
                ExchangeStep::Keygen,
                format!("cannot publish a public key while {:?}", self.state),
            ));
        }
        let keypair = match self.keypair.take() {
            Some(keypair) => keypair,
            None => {
                let keypair =
                    HybridKeypair::generate().map_err(|e| self.fail(ExchangeStep::Keygen, e))?;
                debug!(role = %self.role, "keypair generated");
                keypair
            }
        };
        let text = keypair.public_key().to_text(self.encoding);
        self.keypair = Some(keypair);
        Ok(text)
    }

    /// Apply one event, returning any blob that must be sent to the peer
    #[instrument(skip_all, fields(role = %self.role))]
    pub fn handle(&mut self, event: ExchangeEvent) -> Result<Option<String>, ExchangeError> {
        match self.state {
            ExchangeState::Aborted => {
                return Err(ExchangeError {
                    step: event.step(),
                    source: CryptoError::ExchangeAborted,
                })
            }
            ExchangeState::Secured => {
                return Err(ExchangeError {
                    step: event.step(),
                    source: CryptoError::InvalidState(format!(
                        "session already secured, ignoring {}",
                        event.kind()
                    )),
                })
            }
            _ => {}
        }

        let result = match (self.role, self.state, event) {
            (Role::Sender, ExchangeState::KeygenPending, ExchangeEvent::PeerPublicKey(text)) => {
                self.on_peer_public_key(&text)
            }
            (Role::Sender, ExchangeState::AwaitingPeerMaterial, ExchangeEvent::UserConfirmed) => {
                self.secure();
                Ok(None)
            }
            (
                Role::Sender,
                ExchangeState::AwaitingPeerMaterial,
                ExchangeEvent::PeerConfirmation(text),
            ) => self.on_peer_confirmation(&text),
            (Role::Receiver, ExchangeState::KeygenPending, ExchangeEvent::PeerCiphertext(text)) => {
                self.on_peer_ciphertext(&text)
            }
            (role, state, event) => Err((
                event.step(),
                CryptoError::InvalidState(format!(
                    "{} cannot accept {} while {:?}",
                    role,
                    event.kind(),
                    state
                )),
            )),
        };

        result.map_err(|(step, source)| self.fail(step, source))
    }

    /// Wait for the next piece of peer material, then apply it
    ///
    /// A dropped sender aborts the exchange.
    pub async fn await_event(
        &mut self,
        material: PeerMaterial,
    ) -> Result<Option<String>, ExchangeError> {
        match material.rx.await {
            Ok(event) => self.handle(event),
            Err(_) => Err(self.fail(self.expected_step(), CryptoError::ExchangeAborted)),
        }
    }

    /// Abort the exchange, wiping all key material
    pub fn abort(&mut self) {
        if self.state != ExchangeState::Aborted {
            warn!(role = %self.role, state = ?self.state, "exchange aborted by caller");
        }
        self.wipe();
        self.state = ExchangeState::Aborted;
    }

    fn on_peer_public_key(&mut self, text: &str) -> StepResult<Option<String>> {
        if self.keypair.is_none() {
            return Err((
                ExchangeStep::Keygen,
                CryptoError::InvalidState("own public key was never published".to_string()),
            ));
        }
        let peer = HybridPublicKey::from_text(text, self.encoding)
            .map_err(at(ExchangeStep::ReadPeerKey))?;
        let (ciphertext, shared) = encapsulate(&peer).map_err(at(ExchangeStep::Encapsulate))?;
        let keys = shared.into_session_keys().map_err(at(ExchangeStep::Encapsulate))?;

        self.keys = Some(keys);
        self.transition(ExchangeState::AwaitingPeerMaterial);
        Ok(Some(ciphertext.to_text(self.encoding)))
    }

    fn on_peer_ciphertext(&mut self, text: &str) -> StepResult<Option<String>> {
        let ciphertext = HybridCiphertext::from_text(text, self.encoding)
            .map_err(at(ExchangeStep::ReadCiphertext))?;
        let keypair = self.keypair.take().ok_or_else(|| {
            (
                ExchangeStep::Keygen,
                CryptoError::InvalidState("own public key was never published".to_string()),
            )
        })?;
        let shared = decapsulate(ciphertext, &keypair).map_err(at(ExchangeStep::Decapsulate))?;
        drop(keypair);

        let keys = shared.into_session_keys().map_err(at(ExchangeStep::Decapsulate))?;
        let tag = keys
            .confirmation_tag(self.role)
            .map_err(at(ExchangeStep::Confirm))?;

        self.keys = Some(keys);
        self.transition(ExchangeState::Secured);
        Ok(Some(self.encoding.encode(&tag)))
    }

    fn on_peer_confirmation(&mut self, text: &str) -> StepResult<Option<String>> {
        let tag = self.encoding.decode(text).map_err(at(ExchangeStep::Confirm))?;
        match &self.keys {
            Some(keys) => keys
                .verify_confirmation(self.role.peer(), &tag)
                .map_err(at(ExchangeStep::Confirm))?,
            None => {
                return Err((
                    ExchangeStep::Confirm,
                    CryptoError::InvalidState("no session keys to confirm".to_string()),
                ))
            }
        }
        self.secure();
        Ok(None)
    }

    fn secure(&mut self) {
        // The sender's keypair has no further use once keys are confirmed
        self.keypair = None;
        self.transition(ExchangeState::Secured);
    }

    fn transition(&mut self, next: ExchangeState) {
        debug!(role = %self.role, from = ?self.state, to = ?next, "exchange state change");
        self.state = next;
    }

    fn expected_step(&self) -> ExchangeStep {
        match (self.role, self.state) {
            (Role::Sender, ExchangeState::KeygenPending) => ExchangeStep::ReadPeerKey,
            (Role::Receiver, ExchangeState::KeygenPending) => ExchangeStep::ReadCiphertext,
            _ => ExchangeStep::Confirm,
        }
    }

    fn reject(&mut self, step: ExchangeStep, message: String) -> ExchangeError {
        self.fail(step, CryptoError::InvalidState(message))
    }

    fn fail(&mut self, step: ExchangeStep, source: CryptoError) -> ExchangeError {
        warn!(role = %self.role, %step, "exchange aborted");
        self.wipe();
        self.state = ExchangeState::Aborted;
        ExchangeError { step, source }
    }

    fn wipe(&mut self) {
        self.keypair = None;
        self.keys = None;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Own public key, while the keypair is alive
    pub fn public_key(&self) -> Option<&HybridPublicKey> {
        self.keypair.as_ref().map(|k| k.public_key())
    }

    /// Code for the users to compare, once the shared secret exists
    pub fn verification_code(&self) -> Option<String> {
        self.keys.as_ref().map(|k| k.verification_code())
    }

    /// Session keys, only once the session is secured
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        match self.state {
            ExchangeState::Secured => self.keys.as_ref(),
            _ => None,
        }
    }

    /// Take the session keys out of a secured session
    pub fn into_session_keys(mut self) -> crate::Result<SessionKeys> {
        match (self.state, self.keys.take()) {
            (ExchangeState::Secured, Some(keys)) => Ok(keys),
            (state, _) => Err(CryptoError::InvalidState(format!(
                "session keys are not available while {:?}",
                state
            ))),
        }
    }
}

impl std::fmt::Debug for ExchangeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSession")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secured_pair() -> (ExchangeSession, ExchangeSession) {
        let (mut sender, _) = ExchangeSession::start(Role::Sender, TextEncoding::Base64).unwrap();
        let (mut receiver, receiver_pk) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();

        let ciphertext = sender
            .handle(ExchangeEvent::PeerPublicKey(receiver_pk))
            .unwrap()
            .unwrap();
        let tag = receiver
            .handle(ExchangeEvent::PeerCiphertext(ciphertext))
            .unwrap()
            .unwrap();
        sender.handle(ExchangeEvent::PeerConfirmation(tag)).unwrap();
        (sender, receiver)
    }

    #[test_log::test]
    fn test_full_exchange_with_user_confirmation() {
        let (mut sender, _) = ExchangeSession::start(Role::Sender, TextEncoding::Hex).unwrap();
        let (mut receiver, receiver_pk) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Hex).unwrap();
        assert_eq!(sender.state(), ExchangeState::KeygenPending);

        let ciphertext = sender
            .handle(ExchangeEvent::PeerPublicKey(receiver_pk))
            .unwrap()
            .unwrap();
        assert_eq!(sender.state(), ExchangeState::AwaitingPeerMaterial);
        assert!(sender.session_keys().is_none());

        receiver.handle(ExchangeEvent::PeerCiphertext(ciphertext)).unwrap();
        assert_eq!(receiver.state(), ExchangeState::Secured);
        assert_eq!(sender.verification_code(), receiver.verification_code());

        assert_eq!(sender.handle(ExchangeEvent::UserConfirmed).unwrap(), None);
        assert_eq!(sender.state(), ExchangeState::Secured);
        assert!(sender.public_key().is_none());

        let s = sender.into_session_keys().unwrap();
        let r = receiver.into_session_keys().unwrap();
        assert_eq!(s.encryption_key().as_bytes(), r.encryption_key().as_bytes());
    }

    #[test_log::test]
    fn test_exchange_with_peer_confirmation() {
        let (sender, receiver) = secured_pair();
        assert_eq!(sender.state(), ExchangeState::Secured);
        assert_eq!(
            sender.session_keys().unwrap().session_id(),
            receiver.session_keys().unwrap().session_id()
        );
    }

    #[test_log::test]
    fn test_malformed_public_key_aborts() {
        let (mut sender, _) = ExchangeSession::start(Role::Sender, TextEncoding::Base64).unwrap();
        let err = sender
            .handle(ExchangeEvent::PeerPublicKey("AAAA".to_string()))
            .unwrap_err();
        assert_eq!(err.step, ExchangeStep::ReadPeerKey);
        assert!(err.source.is_serialization());
        assert_eq!(sender.state(), ExchangeState::Aborted);
        assert!(sender.public_key().is_none());

        // Nothing is accepted after an abort
        let err = sender.handle(ExchangeEvent::UserConfirmed).unwrap_err();
        assert!(matches!(err.source, CryptoError::ExchangeAborted));
    }

    #[test_log::test]
    fn test_truncated_ciphertext_aborts_receiver() {
        let (mut receiver, _) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();
        let truncated = TextEncoding::Base64.encode(&[0u8; 1000 + 32]);

        let err = receiver
            .handle(ExchangeEvent::PeerCiphertext(truncated))
            .unwrap_err();
        assert_eq!(err.step, ExchangeStep::ReadCiphertext);
        assert!(matches!(err.source, CryptoError::Serialization(_)));
        assert_eq!(receiver.state(), ExchangeState::Aborted);
    }

    #[test_log::test]
    fn test_wrong_confirmation_tag_aborts_sender() {
        let (mut sender, _) = ExchangeSession::start(Role::Sender, TextEncoding::Base64).unwrap();
        let (_, receiver_pk) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();
        sender.handle(ExchangeEvent::PeerPublicKey(receiver_pk)).unwrap();

        let bogus = TextEncoding::Base64.encode(&[0u8; 32]);
        let err = sender.handle(ExchangeEvent::PeerConfirmation(bogus)).unwrap_err();
        assert_eq!(err.step, ExchangeStep::Confirm);
        assert!(err.source.is_authentication());
        assert_eq!(sender.state(), ExchangeState::Aborted);
        assert!(sender.verification_code().is_none());
    }

    #[test_log::test]
    fn test_unexpected_event_aborts() {
        let (mut receiver, _) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();
        let err = receiver.handle(ExchangeEvent::UserConfirmed).unwrap_err();
        assert!(matches!(err.source, CryptoError::InvalidState(_)));
        assert_eq!(receiver.state(), ExchangeState::Aborted);
    }

    #[test]
    fn test_event_before_keygen_aborts() {
        let mut sender = ExchangeSession::new(Role::Sender, TextEncoding::Base64);
        let (_, receiver_pk) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();
        let err = sender.handle(ExchangeEvent::PeerPublicKey(receiver_pk)).unwrap_err();
        assert_eq!(err.step, ExchangeStep::Keygen);
    }

    #[test]
    fn test_secured_session_rejects_events_without_losing_keys() {
        let (mut sender, _) = secured_pair();
        let err = sender.handle(ExchangeEvent::UserConfirmed).unwrap_err();
        assert!(matches!(err.source, CryptoError::InvalidState(_)));
        assert_eq!(sender.state(), ExchangeState::Secured);
        assert!(sender.session_keys().is_some());
    }

    #[test]
    fn test_abort_wipes_keys() {
        let (mut sender, _) = secured_pair();
        sender.abort();
        assert_eq!(sender.state(), ExchangeState::Aborted);
        assert!(sender.session_keys().is_none());
        assert!(sender.into_session_keys().is_err());
    }

    #[test]
    fn test_publish_public_key_is_stable() {
        let (mut session, first) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();
        assert_eq!(session.publish_public_key().unwrap(), first);
    }

    #[tokio::test]
    async fn test_await_event_delivers_material() {
        let (mut sender, _) = ExchangeSession::start(Role::Sender, TextEncoding::Base64).unwrap();
        let (mut receiver, receiver_pk) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();

        let (tx, material) = PeerMaterial::channel();
        tokio::spawn(async move {
            let _ = tx.send(ExchangeEvent::PeerPublicKey(receiver_pk));
        });
        let ciphertext = sender.await_event(material).await.unwrap().unwrap();

        let (tx, material) = PeerMaterial::channel();
        tx.send(ExchangeEvent::PeerCiphertext(ciphertext)).unwrap();
        receiver.await_event(material).await.unwrap();
        assert_eq!(receiver.state(), ExchangeState::Secured);
    }

    #[tokio::test]
    async fn test_dropped_sender_aborts() {
        let (mut receiver, _) =
            ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();
        let (tx, material) = PeerMaterial::channel();
        drop(tx);

        let err = receiver.await_event(material).await.unwrap_err();
        assert_eq!(err.step, ExchangeStep::ReadCiphertext);
        assert!(matches!(err.source, CryptoError::ExchangeAborted));
        assert_eq!(receiver.state(), ExchangeState::Aborted);
    }
}
