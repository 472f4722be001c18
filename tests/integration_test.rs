//! Integration tests for pqshare
//!
//! These tests run the whole pipeline: hybrid key establishment, session key
//! derivation and file encryption, the way two peers would.

use pqshare_crypto::{
    chunked::{decrypt_file, encrypt_file, encrypt_file_with, FileEncryptionOptions, MIN_CHUNK_SIZE},
    hashing::hash,
    hybrid_kem::{
        decapsulate, encapsulate, HybridCiphertext, HybridKeypair, HybridPublicKey,
        HYBRID_CIPHERTEXT_SIZE, MLKEM_CIPHERTEXT_SIZE, X25519_PUBLIC_KEY_SIZE,
    },
    CryptoError, ExchangeEvent, ExchangeSession, ExchangeState, Role, SessionKeys, TextEncoding,
};

/// A encapsulates to B, both derive keys, A encrypts "hello test", B decrypts
#[test]
fn test_end_to_end_hello() {
    let _a = HybridKeypair::generate().unwrap();
    let b = HybridKeypair::generate().unwrap();

    // A encapsulates to B's public key
    let (ciphertext, secret_a) = encapsulate(b.public_key()).unwrap();
    assert_eq!(ciphertext.lattice_bytes().len(), 1088);
    assert_eq!(ciphertext.curve_ephemeral_bytes().len(), 32);

    // B decapsulates
    let secret_b = decapsulate(ciphertext, &b).unwrap();
    assert_eq!(secret_a, secret_b);

    let keys_a = SessionKeys::derive(&secret_a).unwrap();
    let keys_b = SessionKeys::derive(&secret_b).unwrap();
    assert_eq!(keys_a.encryption_key().as_bytes(), keys_b.encryption_key().as_bytes());

    let file = encrypt_file("hello.txt", b"hello test", keys_a.encryption_key()).unwrap();
    assert_eq!(file.metadata.chunk_count, 1);

    let decrypted = decrypt_file(&file, keys_b.encryption_key()).unwrap();
    assert_eq!(decrypted.data.as_ref(), b"hello test");
    assert_eq!(decrypted.name, "hello.txt");
    assert_eq!(hash(&decrypted.data), file.metadata.file_hash);
}

/// A lattice ciphertext cut to 1000 bytes never reaches decapsulation
#[test]
fn test_truncated_lattice_ciphertext() {
    let b = HybridKeypair::generate().unwrap();
    let (ciphertext, _) = encapsulate(b.public_key()).unwrap();

    let truncated = &ciphertext.lattice_bytes()[..1000];
    let err =
        HybridCiphertext::from_parts(truncated, ciphertext.curve_ephemeral_bytes()).unwrap_err();
    assert!(matches!(err, CryptoError::Serialization(_)));

    // Same through the concatenated wire form
    let mut wire = truncated.to_vec();
    wire.extend_from_slice(ciphertext.curve_ephemeral_bytes());
    assert_eq!(wire.len(), 1000 + X25519_PUBLIC_KEY_SIZE);
    let err = HybridCiphertext::from_bytes(&wire).unwrap_err();
    assert!(matches!(err, CryptoError::Serialization(_)));
}

#[test]
fn test_wire_sizes() {
    let keypair = HybridKeypair::generate().unwrap();
    assert_eq!(keypair.public_key().to_bytes().len(), 1216);

    let (ciphertext, _) = encapsulate(keypair.public_key()).unwrap();
    assert_eq!(ciphertext.to_bytes().len(), HYBRID_CIPHERTEXT_SIZE);
    assert_eq!(HYBRID_CIPHERTEXT_SIZE, MLKEM_CIPHERTEXT_SIZE + X25519_PUBLIC_KEY_SIZE);
}

/// Both peers drive the orchestrator and only ever exchange text
#[test]
fn test_manual_exchange_then_transfer() {
    let (mut sender, _sender_pk) =
        ExchangeSession::start(Role::Sender, TextEncoding::Base64).unwrap();
    let (mut receiver, receiver_pk) =
        ExchangeSession::start(Role::Receiver, TextEncoding::Base64).unwrap();

    // The public key survives a trip through a chat window
    let pasted = format!("  {}\n", receiver_pk);
    assert!(HybridPublicKey::from_text(&pasted, TextEncoding::Base64).is_ok());

    let ciphertext = sender
        .handle(ExchangeEvent::PeerPublicKey(pasted))
        .unwrap()
        .unwrap();
    let tag = receiver
        .handle(ExchangeEvent::PeerCiphertext(ciphertext))
        .unwrap()
        .unwrap();
    assert_eq!(sender.verification_code(), receiver.verification_code());

    sender.handle(ExchangeEvent::PeerConfirmation(tag)).unwrap();
    assert_eq!(sender.state(), ExchangeState::Secured);
    assert_eq!(receiver.state(), ExchangeState::Secured);

    let sender_keys = sender.into_session_keys().unwrap();
    let receiver_keys = receiver.into_session_keys().unwrap();

    let data: Vec<u8> = (0..MIN_CHUNK_SIZE * 5 + 77).map(|i| (i * 31 % 256) as u8).collect();
    let options = FileEncryptionOptions {
        chunk_size: MIN_CHUNK_SIZE,
        ..Default::default()
    };
    let file =
        encrypt_file_with("dataset.csv", &data, sender_keys.encryption_key(), &options).unwrap();
    assert_eq!(file.metadata.chunk_count, 6);

    // Container crosses the wire as JSON
    let json = file.to_json().unwrap();
    let received = pqshare_crypto::EncryptedFile::from_json(&json).unwrap();
    let decrypted = decrypt_file(&received, receiver_keys.encryption_key()).unwrap();
    assert_eq!(decrypted.data.as_ref(), data.as_slice());
}

/// Two independent sessions never share keys
#[test]
fn test_sessions_are_isolated() {
    let b = HybridKeypair::generate().unwrap();
    let (_, s1) = encapsulate(b.public_key()).unwrap();
    let (_, s2) = encapsulate(b.public_key()).unwrap();
    let k1 = s1.into_session_keys().unwrap();
    let k2 = s2.into_session_keys().unwrap();

    let file = encrypt_file("x", b"isolated", k1.encryption_key()).unwrap();
    let err = decrypt_file(&file, k2.encryption_key()).unwrap_err();
    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_async_pipeline() {
    use pqshare_crypto::task::{
        decrypt_file_with_progress, encrypt_file_with_progress, spawn_crypto,
    };
    use pqshare_crypto::TransferProgress;
    use tokio::sync::watch;

    let b = spawn_crypto(HybridKeypair::generate).await.unwrap();
    let (ciphertext, secret_a) = encapsulate(b.public_key()).unwrap();
    let secret_b = decapsulate(ciphertext, &b).unwrap();

    let key_a = secret_a.into_session_keys().unwrap().encryption_key().clone();
    let key_b = secret_b.into_session_keys().unwrap().encryption_key().clone();

    let (tx, rx) = watch::channel(TransferProgress::default());
    let options = FileEncryptionOptions::default();
    let file = encrypt_file_with_progress("a.bin".into(), vec![42u8; 100_000], key_a, options, tx)
        .await
        .unwrap();
    assert!(rx.borrow().is_complete());

    let (tx, rx) = watch::channel(TransferProgress::default());
    let decrypted = decrypt_file_with_progress(file, key_b, tx).await.unwrap();
    assert_eq!(decrypted.data.len(), 100_000);
    assert_eq!(rx.borrow().bytes_processed, 100_000);
}
