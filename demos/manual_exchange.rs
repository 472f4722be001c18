//! Manual exchange walkthrough
//!
//! Plays both people in one process:
//! - Sender and receiver publish hybrid public keys
//! - The sender encapsulates, the receiver decapsulates
//! - Both compare the six-digit verification code
//! - The sender encrypts a file, the receiver decrypts it
//!
//! Run with: cargo run --example manual_exchange

use pqshare_crypto::{
    decrypt_file, encrypt_file_with, EncryptedFile, ExchangeEvent, ExchangeSession,
    FileEncryptionOptions, PeerMaterial, Role, TextEncoding,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("🔐 pqshare - Manual Exchange Example\n");

    // ==================== Key Generation ====================

    let (mut alice, alice_pk) = ExchangeSession::start(Role::Sender, TextEncoding::Base64)?;
    let (mut bob, bob_pk) = ExchangeSession::start(Role::Receiver, TextEncoding::Base64)?;
    println!("🔑 Alice's public key: {}... ({} chars)", &alice_pk[..32], alice_pk.len());
    println!("🔑 Bob's public key:   {}... ({} chars)", &bob_pk[..32], bob_pk.len());

    // ==================== Key Encapsulation ====================

    // Bob's key reaches Alice by whatever channel they picked
    let (to_alice, alice_inbox) = PeerMaterial::channel();
    to_alice
        .send(ExchangeEvent::PeerPublicKey(bob_pk))
        .map_err(|_| anyhow::anyhow!("alice stopped listening"))?;
    let ciphertext = alice
        .await_event(alice_inbox)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no ciphertext produced"))?;
    println!("\n📨 Ciphertext for Bob: {}... ({} chars)", &ciphertext[..32], ciphertext.len());

    let tag = bob
        .handle(ExchangeEvent::PeerCiphertext(ciphertext))?
        .ok_or_else(|| anyhow::anyhow!("no confirmation tag produced"))?;

    // ==================== Verification ====================

    let alice_code = alice.verification_code().unwrap_or_default();
    let bob_code = bob.verification_code().unwrap_or_default();
    println!("\n🔢 Alice sees {}, Bob sees {}", alice_code, bob_code);
    if alice_code != bob_code {
        anyhow::bail!("verification codes differ, someone is in the middle");
    }

    alice.handle(ExchangeEvent::PeerConfirmation(tag))?;
    println!("   ✅ Both sides secured: {:?} / {:?}", alice.state(), bob.state());

    // ==================== File Transfer ====================

    let alice_keys = alice.into_session_keys()?;
    let bob_keys = bob.into_session_keys()?;

    let report: Vec<u8> = "Quarterly numbers\n".repeat(10_000).into_bytes();
    let options = FileEncryptionOptions {
        chunk_size: 64 * 1024,
        ..Default::default()
    };
    let encrypted =
        encrypt_file_with("report.txt", &report, alice_keys.encryption_key(), &options)?;
    let json = encrypted.to_json()?;
    println!(
        "\n📦 Encrypted {} bytes into {} chunks ({} bytes of JSON)",
        report.len(),
        encrypted.chunk_count(),
        json.len()
    );

    let received = EncryptedFile::from_json(&json)?;
    let decrypted = decrypt_file(&received, bob_keys.encryption_key())?;
    println!("📥 Bob decrypted '{}' ({} bytes)", decrypted.name, decrypted.data.len());
    assert_eq!(decrypted.data.as_ref(), report.as_slice());

    // ==================== Tampering ====================

    let mut tampered = received.clone();
    if let Some(chunk) = tampered.chunks.get_mut(1) {
        chunk.ciphertext[0] ^= 0x01;
    }
    match decrypt_file(&tampered, bob_keys.encryption_key()) {
        Ok(_) => println!("   ⚠️  Tampered container was accepted"),
        Err(e) => println!("   ✅ Tampered container rejected: {}", e),
    }

    // The metadata every observer can see
    println!("\n📋 Public metadata:");
    println!("{}", serde_json::to_string_pretty(&received.metadata)?);

    println!("\n✨ Done");
    Ok(())
}
