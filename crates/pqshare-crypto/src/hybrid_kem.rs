//! Hybrid Post-Quantum Key Encapsulation
//!
//! One closed suite combining:
//! - **Kyber768** (round-3 Kyber with ML-KEM-768 parameter sizes) for
//!   post-quantum security. This is not the FIPS 203 encoding, so keys do not
//!   interoperate with ML-KEM implementations.
//! - **X25519** for classical security
//!
//! Both shared secrets are concatenated and fed through HKDF-SHA256, so the
//! result stays secret as long as either primitive holds.
//!
//! # Wire Format
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Hybrid Public Key                             │
//! ├──────────────────────────────────────┬────────────────────────────┤
//! │  Kyber768 public (1184 bytes)        │  X25519 public (32 bytes)  │
//! └──────────────────────────────────────┴────────────────────────────┘
//! Total: 1216 bytes
//!
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Hybrid Ciphertext                             │
//! ├──────────────────────────────────────┬────────────────────────────┤
//! │  Kyber768 ciphertext (1088 bytes)    │  X25519 ephemeral (32 b)   │
//! └──────────────────────────────────────┴────────────────────────────┘
//! Total: 1120 bytes
//! ```
//!
//! Every length check happens while parsing, before any primitive runs.

use crate::{constant_time::ct_eq, encoding::TextEncoding, CryptoError, Result};
use hkdf::Hkdf;
use pqc_kyber::{
    decapsulate as kyber_decapsulate, encapsulate as kyber_encapsulate,
    keypair as kyber_keypair, KYBER_CIPHERTEXTBYTES, KYBER_PUBLICKEYBYTES,
    KYBER_SECRETKEYBYTES, KYBER_SSBYTES,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, instrument, warn};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the Kyber768 public key
pub const MLKEM_PUBLIC_KEY_SIZE: usize = KYBER_PUBLICKEYBYTES;

/// Size of the Kyber768 secret key
pub const MLKEM_SECRET_KEY_SIZE: usize = KYBER_SECRETKEYBYTES;

/// Size of the Kyber768 ciphertext
pub const MLKEM_CIPHERTEXT_SIZE: usize = KYBER_CIPHERTEXTBYTES;

/// Size of an X25519 public key
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of the serialized hybrid public key
pub const HYBRID_PUBLIC_KEY_SIZE: usize = MLKEM_PUBLIC_KEY_SIZE + X25519_PUBLIC_KEY_SIZE;

/// Size of the serialized hybrid ciphertext
pub const HYBRID_CIPHERTEXT_SIZE: usize = MLKEM_CIPHERTEXT_SIZE + X25519_PUBLIC_KEY_SIZE;

/// Size of the combined shared secret
pub const SHARED_SECRET_SIZE: usize = 32;

const COMBINER_SALT: &[u8] = b"pqshare/v1/mlkem768-x25519";
const COMBINER_INFO: &[u8] = b"pqshare/v1/shared-secret";

/// The key-establishment suites this crate speaks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    /// Kyber768 combined with X25519
    #[default]
    #[serde(rename = "mlkem768-x25519")]
    MlKem768X25519,
}

impl CipherSuite {
    /// Stable identifier recorded in containers
    pub fn id(&self) -> &'static str {
        match self {
            Self::MlKem768X25519 => "mlkem768-x25519",
        }
    }

    /// Generate a keypair for this suite
    pub fn generate_keypair(&self) -> Result<HybridKeypair> {
        match self {
            Self::MlKem768X25519 => HybridKeypair::generate(),
        }
    }
}

impl std::fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A hybrid public key, safe to publish
#[derive(Clone, PartialEq, Eq)]
pub struct HybridPublicKey {
    lattice: [u8; MLKEM_PUBLIC_KEY_SIZE],
    curve: [u8; X25519_PUBLIC_KEY_SIZE],
}

impl HybridPublicKey {
    /// Parse `lattice || curve`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HYBRID_PUBLIC_KEY_SIZE {
            return Err(CryptoError::Serialization(format!(
                "hybrid public key must be {} bytes, got {}",
                HYBRID_PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }

        let mut lattice = [0u8; MLKEM_PUBLIC_KEY_SIZE];
        let mut curve = [0u8; X25519_PUBLIC_KEY_SIZE];
        lattice.copy_from_slice(&bytes[..MLKEM_PUBLIC_KEY_SIZE]);
        curve.copy_from_slice(&bytes[MLKEM_PUBLIC_KEY_SIZE..]);

        Ok(Self { lattice, curve })
    }

    /// Serialize as `lattice || curve`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HYBRID_PUBLIC_KEY_SIZE);
        bytes.extend_from_slice(&self.lattice);
        bytes.extend_from_slice(&self.curve);
        bytes
    }

    pub fn to_text(&self, encoding: TextEncoding) -> String {
        encoding.encode(&self.to_bytes())
    }

    pub fn from_text(text: &str, encoding: TextEncoding) -> Result<Self> {
        Self::from_bytes(&encoding.decode(text)?)
    }
}

impl std::fmt::Debug for HybridPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HybridPublicKey(mlkem768+x25519, curve={})",
            hex::encode(&self.curve[..8])
        )
    }
}

/// A hybrid keypair owned by the party that generated it
///
/// Secret halves are wiped when the keypair is dropped.
pub struct HybridKeypair {
    public: HybridPublicKey,
    lattice_secret: Zeroizing<[u8; MLKEM_SECRET_KEY_SIZE]>,
    curve_secret: StaticSecret,
}

impl HybridKeypair {
    /// Generate independent Kyber768 and X25519 keypairs from the OS CSPRNG
    pub fn generate() -> Result<Self> {
        let mut kyber = kyber_keypair(&mut OsRng)
            .map_err(|e| CryptoError::Generation(format!("Kyber768 keygen: {:?}", e)))?;
        let lattice_secret = Zeroizing::new(kyber.secret);
        kyber.secret.zeroize();

        let mut seed = Zeroizing::new([0u8; 32]);
        getrandom::getrandom(seed.as_mut_slice())
            .map_err(|e| CryptoError::Generation(format!("X25519 keygen: {}", e)))?;
        let curve_secret = StaticSecret::from(*seed);
        let curve_public = X25519Public::from(&curve_secret);

        Ok(Self {
            public: HybridPublicKey {
                lattice: kyber.public,
                curve: *curve_public.as_bytes(),
            },
            lattice_secret,
            curve_secret,
        })
    }

    /// Get the public half
    pub fn public_key(&self) -> &HybridPublicKey {
        &self.public
    }
}

impl std::fmt::Debug for HybridKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HybridKeypair({:?}, secret=[REDACTED])", self.public)
    }
}

/// Output of one encapsulation
///
/// Not `Clone`: decapsulation takes it by value so it is used at most once.
pub struct HybridCiphertext {
    lattice: [u8; MLKEM_CIPHERTEXT_SIZE],
    curve_ephemeral: [u8; X25519_PUBLIC_KEY_SIZE],
}

impl HybridCiphertext {
    /// Build from separately transported components
    pub fn from_parts(lattice: &[u8], curve_ephemeral: &[u8]) -> Result<Self> {
        if lattice.len() != MLKEM_CIPHERTEXT_SIZE {
            return Err(CryptoError::Serialization(format!(
                "lattice ciphertext must be {} bytes, got {}",
                MLKEM_CIPHERTEXT_SIZE,
                lattice.len()
            )));
        }
        if curve_ephemeral.len() != X25519_PUBLIC_KEY_SIZE {
            return Err(CryptoError::Serialization(format!(
                "curve ephemeral key must be {} bytes, got {}",
                X25519_PUBLIC_KEY_SIZE,
                curve_ephemeral.len()
            )));
        }

        let mut ct = Self {
            lattice: [0u8; MLKEM_CIPHERTEXT_SIZE],
            curve_ephemeral: [0u8; X25519_PUBLIC_KEY_SIZE],
        };
        ct.lattice.copy_from_slice(lattice);
        ct.curve_ephemeral.copy_from_slice(curve_ephemeral);
        Ok(ct)
    }

    /// Parse `lattice || curve_ephemeral`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HYBRID_CIPHERTEXT_SIZE {
            return Err(CryptoError::Serialization(format!(
                "hybrid ciphertext must be {} bytes, got {}",
                HYBRID_CIPHERTEXT_SIZE,
                bytes.len()
            )));
        }
        let (lattice, curve) = bytes.split_at(MLKEM_CIPHERTEXT_SIZE);
        Self::from_parts(lattice, curve)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HYBRID_CIPHERTEXT_SIZE);
        bytes.extend_from_slice(&self.lattice);
        bytes.extend_from_slice(&self.curve_ephemeral);
        bytes
    }

    pub fn to_text(&self, encoding: TextEncoding) -> String {
        encoding.encode(&self.to_bytes())
    }

    pub fn from_text(text: &str, encoding: TextEncoding) -> Result<Self> {
        Self::from_bytes(&encoding.decode(text)?)
    }

    pub fn lattice_bytes(&self) -> &[u8; MLKEM_CIPHERTEXT_SIZE] {
        &self.lattice
    }

    pub fn curve_ephemeral_bytes(&self) -> &[u8; X25519_PUBLIC_KEY_SIZE] {
        &self.curve_ephemeral
    }
}

impl std::fmt::Debug for HybridCiphertext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HybridCiphertext({} bytes)", HYBRID_CIPHERTEXT_SIZE)
    }
}

/// The combined 32-byte secret both peers end up holding
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; SHARED_SECRET_SIZE],
}

impl SharedSecret {
    /// Get the raw secret bytes
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.bytes
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.bytes, &other.bytes)
    }
}

impl Eq for SharedSecret {}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

/// Encapsulate a fresh shared secret to the recipient (sender side)
///
/// Runs Kyber768 encapsulation and an ephemeral X25519 exchange, then
/// combines `mlkem_ss || x25519_ss` with HKDF-SHA256. Nothing is returned on
/// failure.
#[instrument(skip_all)]
pub fn encapsulate(recipient: &HybridPublicKey) -> Result<(HybridCiphertext, SharedSecret)> {
    let (lattice_ct, lattice_ss) = kyber_encapsulate(&recipient.lattice, &mut OsRng)
        .map_err(|e| CryptoError::Encapsulation(format!("Kyber768: {:?}", e)))?;
    let lattice_ss = Zeroizing::new(lattice_ss);

    let mut seed = Zeroizing::new([0u8; 32]);
    getrandom::getrandom(seed.as_mut_slice())
        .map_err(|e| CryptoError::Generation(format!("X25519 ephemeral: {}", e)))?;
    let ephemeral_secret = StaticSecret::from(*seed);
    let ephemeral_public = X25519Public::from(&ephemeral_secret);

    let curve_ss = ephemeral_secret.diffie_hellman(&X25519Public::from(recipient.curve));
    if !curve_ss.was_contributory() {
        warn!("recipient X25519 key is a low-order point");
        return Err(CryptoError::Encapsulation(
            "recipient X25519 key is not a valid public key".to_string(),
        ));
    }

    let shared = combine(
        &lattice_ss[..],
        curve_ss.as_bytes(),
        ephemeral_public.as_bytes(),
        &recipient.curve,
    )
    .map_err(|e| CryptoError::Encapsulation(format!("combiner: {}", e)))?;

    debug!("hybrid encapsulation complete");
    Ok((
        HybridCiphertext {
            lattice: lattice_ct,
            curve_ephemeral: *ephemeral_public.as_bytes(),
        },
        shared,
    ))
}

/// Recover the shared secret from a ciphertext (receiver side)
///
/// Kyber decapsulation uses implicit rejection: a ciphertext for another key
/// yields an unrelated secret rather than an error. Errors are reserved for
/// structurally invalid input.
#[instrument(skip_all)]
pub fn decapsulate(ciphertext: HybridCiphertext, keypair: &HybridKeypair) -> Result<SharedSecret> {
    let lattice_ss = kyber_decapsulate(&ciphertext.lattice, &keypair.lattice_secret[..])
        .map_err(|e| CryptoError::Decapsulation(format!("Kyber768: {:?}", e)))?;
    let lattice_ss = Zeroizing::new(lattice_ss);

    let curve_ss = keypair
        .curve_secret
        .diffie_hellman(&X25519Public::from(ciphertext.curve_ephemeral));
    if !curve_ss.was_contributory() {
        warn!("ephemeral X25519 key is a low-order point");
        return Err(CryptoError::Decapsulation(
            "ephemeral X25519 key is not a valid public key".to_string(),
        ));
    }

    let shared = combine(
        &lattice_ss[..],
        curve_ss.as_bytes(),
        &ciphertext.curve_ephemeral,
        &keypair.public.curve,
    )
    .map_err(|e| CryptoError::Decapsulation(format!("combiner: {}", e)))?;

    debug!("hybrid decapsulation complete");
    Ok(shared)
}

/// HKDF-SHA256 over `lattice_ss || curve_ss`, with both X25519 public keys in
/// the info so the secret is bound to this exchange's transcript
fn combine(
    lattice_ss: &[u8],
    curve_ss: &[u8],
    ephemeral_public: &[u8; X25519_PUBLIC_KEY_SIZE],
    recipient_public: &[u8; X25519_PUBLIC_KEY_SIZE],
) -> std::result::Result<SharedSecret, hkdf::InvalidLength> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(KYBER_SSBYTES + 32));
    ikm.extend_from_slice(lattice_ss);
    ikm.extend_from_slice(curve_ss);

    let mut info = Vec::with_capacity(COMBINER_INFO.len() + 2 * X25519_PUBLIC_KEY_SIZE);
    info.extend_from_slice(COMBINER_INFO);
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);

    let hk = Hkdf::<Sha256>::new(Some(COMBINER_SALT), &ikm);
    let mut shared = SharedSecret {
        bytes: [0u8; SHARED_SECRET_SIZE],
    };
    hk.expand(&info, &mut shared.bytes)?;
    Ok(shared)
}
