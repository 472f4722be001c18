//! Benchmarks for pqshare-crypto

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pqshare_crypto::{
    chunked::{decrypt_file, encrypt_file_with, FileEncryptionOptions},
    hashing::hash,
    hybrid_kem::{decapsulate, encapsulate, HybridCiphertext, HybridKeypair},
    keys::SymmetricKey,
    symmetric::{Aead, AeadCipher, Nonce},
};

fn bench_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashing");

    for size in [1024, 64 * 1024, 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("blake3", size), &data, |b, data| {
            b.iter(|| hash(data))
        });
    }

    group.finish();
}

fn bench_symmetric(c: &mut Criterion) {
    let mut group = c.benchmark_group("symmetric");
    let key = SymmetricKey::generate();
    let nonce = Nonce::from_counter(0, 0);

    for cipher in [AeadCipher::Aes256Gcm, AeadCipher::ChaCha20Poly1305] {
        let aead = Aead::new(&key, cipher);
        for size in [1024, 64 * 1024, 1024 * 1024].iter() {
            let data = vec![0u8; *size];
            group.throughput(Throughput::Bytes(*size as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{}-seal", cipher.algorithm_id()), size),
                &data,
                |b, data| b.iter(|| aead.encrypt_detached(&nonce, data, b"bench").unwrap()),
            );
        }
    }

    group.finish();
}

fn bench_hybrid_kem(c: &mut Criterion) {
    let mut group = c.benchmark_group("hybrid_kem");
    let receiver = HybridKeypair::generate().unwrap();

    group.bench_function("keygen", |b| b.iter(|| HybridKeypair::generate().unwrap()));
    group.bench_function("encapsulate", |b| {
        b.iter(|| encapsulate(receiver.public_key()).unwrap())
    });

    let (ciphertext, _) = encapsulate(receiver.public_key()).unwrap();
    let bytes = ciphertext.to_bytes();
    group.bench_function("decapsulate", |b| {
        b.iter(|| {
            let ct = HybridCiphertext::from_bytes(&bytes).unwrap();
            decapsulate(ct, &receiver).unwrap()
        })
    });

    group.finish();
}

fn bench_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("file");
    let key = SymmetricKey::generate();
    let options = FileEncryptionOptions::default();

    for size in [64 * 1024, 1024 * 1024, 8 * 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt", size), &data, |b, data| {
            b.iter(|| encrypt_file_with("bench.bin", data, &key, &options).unwrap())
        });

        let file = encrypt_file_with("bench.bin", &data, &key, &options).unwrap();
        group.bench_with_input(BenchmarkId::new("decrypt", size), &file, |b, file| {
            b.iter(|| decrypt_file(file, &key).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_hashing,
    bench_symmetric,
    bench_hybrid_kem,
    bench_file
);
criterion_main!(benches);
