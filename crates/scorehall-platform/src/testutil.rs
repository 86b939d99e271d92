//! Shared fixtures for unit tests: a throwaway RSA key pair, token signing
//! and a config rooted in a scratch directory.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use scorehall_core::ScoreHallConfig;

pub const PUBLIC_KEY_FILE: &str = "public.pem";

struct TestKeys {
    private_pem: String,
    public_pem: String,
}

// 2048 bits: ring refuses smaller RSA keys.
static KEYS: LazyLock<TestKeys> = LazyLock::new(|| {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    TestKeys {
        private_pem: key.to_pkcs1_pem(LineEnding::LF).unwrap().to_string(),
        public_pem: key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap(),
    }
});

/// Write the verification key into `dir` and return its path.
pub fn write_public_key(dir: &Path) -> PathBuf {
    let path = dir.join(PUBLIC_KEY_FILE);
    std::fs::write(&path, &KEYS.public_pem).unwrap();
    path
}

/// RS256-sign arbitrary claims with the test key.
pub fn sign(claims: &serde_json::Value) -> String {
    let key = EncodingKey::from_rsa_pem(KEYS.private_pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

/// HS256-sign claims; must never be accepted.
pub fn sign_hs256(claims: &serde_json::Value) -> String {
    encode(&Header::default(), claims, &EncodingKey::from_secret(b"not-the-key")).unwrap()
}

/// Config whose registry, shards and key file all live under `dir`.
pub fn config(dir: &Path) -> ScoreHallConfig {
    let mut config = ScoreHallConfig::default();
    config.registry.path = dir.join("registry.db").display().to_string();
    config.tenant.db_dir = dir.join("tenant_db").display().to_string();
    config.auth.jwt_key_file = write_public_key(dir).display().to_string();
    config
}
