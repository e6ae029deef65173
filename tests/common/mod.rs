//! Integration test common infrastructure.
//!
//! Provides utilities for spawning test daemons, minting tokens, and driving
//! WebSocket clients against them.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;

/// Secret written into every test config.
pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Sign a token for `principal`, valid for `ttl_secs` from now.
pub fn mint_token(principal: &str, ttl_secs: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs() as i64;
    let claims = serde_json::json!({
        "id": principal,
        "iat": now,
        "exp": now + ttl_secs,
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("token encoding")
}
