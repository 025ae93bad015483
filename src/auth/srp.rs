//! SRP6 primitives.
//!
//! Thin layer over the `srp` crate: SHA-1 digest with the 2048-bit group,
//! plus the random material the handshake needs. Signup-time verifier
//! computation lives here so clients and provisioning tools share it.

use rand::rngs::OsRng;
use rand::RngCore;
use sha1::Sha1;
use srp::client::SrpClient;
use srp::groups::G_2048;
use srp::server::SrpServer;

/// Private ephemeral size in bytes (512-bit `a`/`b`).
pub const EPHEMERAL_LEN: usize = 64;

/// Salt size in bytes.
pub const SALT_LEN: usize = 32;

/// Client half of the SRP exchange.
pub fn client() -> SrpClient<'static, Sha1> {
    SrpClient::new(&G_2048)
}

/// Server half of the SRP exchange.
pub fn server() -> SrpServer<'static, Sha1> {
    SrpServer::new(&G_2048)
}

/// Random private ephemeral for one handshake attempt.
pub fn generate_private_ephemeral() -> [u8; EPHEMERAL_LEN] {
    let mut bytes = [0u8; EPHEMERAL_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Random signup salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut bytes = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Password verifier for storage at signup time. The server keeps this in
/// place of the password and can validate proofs without ever learning it.
pub fn compute_verifier(username: &str, password: &str, salt: &[u8]) -> Vec<u8> {
    client().compute_verifier(username.as_bytes(), password.as_bytes(), salt)
}
