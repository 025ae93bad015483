// test-only module included via auth/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::auth::handshake::*;
use crate::error::ProtocolError;
use crate::store::UserRecord;

fn registered_user(username: &str, password: &str) -> UserRecord {
    let signup = signup(username, password);
    UserRecord {
        username: signup.username,
        salt: signup.salt,
        verifier: signup.verifier,
    }
}

#[test]
fn full_handshake_derives_matching_keys() {
    let user = registered_user("Mats", "Test");

    // =================== Step 1: client announces itself ===================
    let (client_state, initial) = client_begin("Mats");
    assert_eq!(initial.username, "Mats");

    // =================== Step 2: server challenges ===================
    let (server_state, challenge) =
        server_respond(&user, &initial).expect("Server challenge should succeed");
    assert_eq!(challenge.salt, user.salt);

    // =================== Step 3: client proves ===================
    let (client_state, proof) =
        client_prove(client_state, "Test", &challenge).expect("Client proof should succeed");

    // =================== Step 4: server verifies, derives args ===================
    let (server_args, server_proof) =
        server_verify(server_state, &proof).expect("Server verification should succeed");

    // =================== Step 5: client verifies server ===================
    let client_args =
        client_finish(client_state, &server_proof).expect("Client finish should succeed");

    // Both sides must hold the identical session key and salt.
    assert_eq!(server_args, client_args);
    assert_eq!(server_args.salt, user.salt);

    // And the args must build a working cipher on both ends.
    let enc = server_args.envelope().unwrap();
    let dec = client_args.envelope().unwrap();
    let ciphertext = enc.encrypt(b"liveness").unwrap();
    assert_eq!(dec.decrypt(&ciphertext).unwrap(), b"liveness");
}

#[test]
fn wrong_password_fails_at_server_verification() {
    let user = registered_user("Mats", "Test");

    let (client_state, initial) = client_begin("Mats");
    let (server_state, challenge) = server_respond(&user, &initial).unwrap();

    // Client uses the wrong password: its proof cannot match the verifier.
    let (_client_state, bad_proof) = client_prove(client_state, "Wrong", &challenge).unwrap();

    let result = server_verify(server_state, &bad_proof);
    assert!(matches!(result, Err(ProtocolError::AuthenticationFailed)));
}

#[test]
fn tampered_server_proof_fails_client_finish() {
    let user = registered_user("Mats", "Test");

    let (client_state, initial) = client_begin("Mats");
    let (server_state, challenge) = server_respond(&user, &initial).unwrap();
    let (client_state, proof) = client_prove(client_state, "Test", &challenge).unwrap();
    let (_args, mut server_proof) = server_verify(server_state, &proof).unwrap();

    server_proof.proof[0] ^= 0xFF;

    assert!(matches!(
        client_finish(client_state, &server_proof),
        Err(ProtocolError::AuthenticationFailed)
    ));
}

#[test]
fn concurrent_handshakes_stay_isolated() {
    let user = registered_user("Mats", "Test");

    let (c1, i1) = client_begin("Mats");
    let (c2, i2) = client_begin("Mats");

    // Fresh ephemerals per attempt.
    assert_ne!(i1.public_ephemeral, i2.public_ephemeral);

    let (s1, ch1) = server_respond(&user, &i1).unwrap();
    let (s2, ch2) = server_respond(&user, &i2).unwrap();
    assert_ne!(ch1.public_ephemeral, ch2.public_ephemeral);

    let (c1, p1) = client_prove(c1, "Test", &ch1).unwrap();
    let (c2, p2) = client_prove(c2, "Test", &ch2).unwrap();

    let (a1, sp1) = server_verify(s1, &p1).unwrap();
    let (a2, sp2) = server_verify(s2, &p2).unwrap();

    assert_eq!(client_finish(c1, &sp1).unwrap(), a1);
    assert_eq!(client_finish(c2, &sp2).unwrap(), a2);

    // Different handshakes derive different session keys.
    assert_ne!(a1.key, a2.key);
}

#[test]
fn corrupt_stored_verifier_fails_uniformly() {
    let mut user = registered_user("Mats", "Test");
    user.verifier = "zz-not-hex".into();

    let (_state, initial) = client_begin("Mats");
    assert!(matches!(
        server_respond(&user, &initial),
        Err(ProtocolError::AuthenticationFailed)
    ));
}
