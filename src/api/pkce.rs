// PKCE helper for S256 challenges (RFC 7636)
use crate::models::{PkceChallenge, CHALLENGE_METHOD};
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const VERIFIER_LEN: usize = 64;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are rejected so every character is equally likely.
const REJECT_FROM: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// Draw a 64-char verifier from `[A-Za-z0-9]` using the OS entropy source.
pub fn generate_code_verifier() -> Result<String, rand::Error> {
    let mut out = String::with_capacity(VERIFIER_LEN);
    let mut buf = [0u8; VERIFIER_LEN];
    while out.len() < VERIFIER_LEN {
        OsRng.try_fill_bytes(&mut buf)?;
        for b in buf.iter().copied().filter(|b| *b < REJECT_FROM) {
            if out.len() == VERIFIER_LEN {
                break;
            }
            out.push(ALPHABET[b as usize % ALPHABET.len()] as char);
        }
    }
    Ok(out)
}

pub fn code_challenge_s256(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// Fresh verifier plus its challenge, one per login attempt.
pub fn generate() -> Result<PkceChallenge, rand::Error> {
    let verifier = generate_code_verifier()?;
    let challenge = code_challenge_s256(&verifier);
    Ok(PkceChallenge {
        verifier,
        challenge,
        method: CHALLENGE_METHOD,
    })
}
