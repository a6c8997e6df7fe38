use digest::Digest;
use rand::Rng;
use sha2::Sha256;

/// Number of decimal digits in a voter id
pub const VOTER_ID_DIGITS: usize = 16;

/// Generate a random 16-digit voter id with no leading zero
pub fn generate_voter_id() -> String {
    let mut rng = rand::rngs::OsRng;
    let low = 10u64.pow(VOTER_ID_DIGITS as u32 - 1);
    rng.gen_range(low..low * 10).to_string()
}

/// Hex encoded SHA-256 of a personal identity document number.
///
/// Only this digest of a registrant's identity is ever logged.
pub fn identity_hash(personal_id: &str) -> String {
    hex::encode(Sha256::digest(personal_id.trim().as_bytes()))
}
