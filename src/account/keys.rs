use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

const KEY_LENGTH: usize = 20;

/// Opaque one-time key for activation and password reset links.
pub fn generate_key() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}
