//! Pairing codes shown on unclaimed displays.

use rand::Rng;

pub const CODE_LEN: usize = 4;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const URI_PREFIX: &str = "SIGNAGE://PAIR/";
const PATH_MARKER: &str = "/PAIR/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    #[error("invalid code or display already paired")]
    InvalidCode,
}

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Normalise a typed code or a scanned QR payload.
///
/// Accepted forms: `AB12`, `signage://pair/AB12`, `https://host/pair/AB12`.
pub fn normalize_code(input: &str) -> Result<String, PairingError> {
    let mut code = input.trim().to_uppercase();

    if let Some(rest) = code.strip_prefix(URI_PREFIX) {
        code = rest.to_string();
    }
    if let Some((_, rest)) = code.split_once(PATH_MARKER) {
        code = rest.to_string();
    }
    let code = code.trim_end_matches('/');

    if code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(code.to_string())
    } else {
        Err(PairingError::InvalidCode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_qr_forms() {
        assert_eq!(normalize_code("ab12").unwrap(), "AB12");
        assert_eq!(normalize_code("  AB12\n").unwrap(), "AB12");
        assert_eq!(normalize_code("signage://pair/ab12").unwrap(), "AB12");
        assert_eq!(normalize_code("https://example.com/pair/Ab12").unwrap(), "AB12");
        assert_eq!(normalize_code("https://example.com/pair/AB12/").unwrap(), "AB12");
    }

    #[test]
    fn rejects_bad_lengths_and_symbols() {
        assert_eq!(normalize_code(""), Err(PairingError::InvalidCode));
        assert_eq!(normalize_code("ABC"), Err(PairingError::InvalidCode));
        assert_eq!(normalize_code("ABCDE"), Err(PairingError::InvalidCode));
        assert_eq!(normalize_code("AB-1"), Err(PairingError::InvalidCode));
        assert_eq!(normalize_code("signage://pair/"), Err(PairingError::InvalidCode));
    }

    #[test]
    fn generated_codes_normalize_to_themselves() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), CODE_LEN);
            assert_eq!(normalize_code(&code).unwrap(), code);
        }
    }
}
