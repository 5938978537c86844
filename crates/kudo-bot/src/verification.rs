use rand::{Rng, distr::Alphanumeric};

/// One-time verification codes: 12 characters from [A-Za-z0-9].
pub const CODE_LEN: usize = 12;

pub fn mint_code() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(CODE_LEN)
        .map(char::from)
        .collect()
}

pub fn verify_url(public_base_url: &str, code: &str) -> String {
    format!("{}/verify/{}", public_base_url.trim_end_matches('/'), code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_fixed_length_and_alphabet() {
        for _ in 0..50 {
            let code = mint_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn codes_are_unique_enough() {
        let a = mint_code();
        let b = mint_code();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_url_joins_cleanly() {
        assert_eq!(
            verify_url("http://localhost:5000", "abc123"),
            "http://localhost:5000/verify/abc123"
        );
        assert_eq!(
            verify_url("https://kudo.example/", "abc123"),
            "https://kudo.example/verify/abc123"
        );
    }
}
