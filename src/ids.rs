use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

const CLASS_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CLASS_CODE_LEN: usize = 6;

/// Row identifier: base-36 millisecond timestamp followed by a random suffix.
/// Not guaranteed unique; collisions are only made unlikely.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("{}{}", to_base36(millis), suffix)
}

pub fn generate_class_code() -> String {
    let mut rng = rand::rng();
    (0..CLASS_CODE_LEN)
        .map(|_| CLASS_CODE_ALPHABET[rng.random_range(0..CLASS_CODE_ALPHABET.len())] as char)
        .collect()
}

pub fn generate_temporary_password() -> String {
    let mut rng = rand::rng();
    (0..10)
        .map(|_| {
            let c = CLASS_CODE_ALPHABET[rng.random_range(0..CLASS_CODE_ALPHABET.len())] as char;
            if rng.random_bool(0.5) {
                c.to_ascii_lowercase()
            } else {
                c
            }
        })
        .collect()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while n > 0 {
        out.push(digits[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn class_codes_are_short_uppercase_alphanumerics() {
        for _ in 0..50 {
            let code = generate_class_code();
            assert_eq!(code.len(), CLASS_CODE_LEN);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn ids_start_with_timestamp_prefix() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(a.len() > 9);
    }
}
