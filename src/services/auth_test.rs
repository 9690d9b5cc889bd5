use super::*;

#[test]
fn hash_then_verify() {
    let hash = hash_password("correct horse").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(verify_password("correct horse", &hash));
    assert!(!verify_password("wrong horse", &hash));
}

#[test]
fn hashes_are_salted() {
    let a = hash_password("same-password").unwrap();
    let b = hash_password("same-password").unwrap();
    assert_ne!(a, b);
    assert!(verify_password("same-password", &a));
    assert!(verify_password("same-password", &b));
}

#[test]
fn malformed_hash_never_verifies() {
    assert!(!verify_password("anything", "not-a-phc-string"));
    assert!(!verify_password("anything", ""));
}

#[test]
fn password_strength_counts_characters() {
    assert!(matches!(check_password_strength("12345"), Err(AuthError::WeakPassword)));
    assert!(check_password_strength("123456").is_ok());
    assert!(check_password_strength("éééééé").is_ok());
}

#[test]
fn email_is_normalized_and_checked() {
    assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
    for bad in ["", "alice", "@example.com", "alice@localhost", "alice@.com"] {
        assert!(matches!(normalize_email(bad), Err(AuthError::InvalidEmail)), "{bad:?}");
    }
}
