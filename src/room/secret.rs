//! 비공개 방 비밀번호 해시 (HMAC-SHA1)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

fn mac_for(pepper: &str, room_id: &str, secret: &str) -> HmacSha1 {
    let mut mac =
        HmacSha1::new_from_slice(pepper.as_bytes()).expect("HMAC can take key of any size");
    mac.update(room_id.as_bytes());
    mac.update(b":");
    mac.update(secret.as_bytes());
    mac
}

/// 빈 비밀번호는 공개 방으로 취급
pub fn hash_secret(pepper: &str, room_id: &str, secret: Option<&str>) -> Option<String> {
    let secret = secret.map(str::trim).filter(|s| !s.is_empty())?;
    Some(BASE64.encode(mac_for(pepper, room_id, secret).finalize().into_bytes()))
}

/// 상수 시간 비교
pub fn verify_secret(pepper: &str, room_id: &str, attempt: Option<&str>, hash: &str) -> bool {
    let Some(attempt) = attempt.map(str::trim) else {
        return false;
    };
    let Ok(expected) = BASE64.decode(hash) else {
        return false;
    };
    mac_for(pepper, room_id, attempt).verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secret_verifies() {
        let hash = hash_secret("pepper", "abc", Some("hunter2")).unwrap();
        assert!(verify_secret("pepper", "abc", Some("hunter2"), &hash));
        assert!(verify_secret("pepper", "abc", Some(" hunter2 "), &hash));
    }

    #[test]
    fn wrong_secret_room_or_pepper_fails() {
        let hash = hash_secret("pepper", "abc", Some("hunter2")).unwrap();
        assert!(!verify_secret("pepper", "abc", Some("hunter3"), &hash));
        assert!(!verify_secret("pepper", "abd", Some("hunter2"), &hash));
        assert!(!verify_secret("other", "abc", Some("hunter2"), &hash));
        assert!(!verify_secret("pepper", "abc", None, &hash));
    }

    #[test]
    fn blank_secret_means_public() {
        assert_eq!(hash_secret("pepper", "abc", Some("  ")), None);
        assert_eq!(hash_secret("pepper", "abc", None), None);
    }
}
