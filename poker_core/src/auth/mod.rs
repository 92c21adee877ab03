//! Telegram Mini App identity verification.
//!
//! The client hands us its opaque `initData` string. We verify the
//! HMAC-SHA256 of the sorted `key=value` lines under `SHA256(bot_token)`
//! against the embedded `hash` field, with a constant-time comparison, and
//! only then trust the embedded `user` JSON.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum AuthError {
    #[error("missing initData")]
    MissingInitData,

    #[error("missing hash")]
    MissingHash,

    #[error("bad signature")]
    BadSignature,

    #[error("malformed user payload")]
    MalformedUser,
}

/// The identity fields we extract from verified init data.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUser {
    /// Identity used when no init data is supplied at all.
    pub fn guest() -> Self {
        Self {
            id: 0,
            first_name: "Guest".to_string(),
            username: None,
        }
    }
}

/// Verify `init_data` against `bot_token` and extract the user.
///
/// The data-check string is every `key=value` pair except `hash`, sorted
/// by key and joined with newlines; its HMAC-SHA256 under the SHA256 of
/// the bot token must equal the supplied `hash`.
pub fn verify_init_data(init_data: &str, bot_token: &str) -> Result<TelegramUser, AuthError> {
    if init_data.is_empty() {
        return Err(AuthError::MissingInitData);
    }

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();
    let hash_idx = pairs
        .iter()
        .position(|(k, _)| k == "hash")
        .ok_or(AuthError::MissingHash)?;
    let (_, provided_hash) = pairs.remove(hash_idx);

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let data_check_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let secret_key = Sha256::digest(bot_token.as_bytes());
    let mut mac =
        HmacSha256::new_from_slice(&secret_key).map_err(|_| AuthError::BadSignature)?;
    mac.update(data_check_string.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if !bool::from(expected.as_bytes().ct_eq(provided_hash.as_bytes())) {
        return Err(AuthError::BadSignature);
    }

    let user_json = pairs
        .iter()
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.as_str())
        .unwrap_or("");
    if user_json.is_empty() {
        return Err(AuthError::MalformedUser);
    }
    serde_json::from_str(user_json).map_err(|_| AuthError::MalformedUser)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a valid init-data string the way Telegram would sign it.
    fn signed_init_data(bot_token: &str, user_json: &str, auth_date: &str) -> String {
        let pairs = vec![("auth_date", auth_date), ("user", user_json)];
        let mut sorted = pairs.clone();
        sorted.sort_by_key(|(k, _)| *k);
        let data_check_string = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n");

        let secret_key = Sha256::digest(bot_token.as_bytes());
        let mut mac = HmacSha256::new_from_slice(&secret_key).unwrap();
        mac.update(data_check_string.as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut encoded = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            encoded.append_pair(k, v);
        }
        encoded.append_pair("hash", &hash);
        encoded.finish()
    }

    const TOKEN: &str = "12345:test-bot-token";
    const USER: &str = r#"{"id":777,"first_name":"Ann","username":"ann_dealer"}"#;

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let init_data = signed_init_data(TOKEN, USER, "1700000000");
        let user = verify_init_data(&init_data, TOKEN).unwrap();
        assert_eq!(user.id, 777);
        assert_eq!(user.first_name, "Ann");
        assert_eq!(user.username.as_deref(), Some("ann_dealer"));
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let init_data = signed_init_data(TOKEN, USER, "1700000000");
        let tampered = init_data.replace("Ann", "Eve");
        assert_eq!(
            verify_init_data(&tampered, TOKEN).unwrap_err(),
            AuthError::BadSignature
        );
    }

    #[test]
    fn rejects_a_signature_from_another_bot() {
        let init_data = signed_init_data("999:other-token", USER, "1700000000");
        assert_eq!(
            verify_init_data(&init_data, TOKEN).unwrap_err(),
            AuthError::BadSignature
        );
    }

    #[test]
    fn rejects_missing_hash() {
        assert_eq!(
            verify_init_data("auth_date=1700000000", TOKEN).unwrap_err(),
            AuthError::MissingHash
        );
    }

    #[test]
    fn empty_init_data_is_its_own_error() {
        assert_eq!(
            verify_init_data("", TOKEN).unwrap_err(),
            AuthError::MissingInitData
        );
    }

    #[test]
    fn user_without_username_parses() {
        let user_json = r#"{"id":5,"first_name":"Solo"}"#;
        let init_data = signed_init_data(TOKEN, user_json, "1700000000");
        let user = verify_init_data(&init_data, TOKEN).unwrap();
        assert_eq!(user.id, 5);
        assert_eq!(user.username, None);
    }
}
