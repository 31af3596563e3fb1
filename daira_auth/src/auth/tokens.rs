//! Signed access and refresh tokens.
//!
//! Tokens are HS256 JWTs over a closed claim set. Signature and structure are
//! checked by [`TokenCodec::decode`]; expiry is checked against the caller's
//! clock so tests can drive time explicitly. Token type and session validity
//! are left to the caller.

use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{
    device::hash_fingerprint,
    errors::{AuthError, AuthResult},
    models::UserId,
};

/// Current claim layout version
pub const CLAIMS_VERSION: u8 = 1;

/// Signing algorithm; fixed to rule out algorithm confusion
const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claim set carried by every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: UserId,
    pub session_id: String,
    pub device_id: String,
    /// Issued at, epoch seconds
    pub iat: i64,
    /// Expiration, epoch seconds
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Unique token id; refresh rotation tracks it on the session row
    pub jti: String,
    pub ver: u8,
}

/// How a missing request fingerprint is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintPolicy {
    /// Absent fingerprint passes; a present one must match
    #[default]
    Advisory,
    /// Fingerprint must be present and match
    Required,
}

impl FromStr for FingerprintPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "advisory" => Ok(FingerprintPolicy::Advisory),
            "required" => Ok(FingerprintPolicy::Required),
            other => Err(format!("unknown fingerprint policy '{}'", other)),
        }
    }
}

/// Token encoder/decoder bound to one signing secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    fingerprint_policy: FingerprintPolicy,
}

impl TokenCodec {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
            fingerprint_policy: FingerprintPolicy::default(),
        }
    }

    pub fn with_fingerprint_policy(mut self, policy: FingerprintPolicy) -> Self {
        self.fingerprint_policy = policy;
        self
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn fingerprint_policy(&self) -> FingerprintPolicy {
        self.fingerprint_policy
    }

    /// Issue an access token expiring `access_ttl_secs` after `now`
    pub fn issue_access(
        &self,
        user_id: UserId,
        session_id: &str,
        device_id: &str,
        now: i64,
    ) -> AuthResult<String> {
        let (token, _) = self.issue(
            TokenType::Access,
            user_id,
            session_id,
            device_id,
            now,
            self.access_ttl_secs,
        )?;
        Ok(token)
    }

    /// Issue a refresh token; returns the token and its `jti`
    pub fn issue_refresh(
        &self,
        user_id: UserId,
        session_id: &str,
        device_id: &str,
        now: i64,
    ) -> AuthResult<(String, String)> {
        self.issue(
            TokenType::Refresh,
            user_id,
            session_id,
            device_id,
            now,
            self.refresh_ttl_secs,
        )
    }

    fn issue(
        &self,
        token_type: TokenType,
        user_id: UserId,
        session_id: &str,
        device_id: &str,
        now: i64,
        ttl_secs: i64,
    ) -> AuthResult<(String, String)> {
        let jti = Uuid::new_v4().to_string();
        let claims = TokenClaims {
            sub: user_id,
            session_id: session_id.to_string(),
            device_id: device_id.to_string(),
            iat: now,
            exp: now + ttl_secs,
            token_type,
            jti: jti.clone(),
            ver: CLAIMS_VERSION,
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenEncoding(e.to_string()))?;

        Ok((token, jti))
    }

    /// Verify signature and structure, then expiry against `now`.
    ///
    /// `Expired` when `exp <= now`; `InvalidToken` for anything else that fails.
    pub fn decode(&self, token: &str, now: i64) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if claims.ver != CLAIMS_VERSION {
            return Err(AuthError::InvalidToken);
        }

        if claims.exp <= now {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }

    /// Whether `request_fingerprint` corroborates the token's device id
    pub fn verify_fingerprint(&self, token_device_id: &str, request_fingerprint: Option<&str>) -> bool {
        match request_fingerprint {
            None => self.fingerprint_policy == FingerprintPolicy::Advisory,
            Some(fingerprint) => {
                let expected = hash_fingerprint(fingerprint);
                token_device_id
                    .as_bytes()
                    .ct_eq(expected.as_bytes())
                    .into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &str = "test-secret-at-least-32-characters-long";
    const NOW: i64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, 900, 30 * 24 * 3600)
    }

    #[test]
    fn test_access_and_refresh_carry_their_type() {
        let codec = codec();
        let access = codec.issue_access(1, "sess", "dev", NOW).unwrap();
        let (refresh, jti) = codec.issue_refresh(1, "sess", "dev", NOW).unwrap();

        let access = codec.decode(&access, NOW).unwrap();
        assert_eq!(access.token_type, TokenType::Access);
        assert_eq!(access.exp, NOW + 900);

        let refresh = codec.decode(&refresh, NOW).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.exp, NOW + 30 * 24 * 3600);
        assert_eq!(refresh.jti, jti);
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let token = codec.issue_access(1, "sess", "dev", NOW).unwrap();

        assert!(codec.decode(&token, NOW + 899).is_ok());
        assert!(matches!(codec.decode(&token, NOW + 900), Err(AuthError::Expired)));
        assert!(matches!(codec.decode(&token, NOW + 10_000), Err(AuthError::Expired)));
    }

    #[test]
    fn test_wrong_secret_and_garbage_are_invalid() {
        let token = codec().issue_access(1, "sess", "dev", NOW).unwrap();
        let other = TokenCodec::new("another-secret-also-32-characters-long", 900, 900);

        assert!(matches!(other.decode(&token, NOW), Err(AuthError::InvalidToken)));
        assert!(matches!(codec().decode("not.a.jwt", NOW), Err(AuthError::InvalidToken)));
        assert!(matches!(codec().decode("", NOW), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let token = codec().issue_access(1, "sess", "dev", NOW).unwrap();
        let forged = codec().issue_access(2, "sess", "dev", NOW).unwrap();

        let original: Vec<&str> = token.split('.').collect();
        let forged_payload = forged.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", original[0], forged_payload, original[2]);

        assert!(matches!(
            codec().decode(&spliced, NOW),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_unknown_claim_shapes_are_rejected() {
        let key = EncodingKey::from_secret(SECRET.as_bytes());
        let header = Header::new(Algorithm::HS256);

        let wrong_version = serde_json::json!({
            "sub": 1, "session_id": "s", "device_id": "d", "iat": NOW, "exp": NOW + 60,
            "type": "access", "jti": "j", "ver": 2
        });
        let token = encode(&header, &wrong_version, &key).unwrap();
        assert!(matches!(codec().decode(&token, NOW), Err(AuthError::InvalidToken)));

        let unknown_type = serde_json::json!({
            "sub": 1, "session_id": "s", "device_id": "d", "iat": NOW, "exp": NOW + 60,
            "type": "admin", "jti": "j", "ver": 1
        });
        let token = encode(&header, &unknown_type, &key).unwrap();
        assert!(matches!(codec().decode(&token, NOW), Err(AuthError::InvalidToken)));

        let extra_claim = serde_json::json!({
            "sub": 1, "session_id": "s", "device_id": "d", "iat": NOW, "exp": NOW + 60,
            "type": "access", "jti": "j", "ver": 1, "is_admin": true
        });
        let token = encode(&header, &extra_claim, &key).unwrap();
        assert!(matches!(codec().decode(&token, NOW), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_fingerprint_policy() {
        let advisory = codec();
        let device_id = hash_fingerprint("fp-123");

        assert!(advisory.verify_fingerprint(&device_id, None));
        assert!(advisory.verify_fingerprint(&device_id, Some("fp-123")));
        assert!(!advisory.verify_fingerprint(&device_id, Some("fp-999")));

        let required = codec().with_fingerprint_policy(FingerprintPolicy::Required);
        assert!(!required.verify_fingerprint(&device_id, None));
        assert!(required.verify_fingerprint(&device_id, Some("fp-123")));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Required".parse::<FingerprintPolicy>(), Ok(FingerprintPolicy::Required));
        assert_eq!("advisory".parse::<FingerprintPolicy>(), Ok(FingerprintPolicy::Advisory));
        assert!("strict".parse::<FingerprintPolicy>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_claims_survive_issue_and_decode(
            user_id in 1i64..i64::MAX / 2,
            session_id in "[A-Za-z0-9_-]{1,64}",
            device_id in "[a-f0-9]{64}",
        ) {
            let codec = codec();

            let access = codec.decode(&codec.issue_access(user_id, &session_id, &device_id, NOW).unwrap(), NOW).unwrap();
            prop_assert_eq!(access.sub, user_id);
            prop_assert_eq!(&access.session_id, &session_id);
            prop_assert_eq!(&access.device_id, &device_id);
            prop_assert_eq!(access.token_type, TokenType::Access);

            let (refresh, _) = codec.issue_refresh(user_id, &session_id, &device_id, NOW).unwrap();
            let refresh = codec.decode(&refresh, NOW).unwrap();
            prop_assert_eq!(refresh.sub, user_id);
            prop_assert_eq!(refresh.session_id, session_id);
            prop_assert_eq!(refresh.token_type, TokenType::Refresh);
        }
    }
}
