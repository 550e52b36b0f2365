use std::sync::Arc;

use anyhow::Context;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::{
        claims::{Claims, Identity},
        repo_types::Account,
    },
    config::{JwtConfig, MAX_TTL_MINUTES},
};

/// Source of "now" for issuing and expiring tokens.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Signs and verifies identity tokens with the process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes.clamp(0, MAX_TTL_MINUTES)),
            clock,
        }
    }

    pub fn issue(&self, account: &Account) -> anyhow::Result<String> {
        let now = self.clock.now();
        let exp = now
            .checked_add(self.ttl)
            .context("token expiry out of range")?;
        let claims = Claims {
            sub: account.id,
            email: account.email.clone(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %account.id, "jwt signed");
        Ok(token)
    }

    /// Returns the identity carried by `token`, or `None` if the token is
    /// malformed, forged, signed with another secret, or expired.
    pub fn verify(&self, token: &str) -> Option<Identity> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
        // expiry is checked against the injected clock below
        validation.validate_exp = false;

        let claims = match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "jwt rejected");
                return None;
            }
        };

        if self.clock.now().unix_timestamp() >= claims.exp {
            debug!(user_id = %claims.sub, "jwt expired");
            return None;
        }

        debug!(user_id = %claims.sub, "jwt verified");
        Some(claims.into())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::macros::datetime;
    use uuid::Uuid;

    /// Clock that tests can move forward.
    pub(crate) struct ManualClock(Mutex<OffsetDateTime>);

    impl ManualClock {
        pub(crate) fn new(at: OffsetDateTime) -> Self {
            Self(Mutex::new(at))
        }

        pub(crate) fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            *self.0.lock().unwrap()
        }
    }

    fn account() -> Account {
        let now = OffsetDateTime::now_utc();
        Account {
            id: Uuid::new_v4(),
            name: "Test User".into(),
            email: "test@example.com".into(),
            password_hash: "irrelevant".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn cfg(secret: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.into(),
            ..JwtConfig::default()
        }
    }

    #[test]
    fn issue_then_verify_returns_identity() {
        let keys = TokenService::new(&cfg("dev-secret"));
        let account = account();
        let token = keys.issue(&account).expect("sign");

        let identity = keys.verify(&token).expect("verify");
        assert_eq!(
            identity,
            Identity {
                account_id: account.id,
                email: account.email,
            }
        );
    }

    #[test]
    fn token_expires_after_seven_days() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 00:00 UTC)));
        let keys = TokenService::with_clock(&cfg("dev-secret"), clock.clone());
        let token = keys.issue(&account()).unwrap();

        clock.advance(Duration::days(7) - Duration::seconds(1));
        assert!(keys.verify(&token).is_some());

        clock.advance(Duration::seconds(1));
        assert!(keys.verify(&token).is_none());
    }

    #[test]
    fn oversized_ttl_does_not_panic() {
        let cfg = JwtConfig {
            ttl_minutes: i64::MAX,
            ..cfg("dev-secret")
        };
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 00:00 UTC)));
        let keys = TokenService::with_clock(&cfg, clock.clone());
        let token = keys.issue(&account()).unwrap();

        clock.advance(Duration::days(365) - Duration::seconds(1));
        assert!(keys.verify(&token).is_some());
        clock.advance(Duration::seconds(1));
        assert!(keys.verify(&token).is_none());
    }

    #[test]
    fn expiry_past_the_calendar_is_an_error() {
        let clock = Arc::new(ManualClock::new(datetime!(9999-12-31 00:00 UTC)));
        let keys = TokenService::with_clock(&cfg("dev-secret"), clock);
        assert!(keys.issue(&account()).is_err());
    }

    #[test]
    fn any_altered_character_invalidates_token() {
        let keys = TokenService::new(&cfg("dev-secret"));
        let token = keys.issue(&account()).unwrap();

        for (i, c) in token.char_indices() {
            let replacement = if c == 'A' { 'B' } else { 'A' };
            let mut tampered = token.clone();
            tampered.replace_range(i..i + c.len_utf8(), &replacement.to_string());
            assert!(
                keys.verify(&tampered).is_none(),
                "tampered token accepted at position {i}"
            );
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let good = TokenService::new(&cfg("secret-one"));
        let bad = TokenService::new(&cfg("secret-two"));
        let token = good.issue(&account()).unwrap();
        assert!(bad.verify(&token).is_none());
    }

    #[test]
    fn wrong_issuer_or_audience_is_rejected() {
        let good = TokenService::new(&cfg("same-secret"));
        let other = TokenService::new(&JwtConfig {
            issuer: "other-iss".into(),
            audience: "other-aud".into(),
            ..cfg("same-secret")
        });
        let token = good.issue(&account()).unwrap();
        assert!(other.verify(&token).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = TokenService::new(&cfg("dev-secret"));
        assert!(keys.verify("").is_none());
        assert!(keys.verify("invalidtoken").is_none());
        assert!(keys.verify("a.b.c").is_none());
    }

    #[test]
    fn foreign_payload_schema_is_rejected() {
        #[derive(serde::Serialize)]
        struct Foreign {
            #[serde(rename = "userId")]
            user_id: String,
            exp: i64,
        }
        let c = cfg("dev-secret");
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Foreign {
                user_id: "abc".into(),
                exp: (OffsetDateTime::now_utc() + Duration::days(1)).unix_timestamp(),
            },
            &EncodingKey::from_secret(c.secret.as_bytes()),
        )
        .unwrap();
        assert!(TokenService::new(&c).verify(&token).is_none());
    }
}
