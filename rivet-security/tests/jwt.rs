use rivet_core::{Identity, TokenError, TokenVerifier};
use rivet_security::{JwtVerifier, SecurityConfig, SecurityError};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

const TEST_SECRET: &str = "rivet-test-secret-do-not-use-in-production";
const TEST_ISSUER: &str = "test-issuer";
const TEST_AUDIENCE: &str = "test-audience";

fn test_config() -> SecurityConfig {
    SecurityConfig::new(TEST_SECRET)
        .with_issuer(TEST_ISSUER)
        .with_audience(TEST_AUDIENCE)
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn sign(claims: &serde_json::Value, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn claims(sub: &str, roles: &[&str], exp: u64) -> serde_json::Value {
    serde_json::json!({
        "sub": sub,
        "roles": roles,
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "exp": exp,
    })
}

fn valid_token(sub: &str, roles: &[&str]) -> String {
    sign(&claims(sub, roles, now() + 3600), TEST_SECRET)
}

#[test]
fn valid_token_builds_user() {
    let verifier = JwtVerifier::new(test_config());
    let user = verifier.validate(&valid_token("user-1", &["admin"])).unwrap();
    assert_eq!(user.sub, "user-1");
    assert_eq!(user.roles, vec!["admin"]);
    assert_eq!(user.claims["iss"], TEST_ISSUER);
}

#[test]
fn expired_token_is_classified() {
    let verifier = JwtVerifier::new(test_config());
    let token = sign(&claims("user-1", &[], now() - 3600), TEST_SECRET);
    assert_eq!(verifier.validate(&token).unwrap_err(), SecurityError::TokenExpired);
}

#[test]
fn garbage_is_malformed() {
    let verifier = JwtVerifier::new(test_config());
    let err = verifier.validate("not-a-jwt").unwrap_err();
    assert!(matches!(err, SecurityError::MalformedToken(_)), "got {err}");
}

#[test]
fn wrong_secret_is_invalid() {
    let verifier = JwtVerifier::new(test_config());
    let token = sign(&claims("user-1", &[], now() + 3600), "another-secret");
    assert!(matches!(
        verifier.validate(&token).unwrap_err(),
        SecurityError::InvalidToken(_)
    ));
}

#[test]
fn issuer_and_audience_are_enforced() {
    let verifier = JwtVerifier::new(test_config());

    let mut wrong_iss = claims("user-1", &[], now() + 3600);
    wrong_iss["iss"] = "someone-else".into();
    assert_eq!(
        verifier.validate(&sign(&wrong_iss, TEST_SECRET)).unwrap_err(),
        SecurityError::ValidationFailed("Invalid issuer".into())
    );

    let mut wrong_aud = claims("user-1", &[], now() + 3600);
    wrong_aud["aud"] = "other-api".into();
    assert_eq!(
        verifier.validate(&sign(&wrong_aud, TEST_SECRET)).unwrap_err(),
        SecurityError::ValidationFailed("Invalid audience".into())
    );
}

#[test]
fn unconfigured_audience_is_not_checked() {
    let verifier = JwtVerifier::new(SecurityConfig::new(TEST_SECRET));
    let mut any_aud = claims("user-1", &[], now() + 3600);
    any_aud["aud"] = "whatever".into();
    assert!(verifier.validate(&sign(&any_aud, TEST_SECRET)).is_ok());
}

#[test]
fn disallowed_algorithm_is_rejected() {
    let verifier = JwtVerifier::new(test_config().with_allowed_algorithms([Algorithm::HS512]));
    let err = verifier.validate(&valid_token("user-1", &[])).unwrap_err();
    assert!(matches!(err, SecurityError::InvalidToken(msg) if msg.contains("HS256")));
}

#[tokio::test]
async fn token_verifier_maps_errors_for_guards() {
    let verifier = JwtVerifier::new(test_config());

    let principal = verifier.verify(&valid_token("user-9", &["user"])).await.unwrap();
    assert_eq!(principal.sub(), "user-9");
    assert_eq!(principal.roles(), ["user".to_string()]);

    let expired = sign(&claims("user-9", &[], now() - 3600), TEST_SECRET);
    assert_eq!(verifier.verify(&expired).await.err(), Some(TokenError::Expired));

    assert!(matches!(
        verifier.verify("x.y").await.err(),
        Some(TokenError::Malformed(_))
    ));
}
