use std::fs;

use rivet_core::config::keys;
use rivet_core::{ConfigError, ConfigValue, Platform, RivetConfig, UnknownGuardPolicy};
use serial_test::serial;

#[test]
fn yaml_values_are_flattened_and_typed() {
    let yaml = r#"
server:
  port: 8080
security:
  jwt:
    secret: "dev-secret"
    issuer: rivet
roles:
  - admin
  - user
"#;
    let config = RivetConfig::from_yaml_str(yaml, "test").unwrap();
    assert_eq!(config.server_port().unwrap(), 8080);
    assert_eq!(config.get::<String>(keys::JWT_SECRET).unwrap(), "dev-secret");
    assert_eq!(config.get::<Vec<String>>("roles").unwrap(), vec!["admin", "user"]);
    assert!(config.get::<Option<String>>(keys::JWT_AUDIENCE).is_err());
}

#[test]
fn set_overrides_and_get_or_defaults() {
    let mut config = RivetConfig::empty();
    assert_eq!(config.get_or("server.workers", 4u32).unwrap(), 4);
    config.set("server.workers", ConfigValue::Integer(2));
    assert_eq!(config.get_or("server.workers", 4u32).unwrap(), 2);

    config.set("server.workers", ConfigValue::String("many".into()));
    assert!(matches!(
        config.get_or("server.workers", 4u32),
        Err(ConfigError::TypeMismatch { .. })
    ));
}

#[test]
#[serial]
fn profile_file_and_environment_layer_over_base() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("application.yaml"),
        "server:\n  port: 3000\nguards:\n  unknown-policy: deny\nplatform: web\n",
    )
    .unwrap();
    fs::write(dir.path().join("application-staging.yaml"), "server:\n  port: 4000\n").unwrap();
    fs::write(dir.path().join(".env"), "SECURITY_JWT_SECRET=from-dotenv\n").unwrap();

    std::env::remove_var("RIVET_PROFILE");
    std::env::remove_var("SECURITY_JWT_SECRET");
    std::env::set_var("GUARDS_UNKNOWN_POLICY", "allow");

    let config = RivetConfig::load_from(dir.path(), "staging").unwrap();
    assert_eq!(config.profile(), "staging");
    assert_eq!(config.server_port().unwrap(), 4000);
    assert_eq!(config.unknown_guard_policy().unwrap(), UnknownGuardPolicy::Allow);
    assert_eq!(config.platform().unwrap(), Some(Platform::Web));
    assert_eq!(config.get::<String>(keys::JWT_SECRET).unwrap(), "from-dotenv");

    std::env::remove_var("GUARDS_UNKNOWN_POLICY");
    std::env::remove_var("SECURITY_JWT_SECRET");
}

#[test]
#[serial]
fn profile_env_var_wins_over_argument() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("application-prod.yaml"), "server:\n  port: 80\n").unwrap();

    std::env::set_var("RIVET_PROFILE", "prod");
    let config = RivetConfig::load_from(dir.path(), "dev").unwrap();
    std::env::remove_var("RIVET_PROFILE");

    assert_eq!(config.profile(), "prod");
    assert_eq!(config.server_port().unwrap(), 80);
}
