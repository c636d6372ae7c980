//! Key material resolution tests
//!
//! Precedence between environment, configuration and the settings store,
//! exercised against real files in a temp home directory.

mod common;

use std::fs;

use artifact_sign::config::TomlSettingsStore;
use artifact_sign::env::{MapEnv, SIGN_KEY_ENV, SIGN_KEY_ID_ENV, SIGN_KEY_PASS_ENV};
use artifact_sign::key::MissingKeyFile;
use artifact_sign::{Environment, KeyMaterialRequest, KeyMaterialResolver, KeyRingLoader, SignError};
use common::*;
use tempfile::TempDir;

fn home() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".keys")).unwrap();
    dir
}

fn env_in(home: &TempDir, vars: &[(&str, &str)]) -> Environment {
    let mut env = MapEnv::new().with("HOME", home.path().to_str().unwrap());
    for (name, value) in vars {
        env = env.with(name, value);
    }
    Environment::new(env)
}

fn request(key_id: Option<&str>, passphrase: Option<&str>, key_file: Option<&str>) -> KeyMaterialRequest {
    KeyMaterialRequest {
        server_id: None,
        key_id: key_id.map(String::from),
        passphrase: passphrase.map(Into::into),
        key_file: key_file.map(String::from),
    }
}

// =============================================================================
// Environment over configuration
// =============================================================================

#[test]
fn test_configuration_only() {
    let home = home();
    fs::write(home.path().join(".keys/sign.asc"), b"file-key").unwrap();
    let env = env_in(&home, &[]);

    let material = KeyMaterialResolver::new(&env)
        .resolve(&request(Some("0xABCDEF"), Some("cfg-pass"), Some("~/.keys/sign.asc")))
        .unwrap();

    assert_eq!(material.key_id, Some(0xABCDEF));
    assert_eq!(material.passphrase.as_ref().map(|p| p.expose()), Some("cfg-pass"));
    assert_eq!(material.key_bytes.as_slice(), b"file-key");
}

#[test]
fn test_each_environment_variable_overrides_independently() {
    let home = home();
    fs::write(home.path().join(".keys/sign.asc"), b"file-key").unwrap();
    let req = request(Some("0xABCDEF"), Some("cfg-pass"), Some("~/.keys/sign.asc"));

    let env = env_in(&home, &[(SIGN_KEY_ID_ENV, "1234")]);
    let material = KeyMaterialResolver::new(&env).resolve(&req).unwrap();
    assert_eq!(material.key_id, Some(0x1234));
    assert_eq!(material.passphrase.as_ref().map(|p| p.expose()), Some("cfg-pass"));
    assert_eq!(material.key_bytes.as_slice(), b"file-key");

    let env = env_in(&home, &[(SIGN_KEY_PASS_ENV, "env-pass")]);
    let material = KeyMaterialResolver::new(&env).resolve(&req).unwrap();
    assert_eq!(material.key_id, Some(0xABCDEF));
    assert_eq!(material.passphrase.as_ref().map(|p| p.expose()), Some("env-pass"));

    let env = env_in(&home, &[(SIGN_KEY_ENV, "env-key")]);
    let material = KeyMaterialResolver::new(&env).resolve(&req).unwrap();
    assert_eq!(material.key_bytes.as_slice(), b"env-key");
}

#[test]
fn test_null_and_blank_environment_values_are_ignored() {
    let home = home();
    fs::write(home.path().join(".keys/sign.asc"), b"file-key").unwrap();
    let env = env_in(
        &home,
        &[(SIGN_KEY_ID_ENV, "null"), (SIGN_KEY_PASS_ENV, "  "), (SIGN_KEY_ENV, "")],
    );

    let material = KeyMaterialResolver::new(&env)
        .resolve(&request(Some("FF"), Some("cfg-pass"), Some("~/.keys/sign.asc")))
        .unwrap();

    assert_eq!(material.key_id, Some(0xFF));
    assert_eq!(material.passphrase.as_ref().map(|p| p.expose()), Some("cfg-pass"));
    assert_eq!(material.key_bytes.as_slice(), b"file-key");
}

#[test]
fn test_invalid_key_id_from_environment() {
    let home = home();
    let env = env_in(&home, &[(SIGN_KEY_ID_ENV, "not-hex")]);

    let err = KeyMaterialResolver::new(&env)
        .resolve(&request(None, None, None))
        .unwrap_err();

    assert!(matches!(err, SignError::InvalidKeyId { .. }));
}

// =============================================================================
// Key file handling
// =============================================================================

#[test]
fn test_missing_key_file_policies() {
    let home = home();
    let env = env_in(&home, &[]);
    let req = request(None, None, Some("~/.keys/absent.asc"));

    let material = KeyMaterialResolver::new(&env).resolve(&req).unwrap();
    assert!(!material.is_key_available());
    assert_eq!(
        material.key_file,
        Some(home.path().join(".keys/absent.asc"))
    );
    assert!(material
        .unavailable_error()
        .to_string()
        .contains(&home.path().join(".keys/absent.asc").display().to_string()));

    let err = KeyMaterialResolver::new(&env)
        .missing_key_file(MissingKeyFile::Error)
        .resolve(&req)
        .unwrap_err();
    assert!(err.is_key_unavailable());
    assert!(err.to_string().contains("absent.asc"));
}

#[test]
fn test_no_key_file_configured() {
    let home = home();
    let env = env_in(&home, &[]);

    let material = KeyMaterialResolver::new(&env)
        .missing_key_file(MissingKeyFile::Error)
        .resolve(&request(None, None, None))
        .unwrap();

    assert!(!material.is_key_available());
    assert_eq!(material.key_id, None);
    assert!(material.passphrase.is_none());
}

#[test]
fn test_environment_key_content_loads() {
    let home = home();
    let cert = signing_cert("Env Key <env@example.org>", Some(PASSPHRASE));
    let armored = armored_secret(&cert);
    let env = env_in(&home, &[(SIGN_KEY_ENV, &armored), (SIGN_KEY_PASS_ENV, PASSPHRASE)]);

    let material = KeyMaterialResolver::new(&env)
        .resolve(&request(None, None, Some("~/.keys/absent.asc")))
        .unwrap();
    let key = KeyRingLoader::new().load(&material).unwrap();

    assert_eq!(key.fingerprint(), &cert.fingerprint());
}

// =============================================================================
// Settings store
// =============================================================================

#[test]
fn test_server_record_replaces_configuration() {
    let home = home();
    fs::write(home.path().join(".keys/release.asc"), b"release-key").unwrap();
    let store = TomlSettingsStore::parse(
        r#"
[servers.release]
username = "0x00000000DEADBEEF"
passphrase = "server-pass"
private_key = "~/.keys/release.asc"
"#,
    )
    .unwrap();
    let env = env_in(&home, &[]);

    let mut req = request(Some("0xABCDEF"), Some("cfg-pass"), Some("~/.keys/other.asc"));
    req.server_id = Some("release".to_string());

    let material = KeyMaterialResolver::new(&env)
        .with_settings(&store)
        .resolve(&req)
        .unwrap();

    assert_eq!(material.key_id, Some(0xDEADBEEF));
    assert_eq!(material.passphrase.as_ref().map(|p| p.expose()), Some("server-pass"));
    assert_eq!(material.key_bytes.as_slice(), b"release-key");
}

#[test]
fn test_unknown_server_leaves_fields_unset() {
    let home = home();
    let store = TomlSettingsStore::parse("").unwrap();
    let env = env_in(&home, &[(SIGN_KEY_PASS_ENV, "env-pass")]);

    let mut req = request(Some("0xABCDEF"), Some("cfg-pass"), None);
    req.server_id = Some("missing".to_string());

    let material = KeyMaterialResolver::new(&env)
        .with_settings(&store)
        .resolve(&req)
        .unwrap();

    assert_eq!(material.key_id, None);
    assert_eq!(material.passphrase.as_ref().map(|p| p.expose()), Some("env-pass"));
    assert!(!material.is_key_available());
}
