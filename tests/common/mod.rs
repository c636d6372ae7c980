//! Shared fixtures: generated keys and signature verification

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use artifact_sign::ResolvedKeyMaterial;
use sequoia_openpgp as openpgp;
use zeroize::Zeroizing;

use openpgp::cert::prelude::*;
use openpgp::crypto::Password;
use openpgp::parse::stream::{
    DetachedVerifierBuilder, MessageLayer, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::SerializeInto;
use openpgp::types::KeyFlags;
use openpgp::KeyHandle;
use tracing_subscriber::fmt::MakeWriter;

pub const PASSPHRASE: &str = "correct horse battery staple";

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn signing_flags() -> KeyFlags {
    KeyFlags::empty().set_certification().set_signing()
}

/// Master-only key able to sign, optionally passphrase protected
pub fn signing_cert(user_id: &str, passphrase: Option<&str>) -> Cert {
    let (cert, _) = CertBuilder::new()
        .add_userid(user_id)
        .set_primary_key_flags(signing_flags())
        .set_password(passphrase.map(Password::from))
        .generate()
        .unwrap();
    cert
}

/// Master created `age` ago, valid for `validity`
pub fn aged_cert(age: Duration, validity: Duration) -> Cert {
    let (cert, _) = CertBuilder::new()
        .add_userid("Aged Key <aged@example.org>")
        .set_primary_key_flags(signing_flags())
        .set_creation_time(SystemTime::now() - age)
        .set_validity_period(validity)
        .generate()
        .unwrap();
    cert
}

/// Master created `age` ago with `master_validity`, plus a signing subkey
/// valid for `subkey_validity`
pub fn cert_with_subkey(age: Duration, master_validity: Duration, subkey_validity: Duration) -> Cert {
    let (cert, _) = CertBuilder::new()
        .add_userid("Master Key <master@example.org>")
        .add_userid("Release Team <release@example.org>")
        .set_creation_time(SystemTime::now() - age)
        .set_validity_period(master_validity)
        .add_subkey(KeyFlags::empty().set_signing(), subkey_validity, None)
        .generate()
        .unwrap();
    cert
}

/// Key id of the first subkey
pub fn subkey_id(cert: &Cert) -> u64 {
    cert.keys()
        .subkeys()
        .next()
        .unwrap()
        .key()
        .keyid()
        .as_u64()
        .unwrap()
}

pub fn primary_id(cert: &Cert) -> u64 {
    cert.keyid().as_u64().unwrap()
}

/// Armored transferable secret key
pub fn armored_secret(cert: &Cert) -> String {
    String::from_utf8(cert.as_tsk().armored().to_vec().unwrap()).unwrap()
}

pub fn binary_secret(cert: &Cert) -> Vec<u8> {
    cert.as_tsk().to_vec().unwrap()
}

pub fn material(bytes: Vec<u8>, key_id: Option<u64>, passphrase: Option<&str>) -> ResolvedKeyMaterial {
    ResolvedKeyMaterial {
        key_id,
        passphrase: passphrase.map(Into::into),
        key_bytes: Zeroizing::new(bytes),
        key_file: None,
    }
}

struct Helper {
    certs: Vec<Cert>,
}

impl VerificationHelper for Helper {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(self.certs.clone())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                if results.iter().any(|r| r.is_ok()) {
                    return Ok(());
                }
                return Err(anyhow::anyhow!("no valid signature: {:?}", results));
            }
        }
        Err(anyhow::anyhow!("no signature found"))
    }
}

/// Verify an armored detached signature over `data`
pub fn verify(cert: &Cert, data: &[u8], signature: &[u8]) -> openpgp::Result<()> {
    verify_reader(cert, data, signature)
}

pub fn verify_reader<R: Read + Send + Sync>(
    cert: &Cert,
    data: R,
    signature: &[u8],
) -> openpgp::Result<()> {
    let policy = StandardPolicy::new();
    let helper = Helper {
        certs: vec![cert.clone()],
    };
    let mut verifier =
        DetachedVerifierBuilder::from_bytes(signature)?.with_policy(&policy, None, helper)?;
    verifier.verify_reader(data)
}

/// Log output collected by a test subscriber
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with warnings and errors captured
pub fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.contents())
}
