//! Signing key selection and unlocking
//!
//! Turns resolved key bytes into a [`LoadedSigningKey`]: picks the key,
//! checks passphrase consistency and expiry of the key and its master,
//! decrypts the secret and prepares the signature template shared by every
//! signature of the session.

use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use sequoia_openpgp as openpgp;
use tracing::{info, warn};

use openpgp::cert::Cert;
use openpgp::crypto::{KeyPair, Password};
use openpgp::packet::signature::SignatureBuilder;
use openpgp::policy::StandardPolicy;
use openpgp::types::SignatureType;
use openpgp::Fingerprint;

use super::material::ResolvedKeyMaterial;
use super::ring::{KeyEntry, KeyRingCollection, PrivateMaterial};
use crate::error::{KeyRole, SignError, SignResult};

/// `0x` followed by 16 upper-case hex digits
pub fn format_key_id(key_id: u64) -> String {
    format!("0x{:016X}", key_id)
}

/// `0x` followed by the upper-case hex fingerprint
pub fn format_fingerprint(fingerprint: &Fingerprint) -> String {
    format!("0x{}", fingerprint.to_hex())
}

/// Key ready for signing, read-only for the rest of the session
pub struct LoadedSigningKey {
    entry: KeyEntry,
    master: Option<KeyEntry>,
    ring: Cert,
    user_ids: Vec<String>,
    keypair: KeyPair,
    template: SignatureBuilder,
}

impl LoadedSigningKey {
    pub fn key_id(&self) -> u64 {
        self.entry.key_id()
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        self.entry.fingerprint()
    }

    pub fn is_subkey(&self) -> bool {
        !self.entry.is_master()
    }

    /// Fingerprint of the master when the signing key is a subkey
    pub fn master_fingerprint(&self) -> Option<&Fingerprint> {
        self.master.as_ref().map(|m| m.fingerprint())
    }

    /// User ids of the key and, for a subkey, of its master
    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.entry.created_at()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.entry.expires_at()
    }

    /// The ring the key was taken from
    pub fn cert(&self) -> &Cert {
        &self.ring
    }

    pub(crate) fn keypair(&self) -> KeyPair {
        self.keypair.clone()
    }

    /// Binary-document template carrying issuer and issuer fingerprint
    pub(crate) fn signature_template(&self) -> SignatureBuilder {
        self.template.clone()
    }
}

impl fmt::Debug for LoadedSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedSigningKey")
            .field("key_id", &format_key_id(self.key_id()))
            .field("fingerprint", &format_fingerprint(self.fingerprint()))
            .field("user_ids", &self.user_ids)
            .field("expires_at", &self.expires_at())
            .finish_non_exhaustive()
    }
}

/// Parses key rings and selects the signing key
pub struct KeyRingLoader {
    policy: StandardPolicy<'static>,
}

impl Default for KeyRingLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRingLoader {
    pub fn new() -> Self {
        Self {
            policy: StandardPolicy::new(),
        }
    }

    /// Load the signing key, checking expiry against the current time
    pub fn load(&self, material: &ResolvedKeyMaterial) -> SignResult<LoadedSigningKey> {
        self.load_at(material, SystemTime::now())
    }

    /// Load the signing key, checking expiry against `now`
    pub fn load_at(
        &self,
        material: &ResolvedKeyMaterial,
        now: SystemTime,
    ) -> SignResult<LoadedSigningKey> {
        if !material.is_key_available() {
            return Err(SignError::KeyUnavailable("no key material".to_string()));
        }

        let ring = KeyRingCollection::parse(&material.key_bytes, &self.policy, now)?;

        let candidate = match material.key_id {
            Some(key_id) => ring.find(key_id).ok_or(SignError::SecretKeyNotFound {
                key_id: Some(key_id),
            })?,
            None => ring
                .first_with_private()
                .ok_or(SignError::SecretKeyNotFound { key_id: None })?,
        };
        let key_id = candidate.key_id();

        match (candidate.private_material(), &material.passphrase) {
            (PrivateMaterial::Encrypted, None) => {
                return Err(SignError::PassphraseRequired { key_id });
            }
            (PrivateMaterial::Unencrypted, Some(_)) => {
                warn!(
                    "Plain secret key {} - passphrase is not needed",
                    format_key_id(key_id)
                );
            }
            _ => {}
        }

        if !candidate.has_private() {
            return Err(SignError::PrivateKeyMissing { key_id });
        }

        let master = ring.master_of(candidate);
        check_expiry(candidate, master, now)?;

        let secret = candidate
            .key()
            .clone()
            .parts_into_secret()
            .map_err(|source| SignError::KeyDecrypt { key_id, source })?;
        let secret = match &material.passphrase {
            Some(passphrase) if candidate.is_encrypted() => secret
                .decrypt_secret(&Password::from(passphrase.expose()))
                .map_err(|source| SignError::KeyDecrypt { key_id, source })?,
            _ => secret,
        };
        let keypair = secret
            .into_keypair()
            .map_err(|source| SignError::KeyDecrypt { key_id, source })?;

        let template = SignatureBuilder::new(SignatureType::Binary)
            .set_issuer(candidate.key().keyid())
            .and_then(|builder| builder.set_issuer_fingerprint(candidate.fingerprint().clone()))
            .map_err(|e| SignError::MalformedKeyRing(e.to_string()))?;

        let user_ids = aggregate_user_ids(candidate, master);
        info!("Loaded keyId: {}, uIds: {:?}", format_key_id(key_id), user_ids);

        Ok(LoadedSigningKey {
            entry: candidate.clone(),
            master: master.cloned(),
            ring: ring.ring_of(candidate).clone(),
            user_ids,
            keypair,
            template,
        })
    }
}

/// Master first, so a subkey of an expired master reports the master
fn check_expiry(
    candidate: &KeyEntry,
    master: Option<&KeyEntry>,
    now: SystemTime,
) -> SignResult<()> {
    let now: DateTime<Utc> = now.into();

    if let Some(master) = master {
        if let Some(expired_at) = master.expires_at().filter(|at| *at < now) {
            return Err(SignError::KeyExpired {
                role: KeyRole::Master,
                description: describe(master, None),
                expired_at,
            });
        }
    }

    if let Some(expired_at) = candidate.expires_at().filter(|at| *at < now) {
        return Err(SignError::KeyExpired {
            role: if candidate.is_master() {
                KeyRole::Master
            } else {
                KeyRole::Subkey
            },
            description: describe(candidate, master),
            expired_at,
        });
    }

    Ok(())
}

fn describe(entry: &KeyEntry, master: Option<&KeyEntry>) -> String {
    match master {
        Some(master) => format!(
            "SubKeyId: {} of {}",
            format_key_id(entry.key_id()),
            format_fingerprint(master.fingerprint())
        ),
        None => format!("KeyId: {}", format_fingerprint(entry.fingerprint())),
    }
}

fn aggregate_user_ids(candidate: &KeyEntry, master: Option<&KeyEntry>) -> Vec<String> {
    candidate
        .user_ids()
        .iter()
        .chain(master.map(|m| m.user_ids()).unwrap_or_default())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
