//! Parsed secret key rings
//!
//! The collection flattens every key of every ring into one list in ring
//! order (primary first, then its subkeys) and builds the subkey to master
//! lookup once, from the subkey binding signatures.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use sequoia_openpgp as openpgp;

use openpgp::cert::prelude::*;
use openpgp::packet::key::{PublicParts, SecretKeyMaterial, UnspecifiedRole};
use openpgp::packet::Key;
use openpgp::parse::Parse;
use openpgp::policy::Policy;
use openpgp::types::SignatureType;
use openpgp::{Fingerprint, KeyHandle, KeyID};

use crate::error::{SignError, SignResult};

/// State of a key's secret half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateMaterial {
    Unencrypted,
    /// Protected by a passphrase
    Encrypted,
    /// Public only, a GnuPG stub, or an unsupported protection scheme
    Absent,
}

/// One key (master or subkey) of a ring
#[derive(Clone)]
pub struct KeyEntry {
    key_id: u64,
    fingerprint: Fingerprint,
    is_master: bool,
    private: PrivateMaterial,
    created_at: SystemTime,
    validity: Option<Duration>,
    user_ids: Vec<String>,
    ring: usize,
    key: Key<PublicParts, UnspecifiedRole>,
}

impl KeyEntry {
    pub fn key_id(&self) -> u64 {
        self.key_id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn private_material(&self) -> PrivateMaterial {
        self.private
    }

    pub fn is_encrypted(&self) -> bool {
        self.private == PrivateMaterial::Encrypted
    }

    pub fn has_private(&self) -> bool {
        self.private != PrivateMaterial::Absent
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at.into()
    }

    /// Validity relative to creation, `None` when the key never expires
    pub fn validity(&self) -> Option<Duration> {
        self.validity
    }

    /// Creation time plus validity
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.validity
            .and_then(|validity| self.created_at.checked_add(validity))
            .map(DateTime::<Utc>::from)
    }

    /// User ids carried by this key itself; empty for subkeys
    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn key(&self) -> &Key<PublicParts, UnspecifiedRole> {
        &self.key
    }
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("key_id", &format_args!("0x{:016X}", self.key_id))
            .field("fingerprint", &format_args!("{:X}", self.fingerprint))
            .field("is_master", &self.is_master)
            .field("private", &self.private)
            .field("expires_at", &self.expires_at())
            .field("user_ids", &self.user_ids)
            .finish()
    }
}

/// Every key of every parsed ring, with master lookups
pub struct KeyRingCollection {
    rings: Vec<Cert>,
    entries: Vec<KeyEntry>,
    /// subkey id -> master id
    masters: HashMap<u64, u64>,
}

impl KeyRingCollection {
    /// Parse binary or armored key ring bytes.
    ///
    /// `policy` and `now` select the binding signature a key's validity is
    /// read from.
    pub fn parse(bytes: &[u8], policy: &dyn Policy, now: SystemTime) -> SignResult<Self> {
        let rings = CertParser::from_bytes(bytes)
            .and_then(|parser| parser.collect::<openpgp::Result<Vec<Cert>>>())
            .map_err(|e| SignError::MalformedKeyRing(e.to_string()))?;

        let mut entries = Vec::new();
        let mut masters = HashMap::new();

        for (ring, cert) in rings.iter().enumerate() {
            let master_id = key_id_value(&cert.keyid())?;
            let user_ids = cert_user_ids(cert);

            for ka in cert.keys() {
                let key_id = key_id_value(&ka.key().keyid())?;
                let is_master = ka.primary();

                if !is_master {
                    let bound_to = binding_issuer(&ka).unwrap_or(master_id);
                    masters.insert(key_id, bound_to);
                }

                entries.push(KeyEntry {
                    key_id,
                    fingerprint: ka.key().fingerprint(),
                    is_master,
                    private: classify(ka.key()),
                    created_at: ka.key().creation_time(),
                    validity: key_validity(&ka, policy, now),
                    user_ids: if is_master { user_ids.clone() } else { Vec::new() },
                    ring,
                    key: ka.key().clone(),
                });
            }
        }

        Ok(Self {
            rings,
            entries,
            masters,
        })
    }

    /// All keys in ring order
    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key with exactly this id
    pub fn find(&self, key_id: u64) -> Option<&KeyEntry> {
        self.entries.iter().find(|e| e.key_id == key_id)
    }

    /// First key, in ring order, that carries usable private material
    pub fn first_with_private(&self) -> Option<&KeyEntry> {
        self.entries.iter().find(|e| e.has_private())
    }

    /// Master a subkey is bound to; `None` for a master key
    pub fn master_of(&self, entry: &KeyEntry) -> Option<&KeyEntry> {
        if entry.is_master {
            return None;
        }
        let master_id = self.masters.get(&entry.key_id)?;
        self.entries
            .iter()
            .find(|e| e.is_master && e.key_id == *master_id)
    }

    /// The ring a key belongs to
    pub fn ring_of(&self, entry: &KeyEntry) -> &Cert {
        &self.rings[entry.ring]
    }
}

impl fmt::Debug for KeyRingCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRingCollection")
            .field("rings", &self.rings.len())
            .field("entries", &self.entries)
            .finish()
    }
}

pub(crate) fn key_id_value(key_id: &KeyID) -> SignResult<u64> {
    key_id
        .as_u64()
        .map_err(|e| SignError::MalformedKeyRing(format!("{}: {}", key_id, e)))
}

fn classify(key: &Key<PublicParts, UnspecifiedRole>) -> PrivateMaterial {
    match key.optional_secret() {
        Some(SecretKeyMaterial::Unencrypted(_)) => PrivateMaterial::Unencrypted,
        Some(SecretKeyMaterial::Encrypted(e)) if e.s2k().is_supported() => {
            PrivateMaterial::Encrypted
        }
        _ => PrivateMaterial::Absent,
    }
}

/// Issuer of the newest subkey binding signature
fn binding_issuer(ka: &ErasedKeyAmalgamation<PublicParts>) -> Option<u64> {
    ka.self_signatures()
        .filter(|sig| sig.typ() == SignatureType::SubkeyBinding)
        .max_by_key(|sig| sig.signature_creation_time())
        .and_then(|sig| sig.get_issuers().into_iter().next())
        .and_then(|issuer: KeyHandle| KeyID::from(&issuer).as_u64().ok())
}

/// Validity from the policy-approved binding, else the newest self-signature
/// that states one
fn key_validity(
    ka: &ErasedKeyAmalgamation<PublicParts>,
    policy: &dyn Policy,
    now: SystemTime,
) -> Option<Duration> {
    let validity = match ka.clone().with_policy(policy, now) {
        Ok(valid) => valid.key_validity_period(),
        Err(_) => ka
            .self_signatures()
            .filter(|sig| sig.key_validity_period().is_some())
            .max_by_key(|sig| sig.signature_creation_time())
            .and_then(|sig| sig.key_validity_period()),
    };
    validity.filter(|period| !period.is_zero())
}

fn cert_user_ids(cert: &Cert) -> Vec<String> {
    cert.userids()
        .map(|ua| String::from_utf8_lossy(ua.userid().value()).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpgp::policy::StandardPolicy;
    use openpgp::serialize::SerializeInto;
    use openpgp::types::KeyFlags;

    fn now() -> SystemTime {
        SystemTime::now()
    }

    fn ring_with_subkey() -> Cert {
        let (cert, _) = CertBuilder::new()
            .add_userid("Release Bot <release@example.org>")
            .add_subkey(KeyFlags::empty().set_signing(), None, None)
            .generate()
            .unwrap();
        cert
    }

    #[test]
    fn test_entries_in_ring_order() {
        let cert = ring_with_subkey();
        let bytes = cert.as_tsk().to_vec().unwrap();
        let ring = KeyRingCollection::parse(&bytes, &StandardPolicy::new(), now()).unwrap();

        assert_eq!(ring.entries().len(), 2);
        assert!(ring.entries()[0].is_master());
        assert!(!ring.entries()[1].is_master());
        assert_eq!(
            ring.entries()[0].user_ids(),
            &["Release Bot <release@example.org>".to_string()]
        );
        assert!(ring.entries()[1].user_ids().is_empty());
    }

    #[test]
    fn test_master_lookup() {
        let cert = ring_with_subkey();
        let bytes = cert.as_tsk().armored().to_vec().unwrap();
        let ring = KeyRingCollection::parse(&bytes, &StandardPolicy::new(), now()).unwrap();

        let master = &ring.entries()[0];
        let subkey = &ring.entries()[1];
        assert!(ring.master_of(master).is_none());
        assert_eq!(
            ring.master_of(subkey).map(|m| m.key_id()),
            Some(master.key_id())
        );
    }

    #[test]
    fn test_public_only_ring_has_no_private_material() {
        let cert = ring_with_subkey();
        let bytes = cert.to_vec().unwrap();
        let ring = KeyRingCollection::parse(&bytes, &StandardPolicy::new(), now()).unwrap();

        assert!(ring.entries().iter().all(|e| !e.has_private()));
        assert!(ring.first_with_private().is_none());
    }

    #[test]
    fn test_encryption_state() {
        let (cert, _) = CertBuilder::new()
            .add_userid("enc@example.org")
            .set_password(Some("pw".into()))
            .generate()
            .unwrap();
        let bytes = cert.as_tsk().to_vec().unwrap();
        let ring = KeyRingCollection::parse(&bytes, &StandardPolicy::new(), now()).unwrap();

        assert_eq!(
            ring.entries()[0].private_material(),
            PrivateMaterial::Encrypted
        );
        assert!(ring.entries()[0].is_encrypted());
    }

    #[test]
    fn test_validity_and_expiry() {
        let created = SystemTime::now() - Duration::from_secs(3600);
        let (cert, _) = CertBuilder::new()
            .add_userid("exp@example.org")
            .set_creation_time(created)
            .set_validity_period(Duration::from_secs(600))
            .generate()
            .unwrap();
        let bytes = cert.as_tsk().to_vec().unwrap();
        let ring = KeyRingCollection::parse(&bytes, &StandardPolicy::new(), now()).unwrap();

        let master = &ring.entries()[0];
        assert_eq!(master.validity(), Some(Duration::from_secs(600)));
        assert_eq!(
            master.expires_at(),
            Some(master.created_at() + chrono::Duration::seconds(600))
        );
    }

    #[test]
    fn test_never_expiring_key() {
        let (cert, _) = CertBuilder::new()
            .add_userid("forever@example.org")
            .set_validity_period(None)
            .generate()
            .unwrap();
        let bytes = cert.as_tsk().to_vec().unwrap();
        let ring = KeyRingCollection::parse(&bytes, &StandardPolicy::new(), now()).unwrap();

        assert_eq!(ring.entries()[0].validity(), None);
        assert_eq!(ring.entries()[0].expires_at(), None);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = KeyRingCollection::parse(b"this is not a key", &StandardPolicy::new(), now())
            .unwrap_err();
        assert!(matches!(err, SignError::MalformedKeyRing(_)));
    }

    #[test]
    fn test_debug_omits_secret_material() {
        let cert = ring_with_subkey();
        let bytes = cert.as_tsk().to_vec().unwrap();
        let ring = KeyRingCollection::parse(&bytes, &StandardPolicy::new(), now()).unwrap();
        let debug = format!("{:?}", ring.entries()[0]);
        assert!(debug.contains("is_master: true"));
        assert!(debug.contains("0x"));
    }
}
