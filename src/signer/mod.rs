//! Detached signature generation
//!
//! Content is streamed through the signer in fixed-size chunks. The
//! armored signature goes to a temporary file next to the destination and
//! is renamed into place only once complete, so a failed run never leaves a
//! truncated `.asc` behind.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use sequoia_openpgp as openpgp;
use tempfile::NamedTempFile;
use tracing::debug;

use openpgp::armor;
use openpgp::serialize::stream::{Armorer, Message, Signer};
use openpgp::types::HashAlgorithm;

use crate::error::{SignError, SignResult};
use crate::key::LoadedSigningKey;

/// Read buffer size for artifact content
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Digest used for every signature
pub const HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::SHA512;

/// Produces detached, armored binary-document signatures with one key
#[derive(Debug, Clone, Copy)]
pub struct SignatureEngine<'k> {
    key: &'k LoadedSigningKey,
}

impl<'k> SignatureEngine<'k> {
    pub fn new(key: &'k LoadedSigningKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &'k LoadedSigningKey {
        self.key
    }

    /// Sign everything `content` yields and write the signature to `output`.
    ///
    /// Missing parent directories of `output` are created.
    pub fn sign<R: Read>(&self, mut content: R, output: &Path) -> SignResult<()> {
        let wrap = |source: anyhow::Error| SignError::Signing {
            path: output.to_path_buf(),
            source,
        };

        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| wrap(e.into()))?;

        let mut staged = NamedTempFile::new_in(parent).map_err(|e| wrap(e.into()))?;
        self.write_signature(&mut content, staged.as_file_mut())
            .map_err(wrap)?;
        staged.as_file().sync_all().map_err(|e| wrap(e.into()))?;
        staged.persist(output).map_err(|e| wrap(e.error.into()))?;

        debug!("Signature written to {}", output.display());
        Ok(())
    }

    fn write_signature(&self, content: &mut dyn Read, sink: &mut File) -> anyhow::Result<()> {
        let message = Message::new(sink);
        let message = Armorer::new(message)
            .kind(armor::Kind::Signature)
            .build()?;
        let mut signer = Signer::with_template(
            message,
            self.key.keypair(),
            self.key.signature_template(),
        )
        .detached()
        .hash_algo(HASH_ALGORITHM)?
        .build()?;

        let mut buffer = [0u8; CHUNK_SIZE];
        loop {
            let read = match content.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            signer.write_all(&buffer[..read])?;
        }

        signer.finalize()?;
        Ok(())
    }
}
