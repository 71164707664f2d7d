//! Atomic definition store with digest-based reload.
//!
//! The active [`MetricDefinitionSet`] is published through an [`ArcSwap`]:
//! scrape tasks load a reference to the current generation and keep using it
//! even while a reload builds and swaps in the next one. Change detection
//! hashes every source file; when no digest differs the active generation is
//! left untouched, pointer identity included.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::definitions::{self, MetricDefinitionSet};
use crate::error::{Error, Result};

type FileDigest = [u8; 32];

#[derive(Debug)]
pub struct DefinitionStore {
    default_file: PathBuf,
    custom_files: Vec<PathBuf>,
    digests: Mutex<Vec<FileDigest>>,
    active: ArcSwap<MetricDefinitionSet>,
}

impl DefinitionStore {
    /// Builds the initial definition set from the default source plus every
    /// custom source, in order. Any malformed source is fatal here.
    pub fn load(default_file: PathBuf, custom_files: Vec<PathBuf>) -> Result<Self> {
        let store = Self {
            default_file,
            custom_files,
            digests: Mutex::new(Vec::new()),
            active: ArcSwap::from_pointee(MetricDefinitionSet::default()),
        };
        store.rebuild()?;
        Ok(store)
    }

    /// The currently published generation.
    pub fn current(&self) -> Arc<MetricDefinitionSet> {
        self.active.load_full()
    }

    /// Checks every source's content digest and rebuilds the whole set when
    /// any differs. Returns whether a reload happened. On failure the
    /// previously published generation stays active.
    pub fn reload_if_changed(&self) -> Result<bool> {
        let changed = {
            let digests = self.digests.lock();
            let mut current = Vec::with_capacity(digests.len());
            for path in self.sources() {
                current.push(file_digest(path)?);
            }
            current != *digests
        };
        if !changed {
            return Ok(false);
        }

        info!("metric definitions changed, reloading");
        self.rebuild()?;
        Ok(true)
    }

    fn sources(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.default_file).chain(self.custom_files.iter())
    }

    fn rebuild(&self) -> Result<()> {
        let mut defs = Vec::new();
        let mut digests = Vec::new();
        for path in self.sources() {
            let digest = file_digest(path)?;
            defs.extend(definitions::load_file(path)?);
            debug!(
                file = %path.display(),
                digest = %hex::encode(&digest[..8]),
                "loaded metric definitions"
            );
            digests.push(digest);
        }
        *self.digests.lock() = digests;
        self.active
            .store(Arc::new(MetricDefinitionSet { definitions: defs }));
        Ok(())
    }
}

fn file_digest(path: &Path) -> Result<FileDigest> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Config(format!("unable to hash {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hasher.finalize().into())
}
