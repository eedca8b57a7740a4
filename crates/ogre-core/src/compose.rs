//! Ordered transform pipeline

use std::fmt;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::info;

use crate::document::MusicDocument;
use crate::error::{OgreError, Result};
use crate::transforms::Transform;

/// Applies transforms in order, feeding each result into the next.
///
/// The first error aborts the pipeline and is returned unchanged. Because
/// `apply` consumes the document there is no partially augmented copy left
/// behind; callers that need rollback keep a clone.
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Result<Self> {
        if transforms.is_empty() {
            return Err(OgreError::EmptyPipeline);
        }
        Ok(Self { transforms })
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Apply with an entropy-seeded generator
    pub fn run(&self, doc: MusicDocument) -> Result<MusicDocument> {
        let mut rng = StdRng::from_entropy();
        self.apply(doc, &mut rng)
    }

    /// Apply with a generator seeded from `seed`, for reproducible output
    pub fn run_seeded(&self, doc: MusicDocument, seed: u64) -> Result<MusicDocument> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.apply(doc, &mut rng)
    }
}

impl Transform for Compose {
    fn name(&self) -> &str {
        "Compose"
    }

    fn apply(&self, doc: MusicDocument, rng: &mut dyn RngCore) -> Result<MusicDocument> {
        let notes_in = doc.note_count();
        let doc = self
            .transforms
            .iter()
            .try_fold(doc, |doc, transform| transform.apply(doc, &mut *rng))?;
        info!(transforms = self.len(), notes_in, notes_out = doc.note_count(), "Pipeline complete");
        Ok(doc)
    }
}

impl fmt::Debug for Compose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compose").field("transforms", &self.names()).finish()
    }
}
