//! Speech synthesis: cloud TTS followed by Seed-VC voice conversion.
//!
//! Components:
//! - `tts`: OpenAI speech endpoint, writes the neutral source voice
//! - `seed_vc`: runs Seed-VC `inference.py` to transfer the reference timbre

pub mod seed_vc;
pub mod tts;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;

/// A generated sound file, owned by the cycle that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    path: PathBuf,
}

impl AudioArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text` in the voice of `reference_voice` (or the configured default).
    ///
    /// May take minutes. Every internal failure comes back as one error.
    async fn synthesize(&self, text: &str, reference_voice: Option<&Path>) -> Result<AudioArtifact>;
}
