use crate::domain::resilience::{ErrorKind, PipelineError};
use crate::domain::script::{SpeakerRole, SpeakerTurn};
use std::collections::HashMap;

/// Voice identifier per speaker role
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceMap {
    voices: HashMap<SpeakerRole, String>,
}

impl VoiceMap {
    pub fn new(host_voice: impl Into<String>, cohost_voice: impl Into<String>) -> Self {
        let mut voices = HashMap::new();
        voices.insert(SpeakerRole::Host, host_voice.into());
        voices.insert(SpeakerRole::CoHost, cohost_voice.into());
        Self { voices }
    }

    pub fn insert(&mut self, role: SpeakerRole, voice: impl Into<String>) {
        self.voices.insert(role, voice.into());
    }

    pub fn voice_for(&self, role: SpeakerRole) -> Option<&str> {
        self.voices
            .get(&role)
            .map(String::as_str)
            .filter(|voice| !voice.trim().is_empty())
    }

    /// Both roles need a voice before any synthesis starts
    pub fn validate(&self) -> Result<(), PipelineError> {
        for role in [SpeakerRole::Host, SpeakerRole::CoHost] {
            if self.voice_for(role).is_none() {
                return Err(PipelineError::InvalidInput(format!(
                    "voice map is missing a voice for {}",
                    role
                )));
            }
        }
        Ok(())
    }
}

/// Synthesized audio for one turn, or the error that prevented it
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub turn: SpeakerTurn,
    pub voice_id: String,
    pub audio: Option<Vec<u8>>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl AudioSegment {
    pub fn synthesized(turn: SpeakerTurn, voice_id: impl Into<String>, audio: Vec<u8>) -> Self {
        Self {
            turn,
            voice_id: voice_id.into(),
            audio: Some(audio),
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(turn: SpeakerTurn, voice_id: impl Into<String>, error: &PipelineError) -> Self {
        Self {
            turn,
            voice_id: voice_id.into(),
            audio: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn byte_len(&self) -> usize {
        self.audio.as_ref().map_or(0, Vec::len)
    }
}
