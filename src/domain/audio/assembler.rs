use super::model::AudioSegment;
use crate::domain::resilience::PipelineError;

/// MPEG-1 Layer III, 128 kbps, 44.1 kHz, mono, no CRC
const SILENT_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC4];
/// 144 * 128000 / 44100, no padding
const SILENT_FRAME_LEN: usize = 417;
/// About half a second (1152 samples per frame)
const DEFAULT_SILENCE_FRAMES: usize = 19;

/// Build `frames` MPEG frames whose side info and main data are all zero
pub fn silent_mp3(frames: usize) -> Vec<u8> {
    let mut frame = vec![0u8; SILENT_FRAME_LEN];
    frame[..SILENT_FRAME_HEADER.len()].copy_from_slice(&SILENT_FRAME_HEADER);
    frame.repeat(frames)
}

/// Concatenates per-turn audio into one episode buffer.
///
/// Turns without audio are replaced by a short silent clip so the episode
/// keeps its pacing.
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    silence: Vec<u8>,
}

impl Default for AudioAssembler {
    fn default() -> Self {
        Self {
            silence: silent_mp3(DEFAULT_SILENCE_FRAMES),
        }
    }
}

impl AudioAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_silence(silence: Vec<u8>) -> Self {
        Self { silence }
    }

    pub fn silence(&self) -> &[u8] {
        &self.silence
    }

    /// Combine segments in the order given
    pub fn combine(&self, segments: Vec<AudioSegment>) -> Result<Vec<u8>, PipelineError> {
        let mut substituted = 0usize;
        let buffers: Vec<Vec<u8>> = segments
            .into_iter()
            .map(|segment| match segment.audio {
                Some(audio) => audio,
                None => {
                    substituted += 1;
                    self.silence.clone()
                }
            })
            .collect();

        if substituted > 0 {
            tracing::debug!(
                substituted = substituted,
                "Substituted silence for turns without audio"
            );
        }

        concat_buffers(buffers)
    }
}

/// Copy every buffer into one preallocated output, releasing each input as
/// soon as it has been copied. Fails if the written length differs from the
/// precomputed total.
pub fn concat_buffers(buffers: Vec<Vec<u8>>) -> Result<Vec<u8>, PipelineError> {
    let expected: usize = buffers.iter().map(Vec::len).sum();
    let mut combined = vec![0u8; expected];
    let mut offset = 0usize;

    for buffer in buffers {
        let end = offset + buffer.len();
        let Some(target) = combined.get_mut(offset..end) else {
            return Err(PipelineError::AssemblyMismatch {
                expected,
                actual: end,
            });
        };
        target.copy_from_slice(&buffer);
        offset = end;
    }

    if offset != expected || combined.len() != expected {
        return Err(PipelineError::AssemblyMismatch {
            expected,
            actual: offset,
        });
    }

    Ok(combined)
}
