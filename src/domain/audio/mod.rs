pub mod assembler;
pub mod batch;
pub mod model;

pub use assembler::{concat_buffers, silent_mp3, AudioAssembler};
pub use batch::{audio_cache, AudioCache, BatchAudioConfig, BatchAudioGenerator};
pub use model::{AudioSegment, VoiceMap};
