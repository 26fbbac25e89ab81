use serde::{Deserialize, Serialize};

/// The two fixed speaker roles of a generated dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeakerRole {
    #[serde(rename = "HOST")]
    Host,
    #[serde(rename = "CO-HOST")]
    CoHost,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Host => "HOST",
            SpeakerRole::CoHost => "CO-HOST",
        }
    }
}

impl std::fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One contiguous span of dialogue attributed to a single speaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    /// Line of the raw script where the turn starts
    pub original_line_index: usize,
    /// Position of the turn among the turns starting on that line
    pub sequence_index: usize,
    pub role: SpeakerRole,
    pub text: String,
}

impl SpeakerTurn {
    pub fn order_key(&self) -> (usize, usize) {
        (self.original_line_index, self.sequence_index)
    }
}
