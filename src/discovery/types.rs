use serde::{Deserialize, Serialize};

/// A device offered by the platform chooser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDevice {
    pub id: String,
    pub name: String,
}

impl CandidateDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        CandidateDevice { id: id.into(), name: name.into() }
    }
}

/// Orders candidates for display: lexicographic by name, ties broken by id.
pub fn sort_candidates(candidates: &mut [CandidateDevice]) {
    candidates.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}
