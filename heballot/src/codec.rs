use crate::*;
use std::ops::Deref;

/// A vector of non-negative slot values.
///
/// For a single ballot this is one-hot over the candidates of an area; for an
/// aggregate each slot holds the number of ballots selecting that candidate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct PlaintextVector(Vec<u64>);

impl PlaintextVector {
    pub fn new(slots: Vec<u64>) -> Self {
        PlaintextVector(slots)
    }

    pub fn into_inner(self) -> Vec<u64> {
        self.0
    }

    /// Keep only the first `len` slots
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Element-wise sum. The shorter vector is padded with zeros.
    pub fn elementwise_sum<'a, I>(vectors: I) -> Self
    where
        I: IntoIterator<Item = &'a PlaintextVector>,
    {
        let mut sum: Vec<u64> = Vec::new();
        for v in vectors {
            if v.len() > sum.len() {
                sum.resize(v.len(), 0);
            }
            for (total, slot) in sum.iter_mut().zip(v.iter()) {
                *total += *slot;
            }
        }
        PlaintextVector(sum)
    }
}

impl Deref for PlaintextVector {
    type Target = [u64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u64>> for PlaintextVector {
    fn from(slots: Vec<u64>) -> Self {
        PlaintextVector(slots)
    }
}

/// Encode a selection as a one-hot vector over `ordered_ids`
pub fn encode_selection(
    candidate: CandidateId,
    ordered_ids: &[CandidateId],
) -> Result<PlaintextVector, CodecError> {
    let index = ordered_ids
        .iter()
        .position(|id| *id == candidate)
        .ok_or(CodecError::UnknownCandidate(candidate))?;

    let mut slots = vec![0; ordered_ids.len()];
    slots[index] = 1;
    Ok(PlaintextVector(slots))
}

/// Index of the selected candidate in a single decrypted ballot
pub fn decode_winner_index(vector: &PlaintextVector) -> Result<usize, CodecError> {
    let selected: Vec<usize> = vector
        .iter()
        .enumerate()
        .filter(|(_, slot)| **slot != 0)
        .map(|(i, _)| i)
        .collect();

    match selected.len() {
        0 => Err(CodecError::NoSelection),
        1 => Ok(selected[0]),
        _ => Err(CodecError::AmbiguousSelection(selected)),
    }
}

/// Per-candidate counts of an aggregate, positionally aligned with the
/// candidate order the ballots were encoded with
pub fn decode_counts(vector: PlaintextVector) -> Vec<u64> {
    vector.into_inner()
}
