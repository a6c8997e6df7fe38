use crate::*;

// Fields are declared in alphabetical order of their serialized names so
// that records serialize with sorted keys.

/// A registered voter, keyed by `id` in the Voters namespace
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoterRecord {
    pub area_number: u32,
    pub dob: String,
    pub district: String,
    pub first_name: String,
    pub id: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: String,
}

/// A cast ballot, keyed by the voter id in the Ballots namespace
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BallotRecord {
    pub area_number: u32,

    /// base64 encoded ciphertext of the one-hot selection vector
    pub ballot: String,

    pub district: String,
    pub id: String,
}

macro_rules! record_codec {
    ($record:ty) => {
        impl $record {
            pub fn area_key(&self) -> AreaKey {
                AreaKey::new(&self.district, self.area_number)
            }

            pub fn to_json(&self) -> Vec<u8> {
                // Serializing a plain struct of strings and integers cannot fail
                serde_json::to_vec(self).unwrap_or_default()
            }

            pub fn from_json(key: &str, bytes: &[u8]) -> Result<Self, Error> {
                serde_json::from_slice(bytes).map_err(|source| Error::CorruptRecord {
                    key: key.to_owned(),
                    source,
                })
            }
        }
    };
}

record_codec!(VoterRecord);
record_codec!(BallotRecord);
