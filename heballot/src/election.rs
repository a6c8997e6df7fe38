use crate::*;
use std::fmt;

/// How many fresh voter ids registration tries before giving up on collisions
pub const REGISTRATION_ATTEMPTS: usize = 5;

/// A request to register a new voter
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub area_number: u32,
    pub dob: String,
    pub district: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: String,

    /// Number of the registrant's identity document. Never stored; only its
    /// hash appears in logs.
    pub personal_id: String,
}

/// A request to cast a ballot
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CastRequest {
    pub area_number: u32,
    pub candidate: CandidateId,
    pub district: String,
    pub voter_id: String,
}

/// Proof of a recorded ballot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_id: TxId,
    pub voter_id: String,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Voting was successful. Your unique transaction ID is {}",
            self.tx_id
        )
    }
}

/// What a voter's own ballot decrypts to
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub area_number: u32,
    pub candidate: CandidateId,
    pub candidate_name: String,
    pub district: String,
    pub voter_id: String,
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "You've voted for {}", self.candidate_name)
    }
}

/// Success or failure of a request, with a human readable message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Outcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub message: String,
    pub retryable: bool,
    pub success: bool,
}

impl Outcome {
    pub fn from_result<T: fmt::Display>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(value) => Outcome {
                kind: None,
                message: value.to_string(),
                retryable: false,
                success: true,
            },
            Err(e) => Outcome {
                kind: Some(e.kind()),
                message: e.to_string(),
                retryable: e.is_retryable(),
                success: false,
            },
        }
    }
}

/// One election: the two ledger namespaces, the key pair and the catalog.
///
/// Every method is an independent unit of work. Nothing is cached between
/// calls except the key pair.
pub struct Election<L: Ledger, B: BlobStore> {
    voters: VoterRegistry<L>,
    ballots: BallotBox<L>,
    guard: EligibilityGuard<L>,
    keys: KeyStore<B>,
    cipher: HomomorphicCipher,
    catalog: CandidateCatalog,
}

impl<L: Ledger + Clone, B: BlobStore> Election<L, B> {
    pub fn new(ledger: L, keys: KeyStore<B>, catalog: CandidateCatalog) -> Self {
        let cipher = HomomorphicCipher::new(keys.params().clone());
        Election {
            voters: VoterRegistry::new(ledger.clone()),
            ballots: BallotBox::new(ledger.clone()),
            guard: EligibilityGuard::new(ledger),
            keys,
            cipher,
            catalog,
        }
    }
}

impl<L: Ledger, B: BlobStore> Election<L, B> {
    pub fn voters(&self) -> &VoterRegistry<L> {
        &self.voters
    }

    pub fn ballots(&self) -> &BallotBox<L> {
        &self.ballots
    }

    pub fn catalog(&self) -> &CandidateCatalog {
        &self.catalog
    }

    pub fn keys(&self) -> &KeyStore<B> {
        &self.keys
    }

    pub fn cipher(&self) -> &HomomorphicCipher {
        &self.cipher
    }

    pub fn eligibility(&self, voter_id: &str) -> Result<EligibilityState, Error> {
        self.guard.state(voter_id)
    }

    /// Register a voter under a freshly generated voter id
    pub fn register_voter(&self, registration: &Registration) -> Result<VoterRecord, Error> {
        for (field, value) in &[
            ("firstName", &registration.first_name),
            ("lastName", &registration.last_name),
            ("dob", &registration.dob),
            ("personalId", &registration.personal_id),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{} is required", field)));
            }
        }

        let area = AreaKey::new(registration.district.trim(), registration.area_number);
        self.catalog.require_area(&area)?;
        let identity = identity_hash(&registration.personal_id);

        let mut last_id = String::new();
        for _ in 0..REGISTRATION_ATTEMPTS {
            let record = VoterRecord {
                area_number: area.area_number,
                dob: registration.dob.trim().to_owned(),
                district: area.district.clone(),
                first_name: registration.first_name.trim().to_owned(),
                id: generate_voter_id(),
                last_name: registration.last_name.trim().to_owned(),
                middle_name: registration.middle_name.trim().to_owned(),
            };

            match self.voters.create_voter(&record) {
                Ok(tx_id) => {
                    info!(
                        "registered voter {} (identity {}) in {}, tx {}",
                        record.id, identity, area, tx_id
                    );
                    return Ok(record);
                }
                Err(Error::VoterAlreadyRegistered(id)) => {
                    debug!("voter id {} already taken, generating another", id);
                    last_id = id;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::VoterAlreadyRegistered(last_id))
    }

    /// Encrypt and record a voter's selection
    pub fn cast_vote(&self, request: &CastRequest) -> Result<Receipt, Error> {
        self.guard.assert_eligible(&request.voter_id)?;

        let voter = self.voters.read_voter(&request.voter_id)?;
        let submitted = AreaKey::new(request.district.trim(), request.area_number);
        let registered = voter.area_key();
        if registered != submitted {
            return Err(Error::DistrictMismatch {
                voter_id: voter.id,
                registered,
                submitted,
            });
        }

        let area = self.catalog.require_area(&submitted)?;
        let selection = encode_selection(request.candidate, &area.candidate_ids())?;
        let public_key = self.keys.load_public()?;
        let ciphertext = self.cipher.encrypt(&selection, &public_key)?;

        let record = BallotRecord {
            area_number: submitted.area_number,
            ballot: self.cipher.to_base64(&ciphertext),
            district: submitted.district,
            id: voter.id,
        };
        let tx_id = self.ballots.create_vote(&record)?;
        info!("recorded ballot for voter {}, tx {}", record.id, tx_id);

        Ok(Receipt {
            tx_id,
            voter_id: record.id,
        })
    }

    /// Decrypt a single voter's own ballot.
    ///
    /// Anyone holding the voter id can call this; callers that need more
    /// must authenticate the voter before reaching it.
    pub fn verify_vote(&self, voter_id: &str) -> Result<Verification, Error> {
        let voter = self.voters.read_voter(voter_id)?;
        let ballot = self.ballots.read_vote(voter_id)?;
        let area = self.catalog.require_area(&ballot.area_key())?;

        let ciphertext = self.cipher.from_base64(&ballot.ballot)?;
        let secret_key = self.keys.load_secret()?;
        let slots = self.cipher.decrypt(&ciphertext, &secret_key)?;

        let index = decode_winner_index(&slots)?;
        let (candidate, details) = area.candidate_at(index).ok_or_else(|| {
            CryptoError::InvalidCiphertext(format!(
                "ballot of voter {} selects slot {} but {} has {} candidates",
                voter_id,
                index,
                ballot.area_key(),
                area.len()
            ))
        })?;

        Ok(Verification {
            area_number: voter.area_number,
            candidate,
            candidate_name: details.name.clone(),
            district: voter.district,
            voter_id: voter.id,
        })
    }

    /// Per-area totals of every ballot on the ledger
    pub fn tabulate(&self) -> Result<Tabulation, Error> {
        let secret_key = self.keys.load_secret()?;
        TallyAggregator::new(&self.cipher, &secret_key).tabulate(&self.ballots, &self.catalog)
    }
}
