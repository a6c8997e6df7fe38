use crate::*;

/// Contract functions over the Voters namespace
#[derive(Clone)]
pub struct VoterRegistry<L: Ledger> {
    ledger: L,
}

impl<L: Ledger> VoterRegistry<L> {
    pub fn new(ledger: L) -> Self {
        VoterRegistry { ledger }
    }

    /// Create a voter. Fails if the id is already taken.
    pub fn create_voter(&self, voter: &VoterRecord) -> Result<TxId, Error> {
        require_key(&voter.id)?;
        let absent = [Precondition::Absent(Namespace::Voters, voter.id.clone())];

        match self.ledger.commit(
            Namespace::Voters,
            &voter.id,
            Mutation::Put(voter.to_json()),
            &absent,
        ) {
            Ok(tx_id) => {
                debug!("created voter {} in {}", voter.id, voter.area_key());
                Ok(tx_id)
            }
            Err(LedgerError::PreconditionFailed(_)) => {
                Err(Error::VoterAlreadyRegistered(voter.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_voter(&self, voter_id: &str) -> Result<VoterRecord, Error> {
        match self.ledger.get(Namespace::Voters, voter_id)? {
            Some(bytes) => VoterRecord::from_json(voter_id, &bytes),
            None => Err(Error::VoterNotFound(voter_id.to_owned())),
        }
    }

    pub fn voter_id_exists(&self, voter_id: &str) -> Result<bool, Error> {
        Ok(self.ledger.exists(Namespace::Voters, voter_id)?)
    }

    /// Delete a voter who has not voted. A voter with a ballot on the ledger
    /// cannot be removed, so every ballot keeps its voter.
    pub fn delete_voter(&self, voter_id: &str) -> Result<TxId, Error> {
        let no_ballot = [Precondition::Absent(Namespace::Ballots, voter_id.to_owned())];

        match self
            .ledger
            .commit(Namespace::Voters, voter_id, Mutation::Delete, &no_ballot)
        {
            Ok(tx_id) => Ok(tx_id),
            Err(LedgerError::NotFound { .. }) => Err(Error::VoterNotFound(voter_id.to_owned())),
            Err(LedgerError::PreconditionFailed(_)) => {
                Err(Error::AlreadyVoted(voter_id.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All voters, in voter id order
    pub fn get_all_voters(&self) -> Result<Vec<VoterRecord>, Error> {
        self.ledger
            .scan_all(Namespace::Voters)?
            .map(|item| {
                let (key, bytes) = item?;
                VoterRecord::from_json(&key, &bytes)
            })
            .collect()
    }
}

/// Contract functions over the Ballots namespace
#[derive(Clone)]
pub struct BallotBox<L: Ledger> {
    ledger: L,
}

impl<L: Ledger> BallotBox<L> {
    pub fn new(ledger: L) -> Self {
        BallotBox { ledger }
    }

    /// Record a ballot.
    ///
    /// The write is a single conditional transaction: it only commits if the
    /// voter is registered and has no ballot yet. Of any number of concurrent
    /// calls for the same voter, at most one succeeds.
    pub fn create_vote(&self, ballot: &BallotRecord) -> Result<TxId, Error> {
        require_key(&ballot.id)?;
        let eligible = [
            Precondition::Exists(Namespace::Voters, ballot.id.clone()),
            Precondition::Absent(Namespace::Ballots, ballot.id.clone()),
        ];

        match self.ledger.commit(
            Namespace::Ballots,
            &ballot.id,
            Mutation::Put(ballot.to_json()),
            &eligible,
        ) {
            Ok(tx_id) => {
                debug!("recorded ballot of voter {} in {}", ballot.id, ballot.area_key());
                Ok(tx_id)
            }
            Err(LedgerError::PreconditionFailed(Precondition::Exists(..))) => {
                Err(Error::VoterNotFound(ballot.id.clone()))
            }
            Err(LedgerError::PreconditionFailed(Precondition::Absent(..))) => {
                Err(Error::AlreadyVoted(ballot.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_vote(&self, voter_id: &str) -> Result<BallotRecord, Error> {
        match self.ledger.get(Namespace::Ballots, voter_id)? {
            Some(bytes) => BallotRecord::from_json(voter_id, &bytes),
            None => Err(Error::BallotNotFound(voter_id.to_owned())),
        }
    }

    pub fn vote_exists(&self, voter_id: &str) -> Result<bool, Error> {
        Ok(self.ledger.exists(Namespace::Ballots, voter_id)?)
    }

    pub fn delete_vote(&self, voter_id: &str) -> Result<TxId, Error> {
        match self.ledger.delete(Namespace::Ballots, voter_id) {
            Ok(tx_id) => Ok(tx_id),
            Err(LedgerError::NotFound { .. }) => Err(Error::BallotNotFound(voter_id.to_owned())),
            Err(e) => Err(e.into()),
        }
    }

    /// All ballots, in voter id order. Fails on the first unreadable record.
    pub fn get_all_votes(&self) -> Result<Vec<BallotRecord>, Error> {
        self.ledger
            .scan_all(Namespace::Ballots)?
            .map(|item| {
                let (key, bytes) = item?;
                BallotRecord::from_json(&key, &bytes)
            })
            .collect()
    }

    /// Raw scan of the whole namespace
    pub fn scan(&self) -> Result<Scan, Error> {
        Ok(self.ledger.scan_all(Namespace::Ballots)?)
    }
}

fn require_key(id: &str) -> Result<(), Error> {
    if id.trim().is_empty() {
        return Err(Error::InvalidInput("record id must not be empty".to_owned()));
    }
    Ok(())
}
