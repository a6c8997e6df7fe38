use crate::*;
use std::fmt;

/// Where a voter id stands in the election
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityState {
    Unregistered,
    Registered,
    Voted,
}

impl fmt::Display for EligibilityState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            EligibilityState::Unregistered => "unregistered",
            EligibilityState::Registered => "registered",
            EligibilityState::Voted => "voted",
        };
        write!(f, "{}", s)
    }
}

/// Answers "is this a registered voter who has not voted yet".
///
/// The two existence checks are not atomic with each other or with a later
/// ballot write; `BallotBox::create_vote` is what actually enforces the rule.
/// This guard gives the early, descriptive rejection.
pub struct EligibilityGuard<L: Ledger> {
    voters: VoterRegistry<L>,
    ballots: BallotBox<L>,
}

impl<L: Ledger + Clone> EligibilityGuard<L> {
    pub fn new(ledger: L) -> Self {
        EligibilityGuard {
            voters: VoterRegistry::new(ledger.clone()),
            ballots: BallotBox::new(ledger),
        }
    }
}

impl<L: Ledger> EligibilityGuard<L> {
    pub fn state(&self, voter_id: &str) -> Result<EligibilityState, Error> {
        if !self.voters.voter_id_exists(voter_id)? {
            return Ok(EligibilityState::Unregistered);
        }
        if self.ballots.vote_exists(voter_id)? {
            return Ok(EligibilityState::Voted);
        }
        Ok(EligibilityState::Registered)
    }

    pub fn assert_eligible(&self, voter_id: &str) -> Result<(), Error> {
        match self.state(voter_id)? {
            EligibilityState::Registered => Ok(()),
            EligibilityState::Unregistered => Err(Error::VoterNotFound(voter_id.to_owned())),
            EligibilityState::Voted => Err(Error::AlreadyVoted(voter_id.to_owned())),
        }
    }
}
