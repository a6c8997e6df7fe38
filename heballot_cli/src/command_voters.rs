use crate::config::Config;
use anyhow::Result;
use serde_json::json;

pub fn command_voters(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let election = config.election()?;

    match matches.value_of("VOTER-ID") {
        Some(voter_id) => {
            let voter = election.voters().read_voter(voter_id)?;
            let state = election.eligibility(voter_id)?;
            crate::print_json(&json!({ "state": state, "voter": voter }))
        }
        None => crate::print_json(&election.voters().get_all_voters()?),
    }
}
