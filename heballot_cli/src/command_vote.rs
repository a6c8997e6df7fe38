use crate::config::Config;
use anyhow::Result;
use heballot::{CastRequest, Outcome};

pub fn command_vote(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let request = CastRequest {
        area_number: crate::parse_arg(matches, "area")?,
        candidate: crate::parse_arg(matches, "CANDIDATE-ID")?,
        district: crate::parse_arg(matches, "district")?,
        voter_id: crate::parse_arg(matches, "VOTER-ID")?,
    };

    let election = config.election()?;
    let result = election.cast_vote(&request);
    crate::print_json(&Outcome::from_result(&result))?;

    let receipt = result?;
    info!("ballot of voter {} recorded as {}", receipt.voter_id, receipt.tx_id);
    Ok(())
}
