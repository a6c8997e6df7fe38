use crate::config::Config;
use anyhow::Result;
use heballot::Outcome;

pub fn command_verify(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let voter_id: String = crate::parse_arg(matches, "VOTER-ID")?;

    let election = config.election()?;
    let result = election.verify_vote(&voter_id);
    crate::print_json(&Outcome::from_result(&result))?;
    result?;
    Ok(())
}
