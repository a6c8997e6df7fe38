use crate::config::Config;
use anyhow::Result;

pub fn command_tally(_matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let election = config.election()?;
    let tabulation = election.tabulate()?;

    let degraded = tabulation.areas.iter().filter(|a| a.is_degraded()).count();
    if degraded > 0 {
        warn!("{} area(s) could not be counted and report zero votes", degraded);
    }

    crate::print_json(&tabulation)
}
