use crate::config::Config;
use anyhow::Result;

pub fn command_catalog(_matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    println!("{}", config.load_catalog()?.to_json());
    Ok(())
}
