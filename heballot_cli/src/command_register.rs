use crate::config::Config;
use anyhow::Result;
use heballot::Registration;

pub fn command_register(matches: &clap::ArgMatches, config: &Config) -> Result<()> {
    let registration = Registration {
        area_number: crate::parse_arg(matches, "area")?,
        dob: crate::parse_arg(matches, "dob")?,
        district: crate::parse_arg(matches, "district")?,
        first_name: crate::parse_arg(matches, "first-name")?,
        last_name: crate::parse_arg(matches, "last-name")?,
        middle_name: matches.value_of("middle-name").unwrap_or_default().to_owned(),
        personal_id: crate::parse_arg(matches, "personal-id")?,
    };

    let election = config.election()?;
    let voter = election.register_voter(&registration)?;
    crate::print_json(&voter)
}
