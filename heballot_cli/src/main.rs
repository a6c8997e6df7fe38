#[macro_use]
extern crate log;

use anyhow::Result;
use clap::{App, AppSettings, Arg, SubCommand};
use std::path::PathBuf;

mod command_catalog;
mod command_keygen;
mod command_register;
mod command_tally;
mod command_verify;
mod command_vote;
mod command_voters;
mod config;

use command_catalog::command_catalog;
use command_keygen::command_keygen;
use command_register::command_register;
use command_tally::command_tally;
use command_verify::command_verify;
use command_vote::command_vote;
use command_voters::command_voters;
use config::Config;

#[derive(PartialEq, Copy, Clone, Debug)]
enum Verbosity {
    Silent,
    Warn,
    Info,
    Debug,
}

impl Verbosity {
    fn filter(self) -> &'static str {
        match self {
            Verbosity::Silent => "off",
            Verbosity::Warn => "warn",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        }
    }
}

fn main() {
    let matches = App::new("heballot")
        .version("0.1.0")
        .author("Patrick Hayes <patrick.d.hayes@gmail.com>")
        .about("Registers voters, casts encrypted ballots and tallies them homomorphically")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .global(true)
                .help("Silence all logging"),
        )
        .arg(
            Arg::with_name("key-dir")
                .long("key-dir")
                .takes_value(true)
                .global(true)
                .help("Directory holding the homomorphic keys - can also be set with HEBALLOT_KEY_DIR"),
        )
        .arg(
            Arg::with_name("ledger-dir")
                .long("ledger-dir")
                .takes_value(true)
                .global(true)
                .help("Directory holding the ledger - can also be set with HEBALLOT_LEDGER_DIR"),
        )
        .subcommand(
            SubCommand::with_name("keygen")
                .about("Generate the homomorphic key pair, or load it if it already exists"),
        )
        .subcommand(
            SubCommand::with_name("register")
                .about("Register a voter")
                .arg(
                    Arg::with_name("district")
                        .long("district")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("area")
                        .long("area")
                        .takes_value(true)
                        .required(true)
                        .help("Area number within the district"),
                )
                .arg(
                    Arg::with_name("first-name")
                        .long("first-name")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("middle-name")
                        .long("middle-name")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("last-name")
                        .long("last-name")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("dob")
                        .long("dob")
                        .takes_value(true)
                        .required(true)
                        .help("Date of birth"),
                )
                .arg(
                    Arg::with_name("personal-id")
                        .long("personal-id")
                        .takes_value(true)
                        .required(true)
                        .help("Identity document number; only its hash is logged"),
                ),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Cast an encrypted ballot")
                .arg(
                    Arg::with_name("VOTER-ID")
                        .index(1)
                        .required(true)
                        .help("16 digit voter id"),
                )
                .arg(
                    Arg::with_name("CANDIDATE-ID")
                        .index(2)
                        .required(true)
                        .help("Candidate id from the catalog"),
                )
                .arg(
                    Arg::with_name("district")
                        .long("district")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("area")
                        .long("area")
                        .takes_value(true)
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Decrypt a voter's own ballot and show the candidate it selects")
                .arg(Arg::with_name("VOTER-ID").index(1).required(true)),
        )
        .subcommand(SubCommand::with_name("tally").about("Tabulate every ballot on the ledger"))
        .subcommand(
            SubCommand::with_name("voters")
                .about("List registered voters, or show one")
                .arg(Arg::with_name("VOTER-ID").index(1).required(false)),
        )
        .subcommand(SubCommand::with_name("catalog").about("Print the candidate catalog"))
        .get_matches();

    let verbosity = if matches.is_present("quiet") {
        Verbosity::Silent
    } else {
        match matches.occurrences_of("v") {
            0 => Verbosity::Warn,
            1 => Verbosity::Info,
            _ => Verbosity::Debug,
        }
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("HEBALLOT_LOG", verbosity.filter()),
    )
    .init();

    if let Err(e) = run(&matches) {
        eprintln!("heballot: {:#}", e);
        std::process::exit(1);
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(dir) = matches.value_of("key-dir") {
        config.key_dir = expand(dir)?;
    }
    if let Some(dir) = matches.value_of("ledger-dir") {
        config.ledger_dir = expand(dir)?;
    }

    // Subcommands
    match matches.subcommand() {
        ("keygen", Some(matches)) => command_keygen(matches, &config),
        ("register", Some(matches)) => command_register(matches, &config),
        ("vote", Some(matches)) => command_vote(matches, &config),
        ("verify", Some(matches)) => command_verify(matches, &config),
        ("tally", Some(matches)) => command_tally(matches, &config),
        ("voters", Some(matches)) => command_voters(matches, &config),
        ("catalog", Some(matches)) => command_catalog(matches, &config),
        _ => Ok(()),
    }
}

/// Expand `~` and environment variables in a path argument
pub fn expand(input: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(input)?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a required argument
pub fn parse_arg<T>(matches: &clap::ArgMatches, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = matches
        .value_of(name)
        .ok_or_else(|| anyhow::anyhow!("{} is required", name))?;
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {} {:?}: {}", name, value, e))
}
