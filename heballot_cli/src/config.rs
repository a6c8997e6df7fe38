use anyhow::{Context, Result};
use heballot::{
    CandidateCatalog, DirBlobStore, Election, FileLedger, KeyStore, SchemeParameters,
    DEFAULT_LEDGER_TIMEOUT, DEFAULT_MAX_SUMMANDS,
};
use std::env::var;
use std::path::PathBuf;
use std::time::Duration;

pub type FileElection = Election<FileLedger, DirBlobStore>;

pub struct Config {
    pub key_dir: PathBuf,
    pub ledger_dir: PathBuf,
    pub catalog: Option<PathBuf>,
    pub ledger_timeout: Duration,
    pub max_summands: usize,
}

impl Config {
    /// Read configuration from `HEBALLOT_*` environment variables, falling
    /// back to defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let key_dir = match var("HEBALLOT_KEY_DIR") {
            Ok(val) => crate::expand(&val)?,
            Err(_e) => PathBuf::from("./homomorphic_keys"),
        };

        let ledger_dir = match var("HEBALLOT_LEDGER_DIR") {
            Ok(val) => crate::expand(&val)?,
            Err(_e) => PathBuf::from("./ledger"),
        };

        let catalog = match var("HEBALLOT_CATALOG") {
            Ok(val) => Some(crate::expand(&val)?),
            Err(_e) => None,
        };

        let ledger_timeout = match var("HEBALLOT_LEDGER_TIMEOUT_MS") {
            Ok(val) => Duration::from_millis(
                val.trim()
                    .parse()
                    .with_context(|| format!("invalid HEBALLOT_LEDGER_TIMEOUT_MS: {}", val))?,
            ),
            Err(_e) => DEFAULT_LEDGER_TIMEOUT,
        };

        let max_summands = match var("HEBALLOT_MAX_SUMMANDS") {
            Ok(val) => val
                .trim()
                .parse()
                .with_context(|| format!("invalid HEBALLOT_MAX_SUMMANDS: {}", val))?,
            Err(_e) => DEFAULT_MAX_SUMMANDS,
        };

        Ok(Config {
            key_dir,
            ledger_dir,
            catalog,
            ledger_timeout,
            max_summands,
        })
    }

    pub fn load_catalog(&self) -> Result<CandidateCatalog> {
        match &self.catalog {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("unable to read catalog {}", path.display()))?;
                CandidateCatalog::from_json(&json)
                    .with_context(|| format!("invalid catalog {}", path.display()))
            }
            None => Ok(CandidateCatalog::default()),
        }
    }

    pub fn key_store(&self) -> Result<KeyStore<DirBlobStore>> {
        let params = SchemeParameters::with_max_summands(self.max_summands)?;
        Ok(KeyStore::new(DirBlobStore::new(&self.key_dir), params))
    }

    /// Open the election over the configured ledger and key directories
    pub fn election(&self) -> Result<FileElection> {
        let ledger = FileLedger::open(&self.ledger_dir, self.ledger_timeout).with_context(|| {
            format!("unable to open ledger at {}", self.ledger_dir.display())
        })?;
        debug!(
            "ledger {}, keys {}",
            self.ledger_dir.display(),
            self.key_dir.display()
        );
        Ok(Election::new(ledger, self.key_store()?, self.load_catalog()?))
    }
}
