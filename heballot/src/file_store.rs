use crate::*;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LEDGER_FILE: &str = "ledger.json";
const LOCK_FILE: &str = "ledger.lock";

/// On-disk form of a ledger: values base-64 encoded, keys in order
#[derive(Serialize, Deserialize, Default)]
struct LedgerDocument {
    #[serde(default)]
    voters: BTreeMap<String, String>,
    #[serde(default)]
    ballots: BTreeMap<String, String>,
}

/// A ledger persisted as a single JSON document in a directory.
///
/// Every call takes an exclusive lock on `ledger.lock`, reloads the document,
/// applies itself and (for writes) saves before unlocking, so calls from
/// separate processes are serialized against each other.
#[derive(Clone, Debug)]
pub struct FileLedger {
    dir: PathBuf,
    timeout: Duration,
}

impl FileLedger {
    pub fn open<P: AsRef<Path>>(dir: P, timeout: Duration) -> Result<Self, LedgerError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileLedger { dir, timeout })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> Result<File, LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.dir.join(LOCK_FILE))?;

        acquire_within(self.timeout, || match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(())),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e.into()),
        })?;
        Ok(file)
    }

    fn load(&self) -> Result<LedgerState, LedgerError> {
        let path = self.dir.join(LEDGER_FILE);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerState::default())
            }
            Err(e) => return Err(e.into()),
        };

        let doc: LedgerDocument = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| LedgerError::Corrupt(format!("{}: {}", path.display(), e)))?;

        Ok(LedgerState::from_parts(
            decode_values(doc.voters)?,
            decode_values(doc.ballots)?,
        ))
    }

    fn save(&self, state: LedgerState) -> Result<(), LedgerError> {
        let (voters, ballots) = state.into_parts();
        let doc = LedgerDocument {
            voters: encode_values(voters),
            ballots: encode_values(ballots),
        };

        let tmp = self.dir.join(format!(".{}.tmp", LEDGER_FILE));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &doc)
                .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(tmp, self.dir.join(LEDGER_FILE))?;
        Ok(())
    }
}

impl Ledger for FileLedger {
    fn commit(
        &self,
        namespace: Namespace,
        key: &str,
        mutation: Mutation,
        preconditions: &[Precondition],
    ) -> Result<TxId, LedgerError> {
        let _lock = self.lock()?;
        let mut state = self.load()?;
        let tx_id = state.commit(namespace, key, mutation, preconditions)?;
        self.save(state)?;
        debug!("ledger: committed {}/{} as {}", namespace, key, tx_id);
        Ok(tx_id)
    }

    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let _lock = self.lock()?;
        Ok(self.load()?.get(namespace, key).cloned())
    }

    fn scan_range(&self, namespace: Namespace, start: &str, end: &str) -> Result<Scan, LedgerError> {
        let _lock = self.lock()?;
        let entries = self.load()?.range(namespace, start, end);
        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}

fn encode_values(values: BTreeMap<String, Vec<u8>>) -> BTreeMap<String, String> {
    values
        .into_iter()
        .map(|(k, v)| (k, base64::encode(v)))
        .collect()
}

fn decode_values(values: BTreeMap<String, String>) -> Result<BTreeMap<String, Vec<u8>>, LedgerError> {
    values
        .into_iter()
        .map(|(k, v)| match base64::decode(&v) {
            Ok(bytes) => Ok((k, bytes)),
            Err(e) => Err(LedgerError::Corrupt(format!("value of {}: {}", k, e))),
        })
        .collect()
}
