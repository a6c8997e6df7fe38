use crate::*;
use digest::Digest;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Default bound on a single ledger call
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(5);

/// A logical key-value partition of the ledger
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Voters,
    Ballots,
}

impl Namespace {
    pub fn name(&self) -> &'static str {
        match self {
            Namespace::Voters => "voters",
            Namespace::Ballots => "ballots",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Transaction identifier returned by every ledger write, usable as a receipt
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    /// Hash of a fresh nonce and the write it identifies
    fn generate(namespace: Namespace, key: &str, value: &[u8]) -> Self {
        let mut nonce = [0u8; 24];
        OsRng.fill_bytes(&mut nonce);

        let mut sha = Sha256::new();
        sha.update(&nonce);
        sha.update(namespace.name().as_bytes());
        sha.update(key.as_bytes());
        sha.update(value);
        TxId(hex::encode(sha.finalize()))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A condition a transaction requires of ledger state at commit time
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Precondition {
    Exists(Namespace, String),
    Absent(Namespace, String),
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Precondition::Exists(ns, key) => write!(f, "{}/{} must exist", ns, key),
            Precondition::Absent(ns, key) => write!(f, "{}/{} must not exist", ns, key),
        }
    }
}

/// The write half of a transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Put(Vec<u8>),
    Delete,
}

pub type ScanItem = Result<(String, Vec<u8>), LedgerError>;

/// A lazily consumed range scan, in lexicographic key order
pub type Scan = Box<dyn Iterator<Item = ScanItem> + Send>;

/// The ledger as seen by this crate: per-key put/get/delete and ordered range
/// scans over two namespaces. Every call is atomic on its own.
pub trait Ledger: Send + Sync {
    /// Apply `mutation` to `namespace/key` iff every precondition holds, as one
    /// atomic transaction. A delete implicitly requires the key to exist.
    fn commit(
        &self,
        namespace: Namespace,
        key: &str,
        mutation: Mutation,
        preconditions: &[Precondition],
    ) -> Result<TxId, LedgerError>;

    /// Get a value. Absence is `Ok(None)`, not an error.
    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Scan `[start, end)`. An empty bound is unbounded on that side.
    fn scan_range(&self, namespace: Namespace, start: &str, end: &str) -> Result<Scan, LedgerError>;

    fn put(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<TxId, LedgerError> {
        self.commit(namespace, key, Mutation::Put(value.to_vec()), &[])
    }

    fn delete(&self, namespace: Namespace, key: &str) -> Result<TxId, LedgerError> {
        self.commit(namespace, key, Mutation::Delete, &[])
    }

    fn exists(&self, namespace: Namespace, key: &str) -> Result<bool, LedgerError> {
        Ok(self.get(namespace, key)?.is_some())
    }

    /// Scan a whole namespace
    fn scan_all(&self, namespace: Namespace) -> Result<Scan, LedgerError> {
        self.scan_range(namespace, "", "")
    }
}

impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    fn commit(
        &self,
        namespace: Namespace,
        key: &str,
        mutation: Mutation,
        preconditions: &[Precondition],
    ) -> Result<TxId, LedgerError> {
        (**self).commit(namespace, key, mutation, preconditions)
    }

    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        (**self).get(namespace, key)
    }

    fn scan_range(&self, namespace: Namespace, start: &str, end: &str) -> Result<Scan, LedgerError> {
        (**self).scan_range(namespace, start, end)
    }
}

/// Both namespaces of a ledger, as plain ordered maps.
///
/// Shared by the in-memory and file-backed ledgers; callers provide the
/// locking that makes each call atomic.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct LedgerState {
    voters: BTreeMap<String, Vec<u8>>,
    ballots: BTreeMap<String, Vec<u8>>,
}

impl LedgerState {
    fn namespace(&self, namespace: Namespace) -> &BTreeMap<String, Vec<u8>> {
        match namespace {
            Namespace::Voters => &self.voters,
            Namespace::Ballots => &self.ballots,
        }
    }

    fn namespace_mut(&mut self, namespace: Namespace) -> &mut BTreeMap<String, Vec<u8>> {
        match namespace {
            Namespace::Voters => &mut self.voters,
            Namespace::Ballots => &mut self.ballots,
        }
    }

    pub(crate) fn from_parts(
        voters: BTreeMap<String, Vec<u8>>,
        ballots: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        LedgerState { voters, ballots }
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<String, Vec<u8>>, BTreeMap<String, Vec<u8>>) {
        (self.voters, self.ballots)
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.namespace(namespace).len()
    }

    pub fn get(&self, namespace: Namespace, key: &str) -> Option<&Vec<u8>> {
        self.namespace(namespace).get(key)
    }

    pub fn commit(
        &mut self,
        namespace: Namespace,
        key: &str,
        mutation: Mutation,
        preconditions: &[Precondition],
    ) -> Result<TxId, LedgerError> {
        if key.is_empty() {
            return Err(LedgerError::NotWritable {
                namespace,
                reason: "empty key".to_owned(),
            });
        }

        for condition in preconditions {
            let holds = match condition {
                Precondition::Exists(ns, k) => self.namespace(*ns).contains_key(k),
                Precondition::Absent(ns, k) => !self.namespace(*ns).contains_key(k),
            };
            if !holds {
                return Err(LedgerError::PreconditionFailed(condition.clone()));
            }
        }

        let store = self.namespace_mut(namespace);
        match mutation {
            Mutation::Put(value) => {
                let tx_id = TxId::generate(namespace, key, &value);
                store.insert(key.to_owned(), value);
                Ok(tx_id)
            }
            Mutation::Delete => match store.remove(key) {
                Some(value) => Ok(TxId::generate(namespace, key, &value)),
                None => Err(LedgerError::NotFound {
                    namespace,
                    key: key.to_owned(),
                }),
            },
        }
    }

    /// Snapshot of `[start, end)`
    pub fn range(&self, namespace: Namespace, start: &str, end: &str) -> Vec<(String, Vec<u8>)> {
        self.page(namespace, lower_bound(start), end, usize::MAX)
    }

    /// At most `limit` entries from `lower` up to `end`
    fn page(
        &self,
        namespace: Namespace,
        lower: Bound<String>,
        end: &str,
        limit: usize,
    ) -> Vec<(String, Vec<u8>)> {
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end.to_owned())
        };
        match (&lower, &upper) {
            // BTreeMap::range panics on an inverted or empty excluded range
            (Bound::Included(s), Bound::Excluded(e)) | (Bound::Excluded(s), Bound::Excluded(e))
                if s >= e =>
            {
                return vec![]
            }
            _ => {}
        }

        self.namespace(namespace)
            .range((lower, upper))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn lower_bound(start: &str) -> Bound<String> {
    if start.is_empty() {
        Bound::Unbounded
    } else {
        Bound::Included(start.to_owned())
    }
}

/// Entries copied out of a `MemLedger` per read lock
const SCAN_PAGE_SIZE: usize = 64;

/// Lazy scan over a `MemLedger`, taking the read lock once per page so
/// writers are not held off for the whole scan
struct MemScan {
    ledger: MemLedger,
    namespace: Namespace,
    end: String,
    next: Bound<String>,
    page: std::vec::IntoIter<(String, Vec<u8>)>,
    done: bool,
}

impl MemScan {
    fn new(
        ledger: MemLedger,
        namespace: Namespace,
        start: &str,
        end: &str,
    ) -> Result<Self, LedgerError> {
        let mut scan = MemScan {
            ledger,
            namespace,
            end: end.to_owned(),
            next: lower_bound(start),
            page: Vec::new().into_iter(),
            done: false,
        };
        scan.fetch()?;
        Ok(scan)
    }

    fn fetch(&mut self) -> Result<(), LedgerError> {
        let entries = self.ledger.read()?.page(
            self.namespace,
            self.next.clone(),
            &self.end,
            SCAN_PAGE_SIZE,
        );
        if entries.len() < SCAN_PAGE_SIZE {
            self.done = true;
        }
        if let Some((last, _)) = entries.last() {
            self.next = Bound::Excluded(last.clone());
        }
        self.page = entries.into_iter();
        Ok(())
    }
}

impl Iterator for MemScan {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        if let Some(entry) = self.page.next() {
            return Some(Ok(entry));
        }
        if self.done {
            return None;
        }
        if let Err(e) = self.fetch() {
            self.done = true;
            return Some(Err(e));
        }
        self.page.next().map(Ok)
    }
}

/// Retry `attempt` until it yields a value or `timeout` elapses
pub(crate) fn acquire_within<T, F>(timeout: Duration, mut attempt: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Result<Option<T>, LedgerError>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(acquired) = attempt()? {
            return Ok(acquired);
        }
        if Instant::now() >= deadline {
            return Err(LedgerError::Timeout(timeout));
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// A simple ledger that uses in-memory BTreeMaps
#[derive(Clone)]
pub struct MemLedger {
    inner: Arc<RwLock<LedgerState>>,
    timeout: Duration,
}

impl Default for MemLedger {
    fn default() -> Self {
        MemLedger::new(DEFAULT_LEDGER_TIMEOUT)
    }
}

impl MemLedger {
    pub fn new(timeout: Duration) -> Self {
        MemLedger {
            inner: Arc::new(RwLock::new(LedgerState::default())),
            timeout,
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Result<LedgerState, LedgerError> {
        Ok(self.read()?.clone())
    }

    /// Block every other caller until the guard is dropped
    #[cfg(test)]
    pub(crate) fn hold_for_test(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.inner.write().unwrap()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, LedgerError> {
        acquire_within(self.timeout, || match self.inner.try_read() {
            Ok(guard) => Ok(Some(guard)),
            Err(std::sync::TryLockError::WouldBlock) => Ok(None),
            Err(std::sync::TryLockError::Poisoned(_)) => {
                Err(LedgerError::Corrupt("ledger lock poisoned".to_owned()))
            }
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, LedgerError> {
        acquire_within(self.timeout, || match self.inner.try_write() {
            Ok(guard) => Ok(Some(guard)),
            Err(std::sync::TryLockError::WouldBlock) => Ok(None),
            Err(std::sync::TryLockError::Poisoned(_)) => {
                Err(LedgerError::Corrupt("ledger lock poisoned".to_owned()))
            }
        })
    }
}

impl Ledger for MemLedger {
    fn commit(
        &self,
        namespace: Namespace,
        key: &str,
        mutation: Mutation,
        preconditions: &[Precondition],
    ) -> Result<TxId, LedgerError> {
        self.write()?.commit(namespace, key, mutation, preconditions)
    }

    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.read()?.get(namespace, key).cloned())
    }

    fn scan_range(&self, namespace: Namespace, start: &str, end: &str) -> Result<Scan, LedgerError> {
        let scan = MemScan::new(self.clone(), namespace, start, end)?;
        Ok(Box::new(scan))
    }
}

impl From<LedgerState> for MemLedger {
    fn from(state: LedgerState) -> Self {
        MemLedger {
            inner: Arc::new(RwLock::new(state)),
            timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let ledger = MemLedger::default();
        assert_eq!(ledger.get(Namespace::Voters, "a").unwrap(), None);

        let tx1 = ledger.put(Namespace::Voters, "a", b"1").unwrap();
        let tx2 = ledger.put(Namespace::Voters, "b", b"2").unwrap();
        assert_ne!(tx1, tx2);
        assert_eq!(tx1.0.len(), 64);

        assert_eq!(ledger.get(Namespace::Voters, "a").unwrap(), Some(b"1".to_vec()));
        // Namespaces are independent
        assert!(!ledger.exists(Namespace::Ballots, "a").unwrap());

        ledger.delete(Namespace::Voters, "a").unwrap();
        assert!(!ledger.exists(Namespace::Voters, "a").unwrap());
        assert!(matches!(
            ledger.delete(Namespace::Voters, "a"),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_scan_range_order_and_bounds() {
        let ledger = MemLedger::default();
        for key in &["c", "a", "d", "b"] {
            ledger.put(Namespace::Ballots, key, key.as_bytes()).unwrap();
        }

        let keys = |start: &str, end: &str| -> Vec<String> {
            ledger
                .scan_range(Namespace::Ballots, start, end)
                .unwrap()
                .map(|item| item.unwrap().0)
                .collect()
        };

        assert_eq!(keys("", ""), vec!["a", "b", "c", "d"]);
        assert_eq!(keys("b", ""), vec!["b", "c", "d"]);
        assert_eq!(keys("", "c"), vec!["a", "b"]);
        assert_eq!(keys("b", "d"), vec!["b", "c"]);
        assert!(keys("d", "a").is_empty());
    }

    #[test]
    fn test_scan_spans_pages() {
        let ledger = MemLedger::default();
        let total = SCAN_PAGE_SIZE * 2 + 5;
        for i in 0..total {
            let key = format!("{:04}", i);
            ledger.put(Namespace::Voters, &key, key.as_bytes()).unwrap();
        }

        let mut scan = ledger.scan_all(Namespace::Voters).unwrap();
        let first: Vec<String> = scan.by_ref().take(3).map(|item| item.unwrap().0).collect();
        assert_eq!(first, vec!["0000", "0001", "0002"]);

        // Writes between pages do not block on the open scan
        ledger.put(Namespace::Voters, "9999", b"late").unwrap();
        ledger.delete(Namespace::Voters, "0001").unwrap();

        let rest: Vec<String> = scan.map(|item| item.unwrap().0).collect();
        assert_eq!(rest.len(), total - 3 + 1);
        assert_eq!(rest.first().map(String::as_str), Some("0003"));
        assert_eq!(rest.last().map(String::as_str), Some("9999"));
        assert!(rest.windows(2).all(|w| w[0] < w[1]));

        let bounded = ledger
            .scan_range(Namespace::Voters, "0060", "0070")
            .unwrap()
            .count();
        assert_eq!(bounded, 10);
    }

    #[test]
    fn test_preconditions() {
        let ledger = MemLedger::default();
        let requires = [
            Precondition::Exists(Namespace::Voters, "v1".to_owned()),
            Precondition::Absent(Namespace::Ballots, "v1".to_owned()),
        ];

        match ledger.commit(Namespace::Ballots, "v1", Mutation::Put(b"x".to_vec()), &requires) {
            Err(LedgerError::PreconditionFailed(Precondition::Exists(ns, _))) => {
                assert_eq!(ns, Namespace::Voters)
            }
            other => panic!("unexpected result {:?}", other),
        }

        ledger.put(Namespace::Voters, "v1", b"voter").unwrap();
        ledger
            .commit(Namespace::Ballots, "v1", Mutation::Put(b"x".to_vec()), &requires)
            .unwrap();

        match ledger.commit(Namespace::Ballots, "v1", Mutation::Put(b"y".to_vec()), &requires) {
            Err(LedgerError::PreconditionFailed(Precondition::Absent(ns, _))) => {
                assert_eq!(ns, Namespace::Ballots)
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(ledger.get(Namespace::Ballots, "v1").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_lock_timeout_is_retryable() {
        let ledger = MemLedger::new(Duration::from_millis(20));
        let _held = ledger.hold_for_test();

        let err = ledger.get(Namespace::Voters, "a").unwrap_err();
        assert!(matches!(err, LedgerError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(!LedgerError::PreconditionFailed(Precondition::Absent(
            Namespace::Ballots,
            "a".to_owned()
        ))
        .is_retryable());
    }
}
