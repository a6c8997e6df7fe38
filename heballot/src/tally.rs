use crate::*;
use fhe::bfv::SecretKey;
use indexmap::IndexMap;

/// Final count for one candidate
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTally {
    pub id: CandidateId,
    pub logo: String,
    pub name: String,
    pub vote_count: u64,
}

/// How an area's counts were arrived at
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TallyStatus {
    /// At least one ballot was decrypted and counted
    Counted,

    /// No ballots were cast in the area
    Empty,

    /// The area's ballots could not be counted; all counts are reported as zero
    Degraded { reason: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AreaTally {
    pub area_number: u32,
    pub ballots_counted: usize,
    pub candidates: Vec<CandidateTally>,
    pub district: String,
    #[serde(flatten)]
    pub status: TallyStatus,
}

impl AreaTally {
    pub fn area_key(&self) -> AreaKey {
        AreaKey::new(&self.district, self.area_number)
    }

    pub fn vote_count(&self, candidate: CandidateId) -> Option<u64> {
        self.candidates
            .iter()
            .find(|c| c.id == candidate)
            .map(|c| c.vote_count)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, TallyStatus::Degraded { .. })
    }
}

/// Per-area results in catalog order, plus what the scan had to leave out
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tabulation {
    pub areas: Vec<AreaTally>,

    /// Ballot records read from the ledger
    pub ballots_scanned: usize,

    /// Records that were not valid ballots, or named an area not in the catalog
    pub records_skipped: usize,
}

impl Tabulation {
    pub fn area(&self, key: &AreaKey) -> Option<&AreaTally> {
        self.areas.iter().find(|a| a.area_key() == *key)
    }

    pub fn vote_count(&self, key: &AreaKey, candidate: CandidateId) -> Option<u64> {
        self.area(key)?.vote_count(candidate)
    }
}

/// Running state of one area while the ballot scan is streamed
#[derive(Default)]
struct AreaSum {
    sum: Option<Ciphertext>,
    ballots: usize,
    error: Option<String>,
}

/// Sums each area's encrypted ballots and decrypts only the sums
pub struct TallyAggregator<'a> {
    cipher: &'a HomomorphicCipher,
    secret_key: &'a SecretKey,
}

impl<'a> TallyAggregator<'a> {
    pub fn new(cipher: &'a HomomorphicCipher, secret_key: &'a SecretKey) -> Self {
        TallyAggregator { cipher, secret_key }
    }

    /// Tabulate every ballot on the ledger against `catalog`.
    ///
    /// Ballots are folded into their area's running sum as the scan yields
    /// them, so memory stays at one ciphertext per area. A failure confined
    /// to one area degrades that area only. Ledger failures abort the whole
    /// tabulation.
    pub fn tabulate<L: Ledger>(
        &self,
        ballots: &BallotBox<L>,
        catalog: &CandidateCatalog,
    ) -> Result<Tabulation, Error> {
        let mut sums: IndexMap<&AreaKey, AreaSum> = catalog
            .areas()
            .map(|(key, _)| (key, AreaSum::default()))
            .collect();
        let mut unknown: IndexMap<AreaKey, usize> = IndexMap::new();
        let mut ballots_scanned = 0;
        let mut records_skipped = 0;

        for item in ballots.scan()? {
            let (key, bytes) = item?;
            ballots_scanned += 1;

            let record = match BallotRecord::from_json(&key, &bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!("tally: skipping unreadable ballot record: {}", e);
                    records_skipped += 1;
                    continue;
                }
            };

            let area_key = record.area_key();
            match sums.get_mut(&area_key) {
                Some(state) => self.add(state, &record),
                None => {
                    records_skipped += 1;
                    *unknown.entry(area_key).or_default() += 1;
                }
            }
        }

        for (key, skipped) in unknown {
            warn!(
                "tally: skipping {} ballot(s) for {}, which is not in the catalog",
                skipped, key
            );
        }

        let areas = catalog
            .areas()
            .zip(sums.into_iter())
            .map(|((key, area), (_, state))| self.tally_area(key, area, state))
            .collect();

        info!(
            "tally: {} ballot record(s) scanned, {} skipped",
            ballots_scanned, records_skipped
        );

        Ok(Tabulation {
            areas,
            ballots_scanned,
            records_skipped,
        })
    }

    /// Fold one ballot into its area. After the first failure the area only
    /// counts ballots.
    fn add(&self, state: &mut AreaSum, record: &BallotRecord) {
        if state.error.is_none() {
            let added = self
                .cipher
                .from_base64(&record.ballot)
                .and_then(|ct| self.cipher.accumulate(&mut state.sum, state.ballots, &ct));
            if let Err(e) = added {
                state.error = Some(format!("ballot of voter {}: {}", record.id, e));
            }
        }
        state.ballots += 1;
    }

    fn tally_area(&self, key: &AreaKey, area: &Area, state: AreaSum) -> AreaTally {
        let (counts, ballots_counted, status) = if state.ballots == 0 {
            (vec![0; area.len()], 0, TallyStatus::Empty)
        } else {
            match self.count(area, state) {
                Ok((counts, ballots)) => (counts, ballots, TallyStatus::Counted),
                Err(reason) => {
                    warn!("tally: {} degraded to zero counts: {}", key, reason);
                    (vec![0; area.len()], 0, TallyStatus::Degraded { reason })
                }
            }
        };

        let candidates = area
            .candidates()
            .zip(counts)
            .map(|((id, candidate), vote_count)| CandidateTally {
                id,
                logo: candidate.logo.clone(),
                name: candidate.name.clone(),
                vote_count,
            })
            .collect();

        AreaTally {
            area_number: key.area_number,
            ballots_counted,
            candidates,
            district: key.district.clone(),
            status,
        }
    }

    /// Decrypted per-candidate counts of one area's running sum
    fn count(&self, area: &Area, state: AreaSum) -> Result<(Vec<u64>, usize), String> {
        if let Some(error) = state.error {
            return Err(error);
        }
        let sum = state
            .sum
            .ok_or_else(|| "no ballots to sum".to_owned())?;

        let mut slots = self
            .cipher
            .decrypt(&sum, self.secret_key)
            .map_err(|e| e.to_string())?;

        if slots.iter().skip(area.len()).any(|s| *s != 0) {
            return Err("aggregate has votes outside the area's candidate slots".to_owned());
        }
        slots.truncate(area.len());
        let counts = decode_counts(slots);

        let total: u64 = counts.iter().sum();
        if total != state.ballots as u64 {
            return Err(format!(
                "counts sum to {} but {} ballots were cast",
                total, state.ballots
            ));
        }

        Ok((counts, state.ballots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        ledger: MemLedger,
        cipher: HomomorphicCipher,
        keys: std::sync::Arc<KeyPair>,
        catalog: CandidateCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture::with_params(SchemeParameters::new().unwrap())
        }

        fn with_params(params: std::sync::Arc<SchemeParameters>) -> Self {
            let keys = KeyStore::new(MemBlobStore::default(), params.clone())
                .ensure_keys()
                .unwrap();
            Fixture {
                ledger: MemLedger::default(),
                cipher: HomomorphicCipher::new(params),
                keys,
                catalog: CandidateCatalog::default(),
            }
        }

        fn cast(&self, voter_id: &str, area: &AreaKey, slots: Vec<u64>) {
            let ct = self
                .cipher
                .encrypt(&PlaintextVector::new(slots), self.keys.public_key())
                .unwrap();
            let record = BallotRecord {
                area_number: area.area_number,
                ballot: self.cipher.to_base64(&ct),
                district: area.district.clone(),
                id: voter_id.to_owned(),
            };
            self.ledger
                .put(Namespace::Ballots, voter_id, &record.to_json())
                .unwrap();
        }

        /// Store `copies` ballots under fresh voter ids, all carrying one ciphertext
        fn cast_copies(&self, first_id: usize, copies: usize, area: &AreaKey, slots: Vec<u64>) {
            let ct = self
                .cipher
                .encrypt(&PlaintextVector::new(slots), self.keys.public_key())
                .unwrap();
            let ballot = self.cipher.to_base64(&ct);
            for id in first_id..first_id + copies {
                let record = BallotRecord {
                    area_number: area.area_number,
                    ballot: ballot.clone(),
                    district: area.district.clone(),
                    id: format!("{:016}", id),
                };
                self.ledger
                    .put(Namespace::Ballots, &record.id, &record.to_json())
                    .unwrap();
            }
        }

        fn tabulate(&self) -> Tabulation {
            TallyAggregator::new(&self.cipher, self.keys.secret_key())
                .tabulate(&BallotBox::new(self.ledger.clone()), &self.catalog)
                .unwrap()
        }
    }

    #[test]
    fn test_tabulate_counts_and_order() {
        let f = Fixture::new();
        let area = AreaKey::new("kathmandu", 1);
        f.cast("1", &area, vec![1, 0, 0, 0]);
        f.cast("2", &area, vec![0, 1, 0, 0]);
        f.cast("3", &area, vec![1, 0, 0, 0]);

        let tab = f.tabulate();
        assert_eq!(tab.ballots_scanned, 3);
        assert_eq!(tab.records_skipped, 0);
        assert_eq!(tab.areas.len(), f.catalog.len());

        let a = tab.area(&area).unwrap();
        assert_eq!(a.status, TallyStatus::Counted);
        assert_eq!(a.ballots_counted, 3);
        let counts: Vec<u64> = a.candidates.iter().map(|c| c.vote_count).collect();
        assert_eq!(counts, vec![2, 1, 0, 0]);

        let b = tab.area(&AreaKey::new("lalitpur", 2)).unwrap();
        assert_eq!(b.status, TallyStatus::Empty);
        assert!(b.candidates.iter().all(|c| c.vote_count == 0));

        // Rerunning over the same records reproduces the counts
        assert_eq!(f.tabulate(), tab);
    }

    #[test]
    fn test_corrupt_ballot_degrades_its_area_only() {
        let f = Fixture::new();
        let good = AreaKey::new("kathmandu", 1);
        let bad = AreaKey::new("bhaktapur", 3);
        f.cast("1", &good, vec![0, 0, 1, 0]);
        f.cast("2", &bad, vec![1, 0, 0, 0]);

        let corrupt = BallotRecord {
            area_number: 3,
            ballot: base64::encode(b"not a ciphertext"),
            district: "bhaktapur".to_owned(),
            id: "3".to_owned(),
        };
        f.ledger
            .put(Namespace::Ballots, "3", &corrupt.to_json())
            .unwrap();

        let tab = f.tabulate();
        assert_eq!(tab.vote_count(&good, CandidateId(103)), Some(1));

        let degraded = tab.area(&bad).unwrap();
        assert!(degraded.is_degraded());
        assert_eq!(degraded.ballots_counted, 0);
        assert!(degraded.candidates.iter().all(|c| c.vote_count == 0));
    }

    #[test]
    fn test_tabulate_streams_many_ballots() {
        let f = Fixture::new();
        let area = AreaKey::new("kathmandu", 3);
        // Several scan pages worth of ballots, interleaved with another area
        f.cast_copies(0, 150, &area, vec![0, 0, 0, 1]);
        f.cast_copies(150, 90, &area, vec![0, 1, 0, 0]);
        f.cast_copies(240, 10, &AreaKey::new("lalitpur", 1), vec![1, 0, 0, 0]);

        let tab = f.tabulate();
        assert_eq!(tab.ballots_scanned, 250);

        let a = tab.area(&area).unwrap();
        assert_eq!(a.status, TallyStatus::Counted);
        assert_eq!(a.ballots_counted, 240);
        let counts: Vec<u64> = a.candidates.iter().map(|c| c.vote_count).collect();
        assert_eq!(counts, vec![0, 90, 0, 150]);
        assert_eq!(
            tab.vote_count(&AreaKey::new("lalitpur", 1), CandidateId(101)),
            Some(10)
        );
    }

    #[test]
    fn test_summand_cap_degrades_area() {
        let f = Fixture::with_params(SchemeParameters::with_max_summands(2).unwrap());
        let crowded = AreaKey::new("bhaktapur", 1);
        let quiet = AreaKey::new("bhaktapur", 2);
        f.cast_copies(0, 3, &crowded, vec![1, 0, 0, 0]);
        f.cast_copies(3, 2, &quiet, vec![0, 0, 1, 0]);

        let tab = f.tabulate();
        match &tab.area(&crowded).unwrap().status {
            TallyStatus::Degraded { reason } => {
                assert!(reason.contains("noise budget exhausted"), "{}", reason);
                assert!(reason.contains("3 summands requested"), "{}", reason);
            }
            other => panic!("expected a degraded area, got {:?}", other),
        }
        assert_eq!(tab.vote_count(&quiet, CandidateId(203)), Some(2));
    }

    #[test]
    fn test_malformed_ballot_degrades() {
        let f = Fixture::new();
        let area = AreaKey::new("lalitpur", 1);
        // Two selections in one ballot
        f.cast("1", &area, vec![1, 1, 0, 0]);
        assert!(f.tabulate().area(&area).unwrap().is_degraded());

        let f = Fixture::new();
        // A vote in a slot past the area's last candidate
        f.cast("1", &area, vec![0, 0, 0, 0, 1]);
        assert!(f.tabulate().area(&area).unwrap().is_degraded());
    }

    #[test]
    fn test_unknown_records_are_skipped() {
        let f = Fixture::new();
        f.cast("1", &AreaKey::new("pokhara", 1), vec![1, 0, 0, 0]);
        f.ledger.put(Namespace::Ballots, "2", b"garbage").unwrap();

        let tab = f.tabulate();
        assert_eq!(tab.ballots_scanned, 2);
        assert_eq!(tab.records_skipped, 2);
        assert!(tab
            .areas
            .iter()
            .all(|a| a.status == TallyStatus::Empty));
    }

    #[test]
    fn test_serialized_form() {
        let f = Fixture::new();
        let tab = f.tabulate();
        let json = serde_json::to_value(&tab.areas[0]).unwrap();
        assert_eq!(json["status"], "empty");
        assert_eq!(json["district"], "kathmandu");
        assert_eq!(json["candidates"][0]["voteCount"], 0);
    }
}
