use super::*;
use std::sync::Arc;
use std::thread;

#[test]
fn end_to_end_election() {
    let ledger = MemLedger::default();
    let blobs = MemBlobStore::default();
    let keys = KeyStore::new(&blobs, SchemeParameters::new().unwrap());
    let election = Election::new(ledger.clone(), keys, CandidateCatalog::default());

    let area_a = AreaKey::new("kathmandu", 1);
    let area_b = AreaKey::new("kathmandu", 2);

    // Three voters in area A, one registered but silent voter in area B
    let v1 = register_in(&election, &area_a);
    let v2 = register_in(&election, &area_a);
    let v3 = register_in(&election, &area_a);
    let silent = register_in(&election, &area_b);

    let r1 = vote_in(&election, &v1, &area_a, 101).unwrap();
    let r2 = vote_in(&election, &v2, &area_a, 102).unwrap();
    let r3 = vote_in(&election, &v3, &area_a, 101).unwrap();
    assert_ne!(r1.tx_id, r2.tx_id);
    assert_ne!(r2.tx_id, r3.tx_id);

    // Ballots on the ledger are ciphertexts, not selections
    let stored = election.ballots().read_vote(&v1).unwrap();
    assert!(stored.ballot.len() > 1000);
    assert_eq!(stored.area_key(), area_a);

    // Second attempt by the same voter
    assert!(matches!(
        vote_in(&election, &v1, &area_a, 102),
        Err(Error::AlreadyVoted(_))
    ));
    // Unregistered voter
    assert!(matches!(
        vote_in(&election, "1111222233334444", &area_a, 101),
        Err(Error::VoterNotFound(_))
    ));
    assert_eq!(
        election.eligibility(&silent).unwrap(),
        EligibilityState::Registered
    );

    let tabulation = election.tabulate().unwrap();
    assert_eq!(tabulation.ballots_scanned, 3);

    let a = tabulation.area(&area_a).unwrap();
    assert_eq!(a.status, TallyStatus::Counted);
    assert_eq!(a.vote_count(CandidateId(101)), Some(2));
    assert_eq!(a.vote_count(CandidateId(102)), Some(1));
    assert_eq!(a.vote_count(CandidateId(103)), Some(0));
    assert_eq!(a.vote_count(CandidateId(104)), Some(0));

    let b = tabulation.area(&area_b).unwrap();
    assert_eq!(b.status, TallyStatus::Empty);
    assert!(b.candidates.iter().all(|c| c.vote_count == 0));

    // Aggregate never exceeds the ballots scanned for the area
    for area in &tabulation.areas {
        let total: u64 = area.candidates.iter().map(|c| c.vote_count).sum();
        assert!(total <= area.ballots_counted as u64);
    }

    assert_eq!(
        election.verify_vote(&v2).unwrap().to_string(),
        "You've voted for CPN (UML)"
    );

    // A second process over the same key store and ledger reads the same keys
    let reopened = Election::new(
        ledger,
        KeyStore::new(&blobs, SchemeParameters::new().unwrap()),
        CandidateCatalog::default(),
    );
    assert_eq!(
        reopened.keys().ensure_keys().unwrap().public_bytes(),
        election.keys().ensure_keys().unwrap().public_bytes()
    );
    assert_eq!(reopened.tabulate().unwrap(), tabulation);
}

fn register_in<B: BlobStore>(election: &Election<MemLedger, B>, area: &AreaKey) -> String {
    election
        .register_voter(&Registration {
            area_number: area.area_number,
            dob: "2000-01-01".to_owned(),
            district: area.district.clone(),
            first_name: "Test".to_owned(),
            last_name: "Voter".to_owned(),
            middle_name: String::new(),
            personal_id: generate_voter_id(),
        })
        .unwrap()
        .id
}

fn vote_in<B: BlobStore>(
    election: &Election<MemLedger, B>,
    voter_id: &str,
    area: &AreaKey,
    candidate: u32,
) -> Result<Receipt, Error> {
    election.cast_vote(&CastRequest {
        area_number: area.area_number,
        candidate: CandidateId(candidate),
        district: area.district.clone(),
        voter_id: voter_id.to_owned(),
    })
}

#[test]
fn concurrent_casts_record_one_ballot() {
    let keys = KeyStore::new(MemBlobStore::default(), SchemeParameters::new().unwrap());
    let election = Arc::new(Election::new(
        MemLedger::default(),
        keys,
        CandidateCatalog::default(),
    ));
    let area = AreaKey::new("lalitpur", 1);
    let voter = register_in(&election, &area);

    // Generate keys up front so the threads contend on the ledger only
    election.keys().ensure_keys().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let election = Arc::clone(&election);
            let voter = voter.clone();
            let area = area.clone();
            thread::spawn(move || vote_in(&election, &voter, &area, 101 + (i % 4)))
        })
        .collect();

    let results: Vec<Result<Receipt, Error>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    for rejected in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(rejected, Error::AlreadyVoted(_)));
    }

    let tabulation = election.tabulate().unwrap();
    let total: u64 = tabulation
        .area(&area)
        .unwrap()
        .candidates
        .iter()
        .map(|c| c.vote_count)
        .sum();
    assert_eq!(total, 1);
}

#[test]
fn file_backed_election() {
    let dir = tempfile::tempdir().unwrap();
    let params = SchemeParameters::new().unwrap();

    let open = || {
        let ledger = FileLedger::open(dir.path().join("ledger"), DEFAULT_LEDGER_TIMEOUT).unwrap();
        let keys = KeyStore::new(DirBlobStore::new(dir.path().join("keys")), params.clone());
        Election::new(ledger, keys, CandidateCatalog::default())
    };

    let area = AreaKey::new("bhaktapur", 3);
    let voter = {
        let election = open();
        let voter = election
            .register_voter(&Registration {
                area_number: 3,
                dob: "1999-09-09".to_owned(),
                district: "bhaktapur".to_owned(),
                first_name: "Gita".to_owned(),
                last_name: "Rai".to_owned(),
                middle_name: String::new(),
                personal_id: "0001".to_owned(),
            })
            .unwrap();
        election
            .cast_vote(&CastRequest {
                area_number: 3,
                candidate: CandidateId(302),
                district: "bhaktapur".to_owned(),
                voter_id: voter.id.clone(),
            })
            .unwrap();
        voter
    };

    let election = open();
    assert_eq!(
        election.eligibility(&voter.id).unwrap(),
        EligibilityState::Voted
    );
    assert_eq!(
        election.tabulate().unwrap().vote_count(&area, CandidateId(302)),
        Some(1)
    );
    assert_eq!(election.verify_vote(&voter.id).unwrap().candidate, CandidateId(302));
}
