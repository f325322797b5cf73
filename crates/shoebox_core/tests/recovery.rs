//! Restart and failure behavior of the commit log.

use shoebox_core::{CoreError, Database};
use shoebox_testkit::prelude::*;

#[test]
fn committed_batches_survive_restart() {
    let db = TestDatabase::file();
    db.transaction(|txn| {
        txn.put(b"a", b"1")?;
        txn.put(b"b", b"2")
    })
    .unwrap();
    db.handle().delete(b"a").unwrap();
    let seq = db.committed_seq();

    let db = db.reopen();
    assert_eq!(db.committed_seq(), seq);
    assert_eq!(db.handle().get(b"a").unwrap(), None);
    assert_eq!(db.handle().get(b"b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn torn_tail_drops_only_the_last_batch() {
    let db = TestDatabase::file();
    db.handle().put(b"first", b"1").unwrap();
    db.handle().put(b"second", b"2").unwrap();
    let before_last = db.committed_seq().as_u64() - 1;

    let db = db.reopen_after(|log| {
        truncate_tail(log, 3).unwrap();
    });
    assert_eq!(db.committed_seq().as_u64(), before_last);
    assert_eq!(db.handle().get(b"first").unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.handle().get(b"second").unwrap(), None);

    // The torn bytes were cut, so new commits replay cleanly.
    db.handle().put(b"third", b"3").unwrap();
    let db = db.reopen();
    assert_eq!(db.handle().get(b"third").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn trailing_garbage_is_discarded() {
    let db = TestDatabase::file();
    db.handle().put(b"k", b"v").unwrap();
    let log = db.log_path().unwrap();
    let clean_len = log_len(&log).unwrap();

    let db = db.reopen_after(|log| append_garbage(log, &[0xde, 0xad, 0xbe, 0xef, 0x01]).unwrap());
    assert_eq!(db.handle().get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(log_len(&log).unwrap(), clean_len);
}

#[test]
fn corrupt_last_record_is_dropped() {
    let db = TestDatabase::file();
    db.handle().put(b"keep", b"1").unwrap();
    db.handle().put(b"lose", b"2").unwrap();

    let db = db.reopen_after(|log| flip_byte_from_end(log, 0).unwrap());
    assert!(db.handle().exists(b"keep").unwrap());
    assert!(!db.handle().exists(b"lose").unwrap());
}

#[test]
fn failed_commit_leaves_state_and_log_untouched() {
    let db = TestDatabase::memory();
    db.handle().put(b"a", b"1").unwrap();
    let seq = db.committed_seq();
    let log_before = db.log_bytes().unwrap();

    let switch = db.fault_switch().unwrap();
    switch.fail_writes();
    let txn = db.new_transaction().unwrap();
    txn.put(b"a", b"2").unwrap();
    txn.put(b"b", b"3").unwrap();
    assert!(matches!(txn.commit(), Err(CoreError::Storage(_))));

    assert_eq!(db.committed_seq(), seq);
    assert_eq!(db.handle().get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.log_bytes().unwrap(), log_before);
    assert_eq!(txn.pending_count(), 2);

    switch.heal();
    let committed = txn.commit().unwrap();
    assert_eq!(committed, seq.next());

    let db = db.reopen();
    assert_eq!(db.handle().get(b"a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.handle().get(b"b").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn second_open_of_a_directory_is_locked() {
    with_file_db(|_db, path| {
        assert!(matches!(Database::open(path), Err(CoreError::DatabaseLocked)));
    });
}
