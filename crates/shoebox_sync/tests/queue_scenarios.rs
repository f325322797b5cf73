//! Queue behavior through real tables and restarts.

use proptest::prelude::*;
use shoebox_core::model::Tables;
use shoebox_sync::{NetworkOp, NetworkQueue, OpKind, QueueTarget, PRIORITY_UPLOAD_PHOTO};
use shoebox_testkit::prelude::*;

fn target_op(id: i64) -> NetworkOp {
    NetworkOp::for_target(OpKind::Download, QueueTarget::new("t", id))
}

#[test]
fn priorities_5_1_5_3_iterate_as_1_3_5_5() {
    let db = TestDatabase::file();
    let queue = NetworkQueue::new();
    for (id, priority) in [5, 1, 5, 3].into_iter().enumerate() {
        queue.add(priority, &target_op(id as i64), &db.handle()).unwrap();
    }

    let db = db.reopen();
    let order: Vec<_> = NetworkQueue::new()
        .entries(&db.handle())
        .unwrap()
        .into_iter()
        .map(|e| (e.priority(), e.op.target.map(|t| t.local_id)))
        .collect();
    assert_eq!(order, vec![(1, Some(1)), (3, Some(3)), (5, Some(0)), (5, Some(2))]);
}

#[test]
fn removing_first_of_a_band_keeps_the_second() {
    let db = TestDatabase::memory();
    let queue = NetworkQueue::new();
    let a = target_op(1);
    let b = target_op(2);
    let s1 = queue.add(300, &a, &db.handle()).unwrap();
    let s2 = queue.add(300, &b, &db.handle()).unwrap();
    assert!(s2 > s1);

    queue.remove(300, s1, None, &db.handle()).unwrap();
    let entries = queue.entries(&db.handle()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].op, b);
}

#[test]
fn uploaded_photo_leaves_the_queue() {
    let db = TestDatabase::memory();
    let tables = Tables::new();
    let queue = NetworkQueue::new();

    let txn = db.new_transaction().unwrap();
    let mut photo = tables.photos.new_content(&txn).unwrap();
    photo.save(&txn).unwrap();
    assert!(queue.queue_photo(&photo, &txn).unwrap());
    txn.commit().unwrap();

    let staged = queue.stage(OpKind::UploadPhoto, &db.handle()).unwrap().unwrap();
    assert_eq!(staged.priority(), PRIORITY_UPLOAD_PHOTO);

    // The upload finishes; marking the photo uploaded dequeues it.
    let txn = db.new_transaction().unwrap();
    photo.uploaded = true;
    photo.save(&txn).unwrap();
    assert!(queue.queue_photo(&photo, &txn).unwrap());
    txn.commit().unwrap();

    // The staged entry is gone, so committing it is a no-op.
    queue.commit(OpKind::UploadPhoto, true, &db.handle()).unwrap();
    assert!(queue.is_empty(&db.handle()).unwrap());
    photo.unlock();
}

#[test]
fn abandoned_transaction_queues_nothing() {
    let db = TestDatabase::memory();
    let queue = NetworkQueue::new();
    let txn = db.new_transaction().unwrap();
    queue.add(1, &target_op(1), &txn).unwrap();
    txn.abandon().unwrap();
    assert!(queue.is_empty(&db.handle()).unwrap());

    // Sequence numbers keep increasing even though the first was never
    // committed.
    let s = queue.add(1, &target_op(2), &db.handle()).unwrap();
    assert!(s >= 2);
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn entries_sorted_by_priority_then_sequence(priorities in prop::collection::vec(-5i32..5, 1..30)) {
        let db = TestDatabase::memory();
        let queue = NetworkQueue::new();
        let mut expected = Vec::new();
        for (id, priority) in priorities.into_iter().enumerate() {
            let seq = queue.add(priority, &target_op(id as i64), &db.handle()).unwrap();
            expected.push((priority, seq));
        }
        expected.sort();
        let got: Vec<_> = queue
            .entries(&db.handle())
            .unwrap()
            .iter()
            .map(|e| (e.priority(), e.sequence()))
            .collect();
        prop_assert_eq!(got, expected);
    }
}
