//! Store integration scenarios.

use relidb_core::{
    Context, Entry, Error, Filter, MemoryInitializer, Options, Relationships, Step, Store,
};
use relidb_journal::{read_committed, Journal, JournalRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TestRecord {
    #[serde(default)]
    id: String,
    user_id: String,
    contact_id: String,
    group_id: String,
    tags: Vec<String>,
    value: String,
}

impl Entry for TestRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn relationships(&self) -> Relationships {
        let mut r = Relationships::new();
        r.append(&self.user_id);
        r.append(&self.contact_id);
        r.append(&self.group_id);
        r.append_all(&self.tags);
        r
    }
}

const RELATIONSHIPS: &[&str] = &["users", "contacts", "groups", "tags"];

fn record(user_id: &str, contact_id: &str, group_id: &str, value: &str) -> TestRecord {
    record_with_tags(user_id, contact_id, group_id, value, &[])
}

fn record_with_tags(
    user_id: &str,
    contact_id: &str,
    group_id: &str,
    value: &str,
    tags: &[&str],
) -> TestRecord {
    TestRecord {
        id: String::new(),
        user_id: user_id.to_string(),
        contact_id: contact_id.to_string(),
        group_id: group_id.to_string(),
        tags: tags.iter().map(ToString::to_string).collect(),
        value: value.to_string(),
    }
}

fn open_store(dir: &Path) -> Store<TestRecord> {
    let opts = Options::default().initializer(Arc::new(MemoryInitializer));
    Store::open("test", dir, RELATIONSHIPS, opts).unwrap()
}

#[test]
fn insert_assigns_sequential_ids() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    assert_eq!(store.insert(&foobar).unwrap(), "00000000");
    assert_eq!(store.insert(&foobar).unwrap(), "00000001");
    assert_eq!(store.insert(&foobar).unwrap(), "00000002");
}

#[test]
fn insert_then_get_roundtrips() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    let id = store.insert(&foobar).unwrap();
    assert_eq!(id, "00000000");

    let found = store.get(&id).unwrap();
    foobar.id = id.clone();
    assert_eq!(found, foobar);

    assert!(store.exists(&id).unwrap());
    assert!(!store.exists("00000099").unwrap());

    let mut related = Vec::new();
    store
        .get_by_relationship("users", "user_1", &mut related)
        .unwrap();
    assert_eq!(related, vec![foobar]);
}

#[test]
fn get_missing_entry_fails() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    assert!(matches!(store.get("00000000"), Err(Error::EntryNotFound)));
}

#[test]
fn get_by_undeclared_relationship_fails() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut out = Vec::new();
    assert!(matches!(
        store.get_by_relationship("nope", "id", &mut out),
        Err(Error::RelationshipNotFound)
    ));
}

#[test]
fn first_and_last_by_relationship() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    store.insert(&foobar).unwrap();
    store.insert(&foobar).unwrap();

    let first = store
        .get_first_by_relationship("contacts", "contact_1")
        .unwrap();
    assert_eq!(first.id, "00000000");

    let last = store
        .get_last_by_relationship("contacts", "contact_1")
        .unwrap();
    assert_eq!(last.id, "00000001");

    assert!(matches!(
        store.get_first_by_relationship("contacts", "contact_9"),
        Err(Error::EntryNotFound)
    ));
}

#[test]
fn edit_moves_relationship_membership() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    let id = store.insert(&foobar).unwrap();

    foobar.user_id = "user_3".to_string();
    store.edit(&id, &foobar).unwrap();

    let mut old = Vec::new();
    store.get_by_relationship("users", "user_1", &mut old).unwrap();
    assert!(old.is_empty());

    let mut new = Vec::new();
    store.get_by_relationship("users", "user_3", &mut new).unwrap();
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].user_id, "user_3");
}

#[test]
fn edit_replaces_payload() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    let id = store.insert(&foobar).unwrap();

    foobar.value = "foo bar baz".to_string();
    store.edit(&id, &foobar).unwrap();

    let found = store.get(&id).unwrap();
    assert_eq!(found.value, "foo bar baz");
}

#[test]
fn tags_many_to_many() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut entries = vec![
        record_with_tags("user_1", "contact_1", "group_1", "FOO FOO", &["foo", "bar"]),
        record_with_tags("user_1", "contact_1", "group_1", "FOO FOO", &["bar"]),
        record_with_tags("user_1", "contact_1", "group_1", "FOO FOO", &["baz"]),
    ];

    let count = |tag: &str| {
        let mut out = Vec::new();
        store.get_by_relationship("tags", tag, &mut out).unwrap();
        out.len()
    };

    for entry in &mut entries {
        entry.id = store.insert(entry).unwrap();
    }
    assert_eq!(count("foo"), 1);
    assert_eq!(count("bar"), 2);
    assert_eq!(count("baz"), 1);
    assert_eq!(count("beam"), 0);
    assert_eq!(count("boom"), 0);

    for entry in &mut entries {
        entry.tags = vec!["boom".to_string()];
        store.edit(&entry.id, entry).unwrap();
    }
    for tag in ["foo", "bar", "baz", "beam"] {
        assert_eq!(count(tag), 0, "tag {tag}");
    }
    assert_eq!(count("boom"), 3);

    for entry in &entries {
        store.remove(&entry.id).unwrap();
    }
    for tag in ["foo", "bar", "baz", "beam", "boom"] {
        assert_eq!(count(tag), 0, "tag {tag}");
    }
}

#[test]
fn for_each_visits_all_entries() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    store.insert(&foobar).unwrap();
    store.insert(&foobar).unwrap();

    let mut count = 0;
    store
        .for_each("", &[], |_id, entry| {
            assert_eq!(entry.value, "FOO FOO");
            count += 1;
            Ok(Step::Continue)
        })
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn for_each_stop_ends_iteration() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    for _ in 0..3 {
        store.insert(&foobar).unwrap();
    }

    let mut count = 0;
    store
        .for_each("", &[], |_id, _entry| {
            count += 1;
            Ok(Step::Stop)
        })
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn for_each_seeks_from_id() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    for _ in 0..4 {
        store.insert(&foobar).unwrap();
    }

    let mut ids = Vec::new();
    store
        .for_each_id("00000002", &[], |id| {
            ids.push(id.to_string());
            Ok(Step::Continue)
        })
        .unwrap();
    assert_eq!(ids, ["00000002", "00000003"]);
}

#[test]
fn for_each_with_single_filter() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    store.insert(&foobar).unwrap();
    foobar.user_id = "user_2".to_string();
    foobar.contact_id = "contact_3".to_string();
    store.insert(&foobar).unwrap();

    let mut count = 0;
    store
        .for_each("", &[Filter::new("contacts", "contact_3")], |_id, entry| {
            assert_eq!(entry.contact_id, "contact_3");
            count += 1;
            Ok(Step::Continue)
        })
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn for_each_with_multiple_filters() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    store
        .insert(&record("user_1", "contact_1", "group_1", "FOO FOO"))
        .unwrap();
    store
        .insert(&record("user_2", "contact_1", "group_1", "bunny bar bar"))
        .unwrap();
    store
        .insert(&record("user_3", "contact_2", "group_1", "baz"))
        .unwrap();
    store
        .insert(&record("user_4", "contact_2", "group_1", "yep"))
        .unwrap();

    struct Case {
        filters: Vec<Filter>,
        expected: &'static [&'static str],
    }

    let cases = [
        Case {
            filters: vec![Filter::new("contacts", "contact_1")],
            expected: &["00000000", "00000001"],
        },
        Case {
            filters: vec![Filter::new("contacts", "contact_2")],
            expected: &["00000002", "00000003"],
        },
        Case {
            filters: vec![
                Filter::new("contacts", "contact_1"),
                Filter::new("groups", "group_1"),
            ],
            expected: &["00000000", "00000001"],
        },
        Case {
            filters: vec![
                Filter::new("contacts", "contact_2"),
                Filter::new("groups", "group_1"),
            ],
            expected: &["00000002", "00000003"],
        },
        Case {
            filters: vec![
                Filter::new("contacts", "contact_1"),
                Filter::new("users", "user_1"),
            ],
            expected: &["00000000"],
        },
        Case {
            filters: vec![
                Filter::new("contacts", "contact_2"),
                Filter::new("users", "user_2"),
            ],
            expected: &[],
        },
        Case {
            filters: vec![
                Filter::new("contacts", "contact_1"),
                Filter::new("users", "user_1"),
                Filter::new("groups", "group_1"),
            ],
            expected: &["00000000"],
        },
        Case {
            filters: vec![
                Filter::new("groups", "group_1"),
                Filter::inverse("contacts", "contact_1"),
            ],
            expected: &["00000002", "00000003"],
        },
        Case {
            filters: vec![
                Filter::new("groups", "group_1"),
                Filter::inverse("contacts", "contact_2"),
            ],
            expected: &["00000000", "00000001"],
        },
    ];

    for (index, case) in cases.iter().enumerate() {
        let mut seen = Vec::new();
        store
            .for_each("", &case.filters, |id, _entry| {
                seen.push(id.to_string());
                Ok(Step::Continue)
            })
            .unwrap();
        assert_eq!(seen, case.expected, "case {index}");
    }
}

#[test]
fn invalid_filter_sets_are_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    store
        .insert(&record("user_1", "contact_1", "group_1", "FOO FOO"))
        .unwrap();

    let inverse_only = [Filter::inverse("users", "user_1")];
    assert!(matches!(
        store.for_each("", &inverse_only, |_, _: TestRecord| Ok(Step::Continue)),
        Err(Error::InversePrimaryFilter)
    ));

    let unnamed = [Filter::new("", "user_1")];
    assert!(matches!(
        store.for_each("", &unnamed, |_, _: TestRecord| Ok(Step::Continue)),
        Err(Error::EmptyFilters)
    ));

    let undeclared = [Filter::new("missing", "user_1")];
    assert!(matches!(
        store.for_each("", &undeclared, |_, _: TestRecord| Ok(Step::Continue)),
        Err(Error::RelationshipNotFound)
    ));
}

#[test]
fn get_filtered_pages_with_last_id() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    for _ in 0..5 {
        store.insert(&foobar).unwrap();
    }

    let (page, last) = store.get_filtered("", 2, &[]).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(last.as_deref(), Some("00000001"));

    let (rest, last) = store.get_filtered("00000002", 0, &[]).unwrap();
    assert_eq!(rest.len(), 3);
    assert_eq!(last.as_deref(), Some("00000004"));
}

#[test]
fn cursor_walks_entries() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    store.insert(&foobar).unwrap();
    store.insert(&foobar).unwrap();

    let mut count = 0;
    store
        .cursor(&[], |cursor| {
            let mut step = cursor.seek("");
            loop {
                match step {
                    Ok(entry) => {
                        assert_eq!(entry.value, "FOO FOO");
                        count += 1;
                        step = cursor.next();
                    }
                    Err(Error::EndOfEntries) => return Ok(()),
                    Err(err) => return Err(err),
                }
            }
        })
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn cursor_first_last_seek() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    store.insert(&foobar).unwrap();
    store.insert(&foobar).unwrap();

    store
        .cursor(&[], |cursor| {
            assert_eq!(cursor.first()?.id, "00000000");
            assert_eq!(cursor.last()?.id, "00000001");
            assert_eq!(cursor.seek("00000001")?.id, "00000001");
            assert!(matches!(cursor.next(), Err(Error::EndOfEntries)));
            Ok(())
        })
        .unwrap();
}

#[test]
fn cursor_prev_scans_in_reverse() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    for _ in 0..3 {
        store.insert(&foobar).unwrap();
    }

    store
        .cursor(&[], |cursor| {
            let mut ids = Vec::new();
            let mut step = cursor.last();
            loop {
                match step {
                    Ok(entry) => {
                        ids.push(entry.id);
                        step = cursor.prev();
                    }
                    Err(Error::EndOfEntries) => break,
                    Err(err) => return Err(err),
                }
            }
            assert_eq!(ids, ["00000002", "00000001", "00000000"]);
            Ok(())
        })
        .unwrap();
}

#[test]
fn cursor_over_relationship() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    store.insert(&foobar).unwrap();
    foobar.user_id = "user_2".to_string();
    foobar.contact_id = "contact_3".to_string();
    store.insert(&foobar).unwrap();

    let mut count = 0;
    store
        .cursor_relationship("contacts", "contact_3", |cursor| {
            let mut step = cursor.seek("");
            loop {
                match step {
                    Ok(entry) => {
                        assert_eq!(entry.contact_id, "contact_3");
                        count += 1;
                        step = cursor.next();
                    }
                    Err(Error::EndOfEntries) => return Ok(()),
                    Err(err) => return Err(err),
                }
            }
        })
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn cursor_applies_secondary_filters() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    store
        .insert(&record("user_1", "contact_1", "group_1", "a"))
        .unwrap();
    store
        .insert(&record("user_2", "contact_2", "group_1", "b"))
        .unwrap();
    store
        .insert(&record("user_3", "contact_1", "group_1", "c"))
        .unwrap();

    let filters = [
        Filter::new("groups", "group_1"),
        Filter::inverse("contacts", "contact_2"),
    ];
    store
        .cursor(&filters, |cursor| {
            assert_eq!(cursor.first()?.id, "00000000");
            assert_eq!(cursor.next()?.id, "00000002");
            assert!(matches!(cursor.next(), Err(Error::EndOfEntries)));
            assert_eq!(cursor.prev()?.id, "00000000");
            Ok(())
        })
        .unwrap();
}

#[test]
fn touch_context_enforces_forward_progress() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    let id = store.insert(&foobar).unwrap();

    struct Case {
        iterations: usize,
        sleep: Duration,
        timed_out: bool,
    }

    let cases = [
        Case {
            iterations: 1,
            sleep: Duration::from_millis(300),
            timed_out: true,
        },
        Case {
            iterations: 5,
            sleep: Duration::from_millis(100),
            timed_out: false,
        },
        Case {
            iterations: 3,
            sleep: Duration::from_millis(600),
            timed_out: true,
        },
    ];

    for (index, case) in cases.iter().enumerate() {
        let ctx = Context::with_touch(Duration::from_millis(300));
        let result = store.read_transaction(&ctx, |txn| {
            for _ in 0..case.iterations {
                thread::sleep(case.sleep);
                txn.get(&id)?;
            }
            Ok(())
        });
        if case.timed_out {
            assert!(
                matches!(result, Err(Error::TransactionTimedOut)),
                "case {index}"
            );
        } else {
            assert!(result.is_ok(), "case {index}");
        }
    }
}

#[test]
fn cancelled_context_stops_transaction() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    let id = store.insert(&foobar).unwrap();

    let (ctx, handle) = Context::with_cancel();
    handle.cancel();
    assert!(matches!(
        store.read_transaction(&ctx, |txn| txn.get(&id)),
        Err(Error::ContextCancelled)
    ));

    // Cancellation mid-closure rolls the write back.
    let (ctx, handle) = Context::with_cancel();
    let result = store.transaction(&ctx, |txn| {
        txn.insert(&foobar)?;
        handle.cancel();
        txn.insert(&foobar)?;
        Ok(())
    });
    assert!(matches!(result, Err(Error::ContextCancelled)));
    assert!(!store.exists("00000001").unwrap());
}

#[test]
fn lookups_are_ordered_sets() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    store.set_lookup("test_lookup", "test_0", "foo").unwrap();
    store.set_lookup("test_lookup", "test_0", "bar").unwrap();

    let keys = store.get_lookup("test_lookup", "test_0").unwrap();
    assert_eq!(keys, ["bar", "foo"]);

    store.remove_lookup("test_lookup", "test_0", "foo").unwrap();
    let keys = store.get_lookup("test_lookup", "test_0").unwrap();
    assert_eq!(keys, ["bar"]);

    assert!(matches!(
        store.get_lookup("test_lookup", "missing"),
        Err(Error::LookupNotFound)
    ));
}

#[test]
fn batch_inserts_and_edits() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");

    let (id_tx, id_rx) = std::sync::mpsc::channel();
    let insert_record = foobar.clone();
    store
        .batch(&Context::background(), move |txn| {
            let id = txn.insert(&insert_record)?;
            let _ = id_tx.send(id);
            Ok(())
        })
        .unwrap();
    let id = id_rx.recv().unwrap();

    let mut edited = foobar.clone();
    edited.value = "foo bar baz".to_string();
    let edit_id = id.clone();
    store
        .batch(&Context::background(), move |txn| {
            txn.edit(&edit_id, &edited)
        })
        .unwrap();

    assert_eq!(store.get(&id).unwrap().value, "foo bar baz");
}

#[test]
fn concurrent_batches_all_land() {
    let dir = tempdir().unwrap();
    let store = Arc::new(open_store(dir.path()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let entry = record("user_1", "contact_1", "group_1", &format!("value {i}"));
            store.batch(&Context::background(), move |txn| {
                txn.insert(&entry).map(|_| ())
            })
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let mut ids = BTreeSet::new();
    store
        .for_each_id("", &[], |id| {
            ids.insert(id.to_string());
            Ok(Step::Continue)
        })
        .unwrap();
    assert_eq!(ids.len(), 8);
    assert!(ids.contains("00000000"));
    assert!(ids.contains("00000007"));
}

#[test]
fn failing_batch_item_does_not_sink_others() {
    let dir = tempdir().unwrap();
    let store = Arc::new(open_store(dir.path()));

    let mut handles = Vec::new();
    for i in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            if i == 0 {
                // Editing a missing entry fails this item only.
                let entry = record("user_1", "contact_1", "group_1", "nope");
                store.batch(&Context::background(), move |txn| {
                    txn.edit("99999999", &entry)
                })
            } else {
                let entry = record("user_1", "contact_1", "group_1", "ok");
                store.batch(&Context::background(), move |txn| {
                    txn.insert(&entry).map(|_| ())
                })
            }
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(Error::EntryNotFound)))
            .count(),
        1
    );

    let mut count = 0;
    store
        .for_each_id("", &[], |_| {
            count += 1;
            Ok(Step::Continue)
        })
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn failed_transaction_rolls_back_everything() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    let result: Result<(), Error> = store.transaction(&Context::background(), |txn| {
        txn.insert(&foobar)?;
        txn.get("00000042").map(|_| ())
    });
    assert!(matches!(result, Err(Error::EntryNotFound)));

    assert!(!store.exists("00000000").unwrap());
    let mut related = Vec::new();
    store
        .get_by_relationship("users", "user_1", &mut related)
        .unwrap();
    assert!(related.is_empty());
}

#[test]
fn index_width_overflow_is_fatal() {
    let dir = tempdir().unwrap();
    let opts = Options::default()
        .initializer(Arc::new(MemoryInitializer))
        .index_length(1);
    let store: Store<TestRecord> = Store::open("narrow", dir.path(), RELATIONSHIPS, opts).unwrap();

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    for _ in 0..10 {
        store.insert(&foobar).unwrap();
    }
    assert!(matches!(store.insert(&foobar), Err(Error::IndexOverflow)));
}

#[test]
fn transaction_groups_multiple_inserts() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    let ids = store
        .transaction(&Context::background(), |txn| {
            Ok(vec![
                txn.insert(&foobar)?,
                txn.insert(&foobar)?,
                txn.insert(&foobar)?,
            ])
        })
        .unwrap();
    assert_eq!(ids, ["00000000", "00000001", "00000002"]);

    let mut count = 0;
    store
        .for_each_id("", &[], |_| {
            count += 1;
            Ok(Step::Continue)
        })
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn reopening_with_a_different_width_is_rejected() {
    let dir = tempdir().unwrap();

    {
        let store: Store<TestRecord> =
            Store::open("width", dir.path(), RELATIONSHIPS, Options::default()).unwrap();
        store
            .insert(&record("user_1", "contact_1", "group_1", "FOO FOO"))
            .unwrap();
        store.close().unwrap();
    }

    let narrow = Options::default().index_length(4);
    let result: Result<Store<TestRecord>, _> =
        Store::open("width", dir.path(), RELATIONSHIPS, narrow);
    assert!(matches!(result, Err(Error::InvalidOptions { .. })));
}

#[test]
fn relationship_count_mismatch_is_rejected() {
    let dir = tempdir().unwrap();
    let opts = Options::default().initializer(Arc::new(MemoryInitializer));
    let result: Result<Store<TestRecord>, _> = Store::open("test", dir.path(), &["users"], opts);
    assert!(matches!(result, Err(Error::InvalidNumberOfRelationships)));
}

#[test]
fn double_close_is_an_error() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    store.close().unwrap();
    assert!(matches!(store.close(), Err(Error::Closed)));
    assert!(matches!(store.exists("00000000"), Err(Error::Closed)));
}

#[test]
fn write_in_read_transaction_is_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let foobar = record("user_1", "contact_1", "group_1", "FOO FOO");
    let result = store.read_transaction(&Context::background(), |txn| txn.insert(&foobar));
    assert!(matches!(result, Err(Error::ReadOnlyTransaction)));
}

#[test]
fn entries_persist_across_reopen() {
    let dir = tempdir().unwrap();

    let id;
    {
        let store: Store<TestRecord> =
            Store::open("persist", dir.path(), RELATIONSHIPS, Options::default()).unwrap();
        id = store
            .insert(&record("user_1", "contact_1", "group_1", "FOO FOO"))
            .unwrap();
        store.close().unwrap();
    }

    let store: Store<TestRecord> =
        Store::open("persist", dir.path(), RELATIONSHIPS, Options::default()).unwrap();
    let found = store.get(&id).unwrap();
    assert_eq!(found.value, "FOO FOO");

    let mut related = Vec::new();
    store
        .get_by_relationship("users", "user_1", &mut related)
        .unwrap();
    assert_eq!(related.len(), 1);

    // Allocation continues after the highest persisted ID.
    let next = store
        .insert(&record("user_2", "contact_2", "group_2", "BAR"))
        .unwrap();
    assert_eq!(next, "00000001");
}

#[test]
fn mutations_mirror_into_the_change_log() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let mut entry = record_with_tags("user_1", "contact_1", "group_1", "FOO FOO", &["a", "b"]);
    let id = store.insert(&entry).unwrap();

    entry.tags = vec!["b".to_string(), "c".to_string()];
    store.edit(&id, &entry).unwrap();

    let segments = Journal::segment_paths(dir.path(), "test").unwrap();
    let records: Vec<JournalRecord> = segments
        .iter()
        .flat_map(|path| read_committed(path).unwrap())
        .collect();

    let tag_key = |tag: &str| format!("relationships/tags/{tag}::{id}").into_bytes();

    let deletes_a = records
        .iter()
        .filter(|r| matches!(r, JournalRecord::Delete { key } if *key == tag_key("a")))
        .count();
    let writes_a = records
        .iter()
        .filter(|r| matches!(r, JournalRecord::Write { key, .. } if *key == tag_key("a")))
        .count();
    let writes_b = records
        .iter()
        .filter(|r| matches!(r, JournalRecord::Write { key, .. } if *key == tag_key("b")))
        .count();
    let writes_c = records
        .iter()
        .filter(|r| matches!(r, JournalRecord::Write { key, .. } if *key == tag_key("c")))
        .count();

    // Insert wrote a and b once; the edit deleted a, added c, and left b
    // untouched.
    assert_eq!(writes_a, 1);
    assert_eq!(deletes_a, 1);
    assert_eq!(writes_b, 1);
    assert_eq!(writes_c, 1);

    let entry_key = format!("entries::{id}").into_bytes();
    let entry_writes = records
        .iter()
        .filter(|r| matches!(r, JournalRecord::Write { key, .. } if *key == entry_key))
        .count();
    assert_eq!(entry_writes, 2);
}

#[test]
fn removals_mirror_into_the_change_log() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    let entry = record("user_1", "contact_1", "group_1", "FOO FOO");
    let id = store.insert(&entry).unwrap();
    store.remove(&id).unwrap();

    let segments = Journal::segment_paths(dir.path(), "test").unwrap();
    let records: Vec<JournalRecord> = segments
        .iter()
        .flat_map(|path| read_committed(path).unwrap())
        .collect();

    let entry_key = format!("entries::{id}").into_bytes();
    assert!(records
        .iter()
        .any(|r| matches!(r, JournalRecord::Delete { key } if *key == entry_key)));

    let user_key = format!("relationships/users/user_1::{id}").into_bytes();
    assert!(records
        .iter()
        .any(|r| matches!(r, JournalRecord::Delete { key } if *key == user_key)));
}
