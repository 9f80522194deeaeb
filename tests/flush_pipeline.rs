//! End-to-end tests of the indexing pipeline against a real index directory

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use quarry::index::{ContentFilter, FilterOutcome, FlushObserver};
use quarry::testing::prelude::*;
use quarry::{
    BusyRetryPolicy, DualIndex, Indexable, IndexSettings, IndexerRequest, PartKind, Property,
    PropertyKind, QuarryError, Query, Receipt,
};

fn ts(minutes: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + minutes * 60, 0).unwrap()
}

fn open(settings: IndexSettings) -> (TempDir, DualIndex) {
    let tmp = TempDir::new().unwrap();
    let index = DualIndex::open(tmp.path(), settings).unwrap();
    (tmp, index)
}

fn uris(index: &DualIndex, query: &Query) -> Vec<String> {
    index
        .search(query)
        .unwrap()
        .hits
        .into_iter()
        .map(|h| h.uri)
        .collect()
}

fn text(words: &str) -> Query {
    Query::new().require(PartKind::text(words))
}

fn assert_invariants(index: &DualIndex) {
    let violations = check_all_invariants(index, &default_invariants());
    assert!(violations.is_empty(), "{:?}", violations);
}

#[derive(Default)]
struct Recorder {
    indexed: Vec<String>,
    filter_failures: Vec<String>,
    dropped: Vec<String>,
    flushes: usize,
}

impl FlushObserver for Recorder {
    fn item_indexed(&mut self, uri: &str, _filter: Option<&FilterOutcome>) {
        self.indexed.push(uri.to_string());
    }

    fn filter_failed(&mut self, uri: &str, _error: &QuarryError) {
        self.filter_failures.push(uri.to_string());
    }

    fn item_dropped(&mut self, uri: &str, _error: &QuarryError) {
        self.dropped.push(uri.to_string());
    }

    fn flushed(&mut self, _receipts: &[Receipt]) {
        self.flushes += 1;
    }
}

#[test]
fn test_readd_replaces_both_documents() {
    let (_tmp, index) = open(IndexSettings::default());

    let first = Indexable::add("file:///notes.txt")
        .with_text("garden plans")
        .with_property(Property::keyword("tag", "home").mutable());
    index.flush(IndexerRequest::new().push(first)).unwrap();

    let second = Indexable::add("file:///notes.txt")
        .with_text("invoice draft")
        .with_property(Property::keyword("tag", "work").mutable());
    index.flush(IndexerRequest::new().push(second)).unwrap();

    assert_eq!(index.item_count(), 1);
    assert!(uris(&index, &text("garden")).is_empty());
    assert_eq!(uris(&index, &text("invoice")), vec!["file:///notes.txt"]);

    let tagged_home = Query::new().require(PartKind::keyword("tag", "home"));
    let tagged_work = Query::new().require(PartKind::keyword("tag", "work"));
    assert!(uris(&index, &tagged_home).is_empty());
    assert_eq!(uris(&index, &tagged_work), vec!["file:///notes.txt"]);
    assert_invariants(&index);
}

#[test]
fn test_remove_cascades_to_descendants() {
    let (_tmp, index) = open(IndexSettings::default());
    let request = IndexerRequest::new()
        .push(Indexable::add("file:///mail.mbox").with_text("mailbox archive"))
        .push(
            Indexable::add("email://1")
                .with_parent("file:///mail.mbox")
                .with_text("archive message")
                .with_property(Property::keyword("flag", "read").mutable()),
        )
        .push(
            Indexable::add("email://1/attachment")
                .with_parent("email://1")
                .with_text("archive attachment"),
        )
        .push(Indexable::add("file:///other.txt").with_text("archive unrelated"));
    index.flush(request).unwrap();
    assert_eq!(index.item_count(), 4);

    let receipts = index
        .flush(IndexerRequest::new().push(Indexable::remove("file:///mail.mbox")))
        .unwrap();

    assert_eq!(receipts.len(), 1);
    assert!(matches!(&receipts[0], Receipt::Removed { uri } if uri == "file:///mail.mbox"));
    assert_eq!(uris(&index, &text("archive")), vec!["file:///other.txt"]);
    assert_eq!(index.secondary().open_reader().num_docs(), 0);

    let orphans = NoOrphanedChildren::new(["file:///mail.mbox", "email://1"]);
    assert!(orphans.check(&index).is_ok());
    assert_invariants(&index);
}

#[test]
fn test_property_change_touches_only_secondary() {
    let (_tmp, index) = open(IndexSettings::default());
    let add = Indexable::add("file:///a.txt")
        .with_timestamp(ts(1))
        .with_text("quarterly ledger")
        .with_property(Property::text("name", "alpha").mutable())
        .with_property(Property::keyword("owner", "sam").mutable())
        .with_property(Property::keyword("kind", "document"));
    index.flush(IndexerRequest::new().push(add)).unwrap();

    let change = Indexable::property_change("file:///a.txt")
        .with_property(Property::text("name", "beta").mutable())
        .with_property(Property::deletion(PropertyKind::Keyword, "owner").mutable());
    let receipts = index.flush(IndexerRequest::new().push(change)).unwrap();

    assert!(matches!(
        &receipts[0],
        Receipt::Added { property_changes_only: true, .. }
    ));
    let primary = index.primary().open_reader();
    assert_eq!(primary.num_docs(), 1);
    assert_eq!(primary.max_doc(), 1);

    let hits = index.search(&text("quarterly")).unwrap().hits;
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.property_values("name"), vec!["beta"]);
    assert!(hit.property("owner").is_none());
    assert_eq!(hit.property_values("kind"), vec!["document"]);

    let old_name = Query::new().require(PartKind::property(PropertyKind::Text, "name", "alpha"));
    assert!(uris(&index, &old_name).is_empty());
    assert_invariants(&index);
}

#[test]
fn test_property_change_ignores_immutable_properties() {
    let (_tmp, index) = open(IndexSettings::default());
    index
        .flush(IndexerRequest::new().push(
            Indexable::add("file:///a.txt").with_property(Property::keyword("kind", "document")),
        ))
        .unwrap();

    let change = Indexable::property_change("file:///a.txt")
        .with_property(Property::keyword("kind", "spreadsheet"));
    index.flush(IndexerRequest::new().push(change)).unwrap();

    let kind = Query::new().require(PartKind::keyword("kind", "document"));
    let hits = index.search(&kind).unwrap().hits;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].property_values("kind"), vec!["document"]);
    assert_invariants(&index);
}

#[test]
fn test_property_change_without_mutable_values_leaves_no_secondary() {
    let (_tmp, index) = open(IndexSettings::default());
    let request = IndexerRequest::new()
        .push(Indexable::add("file:///bare.txt").with_text("compost"))
        .push(
            Indexable::add("file:///tagged.txt")
                .with_text("compost")
                .with_property(Property::keyword("tag", "red").mutable()),
        );
    index.flush(request).unwrap();
    assert_eq!(index.secondary().open_reader().num_docs(), 1);

    let request = IndexerRequest::new()
        .push(
            Indexable::property_change("file:///bare.txt")
                .with_property(Property::deletion(PropertyKind::Keyword, "tag"))
                .with_property(Property::keyword("kind", "immutable")),
        )
        .push(
            Indexable::property_change("file:///tagged.txt")
                .with_property(Property::deletion(PropertyKind::Keyword, "tag")),
        );
    let receipts = index.flush(request).unwrap();

    assert_eq!(receipts.len(), 2);
    assert!(receipts
        .iter()
        .all(|r| matches!(r, Receipt::Added { property_changes_only: true, .. })));
    assert_eq!(index.secondary().open_reader().num_docs(), 0);

    let hits = index.search(&text("compost")).unwrap().hits;
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.property("tag").is_none()));
    assert_invariants(&index);
}

#[test]
fn test_property_change_propagates_to_children() {
    let (_tmp, index) = open(IndexSettings::default());
    let request = IndexerRequest::new()
        .push(Indexable::add("file:///album.zip"))
        .push(Indexable::add("file:///album.zip#1.jpg").with_parent("file:///album.zip"))
        .push(Indexable::add("file:///album.zip#2.jpg").with_parent("file:///album.zip"));
    index.flush(request).unwrap();

    let change = Indexable::property_change("file:///album.zip")
        .with_property(Property::keyword("tag", "holiday").mutable())
        .with_property(Property::keyword("_private:cookie", "x").mutable());
    let receipts = index.flush(IndexerRequest::new().push(change)).unwrap();

    let children = receipts
        .iter()
        .find_map(|r| match r {
            Receipt::ChildIndexables { parent, children } if parent == "file:///album.zip" => {
                Some(children.clone())
            }
            _ => None,
        })
        .expect("child indexables receipt");
    assert_eq!(children.len(), 2);
    for child in &children {
        assert_eq!(child.parent_uri.as_deref(), Some("file:///album.zip"));
        let tag = child.property("parent:tag").unwrap();
        assert_eq!(tag.value.as_deref(), Some("holiday"));
        assert!(tag.is_mutable);
        assert!(child.property("parent:_private:cookie").is_none());
    }

    // Feeding the children back makes the parent's tag searchable on them.
    let mut follow_up = IndexerRequest::new();
    for child in children {
        follow_up.add(child);
    }
    index.flush(follow_up).unwrap();
    let mut tagged = uris(
        &index,
        &Query::new().require(PartKind::keyword("parent:tag", "holiday")),
    );
    tagged.sort();
    assert_eq!(tagged, vec!["file:///album.zip#1.jpg", "file:///album.zip#2.jpg"]);
    assert_invariants(&index);
}

#[test]
fn test_plain_text_content_is_filtered() {
    let (_tmp, index) = open(IndexSettings::default());
    let add = Indexable::add("file:///todo.txt")
        .with_mime_type("text/plain")
        .with_content(b"buy compost for the garden".to_vec());
    let receipts = index.flush(IndexerRequest::new().push(add)).unwrap();

    match &receipts[0] {
        Receipt::Added {
            filter_name,
            filter_version,
            property_changes_only,
            ..
        } => {
            assert_eq!(filter_name.as_deref(), Some("PlainText"));
            assert_eq!(*filter_version, Some(1));
            assert!(!property_changes_only);
        }
        other => panic!("unexpected receipt {:?}", other),
    }
    assert_eq!(uris(&index, &text("compost")), vec!["file:///todo.txt"]);
}

#[test]
fn test_filter_failure_indexes_metadata_only() {
    let (_tmp, index) = open(IndexSettings::default());
    let add = Indexable::add("file:///broken.txt")
        .with_mime_type("text/plain")
        .with_text("readable preface")
        .with_content(vec![0xff, 0xfe, 0x00])
        .with_property(Property::keyword("kind", "note"));

    let mut recorder = Recorder::default();
    let receipts = index
        .flush_observed(IndexerRequest::new().push(add), &mut recorder)
        .unwrap();

    assert_eq!(recorder.filter_failures, vec!["file:///broken.txt"]);
    assert_eq!(recorder.indexed, vec!["file:///broken.txt"]);
    assert_eq!(recorder.flushes, 1);
    assert!(matches!(&receipts[0], Receipt::Added { filter_name: None, .. }));

    assert!(uris(&index, &text("preface")).is_empty());
    let by_kind = Query::new().require(PartKind::keyword("kind", "note"));
    assert_eq!(uris(&index, &by_kind), vec!["file:///broken.txt"]);
}

#[test]
fn test_oversized_text_is_retried_without_content() {
    let settings = IndexSettings::default().with_max_field_bytes(64);
    let (_tmp, index) = open(settings);

    let long_text = "lengthy ".repeat(20);
    let add = Indexable::add("file:///long.txt")
        .with_text(long_text)
        .with_property(Property::keyword("kind", "log"));
    let receipts = index.flush(IndexerRequest::new().push(add)).unwrap();

    assert_eq!(receipts.len(), 1);
    assert!(uris(&index, &text("lengthy")).is_empty());
    let by_kind = Query::new().require(PartKind::keyword("kind", "log"));
    assert_eq!(uris(&index, &by_kind), vec!["file:///long.txt"]);
}

#[test]
fn test_unwritable_item_is_dropped() {
    let settings = IndexSettings::default().with_max_field_bytes(16);
    let (_tmp, index) = open(settings);

    let request = IndexerRequest::new()
        .push(
            Indexable::add("file:///big")
                .with_property(Property::keyword("digest", "f".repeat(64)).mutable()),
        )
        .push(Indexable::add("file:///fine").with_text("small"));
    let mut recorder = Recorder::default();
    let receipts = index.flush_observed(request, &mut recorder).unwrap();

    assert_eq!(recorder.dropped, vec!["file:///big"]);
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].uri(), "file:///fine");
    assert_eq!(index.item_count(), 1);
    assert_eq!(index.secondary().open_reader().num_docs(), 0);
    assert_invariants(&index);
}

struct ArchiveFilter;

impl ContentFilter for ArchiveFilter {
    fn filter(&self, indexable: &mut Indexable) -> quarry::Result<Option<FilterOutcome>> {
        let Some(content) = indexable.content.take() else {
            return Ok(None);
        };
        let listing = String::from_utf8_lossy(&content).into_owned();
        let children = listing
            .lines()
            .map(|name| {
                Indexable::add(format!("{}#{}.jpg", indexable.uri, name))
                    .with_text(format!("member {}", name))
            })
            .collect();
        indexable.text = Some(listing);
        Ok(Some(FilterOutcome {
            name: "Archive".to_string(),
            version: 3,
            children,
        }))
    }
}

#[test]
fn test_filter_children_are_returned() {
    let tmp = TempDir::new().unwrap();
    let index = DualIndex::open(tmp.path(), IndexSettings::default())
        .unwrap()
        .with_filter(Box::new(ArchiveFilter));

    let add = Indexable::add("file:///photos.zip")
        .with_timestamp(ts(5))
        .with_property(Property::keyword("owner", "sam"))
        .with_content(b"beach\nsunset".to_vec());
    let receipts = index.flush(IndexerRequest::new().push(add)).unwrap();

    assert_eq!(receipts.len(), 2);
    assert!(matches!(
        &receipts[0],
        Receipt::Added { filter_name: Some(name), filter_version: Some(3), .. } if name == "Archive"
    ));
    let Receipt::ChildIndexables { parent, children } = &receipts[1] else {
        panic!("expected child indexables, got {:?}", receipts[1]);
    };
    assert_eq!(parent, "file:///photos.zip");
    assert_eq!(children.len(), 2);
    for child in children {
        assert_eq!(child.parent_uri.as_deref(), Some("file:///photos.zip"));
        assert_eq!(child.timestamp, Some(ts(5)));
        assert_eq!(
            child.property("parent:owner").and_then(|p| p.value.as_deref()),
            Some("sam")
        );
    }
    assert_eq!(uris(&index, &text("sunset")), vec!["file:///photos.zip"]);
}

#[test]
fn test_busy_store_fails_after_retries() {
    let settings = IndexSettings::default().with_busy_retry(BusyRetryPolicy {
        max_attempts: 2,
        backoff_ms: 1,
    });
    let (_tmp, index) = open(settings);

    let held = index.primary().open_writer().unwrap();
    let err = index
        .flush(IndexerRequest::new().push(Indexable::add("file:///a")))
        .unwrap_err();
    assert!(err.is_retriable());
    drop(held);

    index
        .flush(IndexerRequest::new().push(Indexable::add("file:///a")))
        .unwrap();
    assert_eq!(index.item_count(), 1);
}

#[test]
fn test_optimize_request_compacts_stores() {
    let (_tmp, index) = open(IndexSettings::default());
    let mut request = IndexerRequest::new();
    for i in 0..5 {
        request.add(Indexable::add(format!("file:///{}", i)).with_text("draft"));
    }
    index.flush(request).unwrap();
    index
        .flush(IndexerRequest::new().push(Indexable::remove("file:///0")))
        .unwrap();
    index
        .flush(IndexerRequest::new().push(Indexable::add("file:///1").with_text("approved")))
        .unwrap();
    assert!(index.primary().open_reader().max_doc() > 4);

    index.flush(IndexerRequest::new().with_optimize()).unwrap();

    let primary = index.primary().open_reader();
    assert_eq!(primary.max_doc(), 4);
    assert_eq!(primary.num_docs(), 4);
    assert_eq!(uris(&index, &text("approved")), vec!["file:///1"]);
    assert_invariants(&index);
}

#[test]
fn test_index_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let index = DualIndex::open(tmp.path(), IndexSettings::default()).unwrap();
        let add = Indexable::add("file:///kept.txt")
            .with_text("persistent memo")
            .with_property(Property::keyword("tag", "keep").mutable());
        index.flush(IndexerRequest::new().push(add)).unwrap();
    }

    let index = DualIndex::open(tmp.path(), IndexSettings::default()).unwrap();
    assert_eq!(index.item_count(), 1);
    let query = Query::new()
        .require(PartKind::text("memo"))
        .require(PartKind::keyword("tag", "keep"));
    assert_eq!(uris(&index, &query), vec!["file:///kept.txt"]);
}

#[test]
fn test_merge_replaces_matching_uris() {
    let (_tmp_a, local) = open(IndexSettings::default());
    let (_tmp_b, incoming) = open(IndexSettings::default());

    local
        .flush(
            IndexerRequest::new()
                .push(Indexable::add("file:///shared").with_text("stale"))
                .push(Indexable::add("file:///local-only").with_text("local")),
        )
        .unwrap();
    incoming
        .flush(
            IndexerRequest::new().push(
                Indexable::add("file:///shared")
                    .with_text("fresh")
                    .with_property(Property::keyword("tag", "synced").mutable()),
            ),
        )
        .unwrap();

    local.merge(&incoming).unwrap();

    assert_eq!(local.item_count(), 2);
    assert!(uris(&local, &text("stale")).is_empty());
    let query = Query::new()
        .require(PartKind::text("fresh"))
        .require(PartKind::keyword("tag", "synced"));
    assert_eq!(uris(&local, &query), vec!["file:///shared"]);
    assert_invariants(&local);
}
