use pixlise_catalog::catalog::Catalog;
use pixlise_catalog::catalog::expressions::{
    ExpressionExecStats, ExpressionInput, ModuleReference, SourceLanguage,
};
use pixlise_catalog::catalog::model::{Origin, UserInfo};
use pixlise_catalog::catalog::sqlite::SqliteCatalogStore;
use pixlise_catalog::catalog::storage::ExpressionStorage;
use pixlise_catalog::core::cancel::RequestContext;
use pixlise_catalog::core::error::CatalogError;
use pixlise_catalog::core::store::Store;
use pixlise_catalog::core::time::{FixedClock, SequenceIdGenerator};
use pixlise_catalog::plugins::users::StaticUserDirectory;
use pixlise_catalog::plugins::zenodo::{
    DoiArtifact, DoiMetadata, DoiPublisher, PublishedLinks, ZenodoError, ZenodoPublishResponse,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingPublisher {
    artifacts: Mutex<Vec<DoiArtifact>>,
}

impl DoiPublisher for RecordingPublisher {
    fn publish(
        &self,
        _ctx: &RequestContext,
        artifact: &DoiArtifact,
        _metadata: &DoiMetadata,
    ) -> Result<ZenodoPublishResponse, ZenodoError> {
        self.artifacts.lock().unwrap().push(artifact.clone());
        Ok(ZenodoPublishResponse {
            doi: "10.5281/zenodo.42".to_string(),
            doi_url: "https://doi.org/10.5281/zenodo.42".to_string(),
            links: PublishedLinks {
                badge: "https://zenodo.org/badge/42.svg".to_string(),
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

struct Fixture {
    _tmp: TempDir,
    catalog: Catalog,
    publisher: Arc<RecordingPublisher>,
}

fn fixture(times: Vec<i64>, ids: Vec<&str>) -> Fixture {
    let tmp = TempDir::new().expect("tempdir");
    let store = Store::open(tmp.path().join("store")).expect("open store");
    let publisher = Arc::new(RecordingPublisher::default());
    let catalog = Catalog::new(
        Arc::new(SqliteCatalogStore::new(&store)),
        Arc::new(
            StaticUserDirectory::new()
                .with_user("999", "Peter Renamed", "peter@new")
                .with_user("555", "Ann", "a@x"),
        ),
        Arc::clone(&publisher) as Arc<dyn DoiPublisher>,
        Arc::new(FixedClock::new(times)),
        Arc::new(SequenceIdGenerator::new(ids)),
    );
    Fixture {
        _tmp: tmp,
        catalog,
        publisher,
    }
}

fn peter() -> UserInfo {
    UserInfo::new("Peter", "999", "p@x")
}

fn input(name: &str, source: &str) -> ExpressionInput {
    ExpressionInput {
        name: name.to_string(),
        source_code: source.to_string(),
        source_language: SourceLanguage::Pixlang,
        comments: "c".to_string(),
        tags: vec!["v1".to_string()],
        module_references: Vec::new(),
    }
}

#[test]
fn expression_lifecycle_keeps_created_time_and_existing_source() {
    let f = fixture(vec![1234500001, 1234500005], vec!["exp1"]);
    let ctx = RequestContext::background();

    let created = f
        .catalog
        .create_expression(&ctx, input("e1", "f()"), &peter(), false)
        .expect("create");
    assert_eq!(created.id, "exp1");
    assert_eq!(created.name, "e1");
    assert_eq!(created.source_code, "f()");
    assert_eq!(created.source_language, SourceLanguage::Pixlang);
    assert_eq!(created.comments, "c");
    assert_eq!(created.tags, vec!["v1".to_string()]);
    assert_eq!(
        created.origin,
        Origin {
            shared: false,
            creator: peter(),
            created_unix_time_sec: 1234500001,
            modified_unix_time_sec: 1234500001,
        }
    );
    assert!(created.recent_exec_stats.is_none());
    assert!(created.doi_metadata.is_none());

    let stored = f.catalog.get_expression(&ctx, "exp1", false).expect("get");
    assert_eq!(stored, created);

    let updated = f
        .catalog
        .update_expression(&ctx, "exp1", input("e1a", ""), &peter(), 1234500001, false, "f()")
        .expect("update");
    assert_eq!(updated.name, "e1a");
    assert_eq!(updated.source_code, "f()");
    assert_eq!(updated.origin.created_unix_time_sec, 1234500001);
    assert_eq!(updated.origin.modified_unix_time_sec, 1234500005);
}

#[test]
fn update_without_any_source_is_rejected() {
    let f = fixture(vec![1234500001, 1234500005], vec!["exp1"]);
    let ctx = RequestContext::background();
    f.catalog
        .create_expression(&ctx, input("e1", "f()"), &peter(), false)
        .expect("create");

    let err = f
        .catalog
        .update_expression(&ctx, "exp1", input("e1a", ""), &peter(), 1234500001, false, "")
        .expect_err("empty source must fail");
    assert!(matches!(err, CatalogError::InvalidInput(_)), "{err:?}");

    let stored = f.catalog.get_expression(&ctx, "exp1", false).expect("get");
    assert_eq!(stored.name, "e1");
}

#[test]
fn create_rejects_empty_source_and_bad_module_references() {
    let f = fixture(vec![10], vec!["exp1", "exp2"]);
    let ctx = RequestContext::background();

    let err = f
        .catalog
        .create_expression(&ctx, input("e", ""), &peter(), false)
        .expect_err("empty source");
    assert!(matches!(err, CatalogError::InvalidInput(_)));

    let mut bad_ref = input("e", "f()");
    bad_ref.module_references = vec![ModuleReference {
        module_id: "mod1".to_string(),
        version: "1.2".to_string(),
    }];
    let err = f
        .catalog
        .create_expression(&ctx, bad_ref, &peter(), false)
        .expect_err("bad version");
    assert!(matches!(err, CatalogError::InvalidInput(_)));
}

#[test]
fn listing_filters_by_owner_and_shared_flag_and_elides_source() {
    let f = fixture(vec![10], vec!["a", "b", "c", "d"]);
    let ctx = RequestContext::background();
    let ann = UserInfo::new("Ann", "555", "a@x");

    f.catalog
        .create_expression(&ctx, input("mine", "f()"), &peter(), false)
        .expect("a");
    f.catalog
        .create_expression(&ctx, input("shared", "g()"), &ann, true)
        .expect("b");
    f.catalog
        .create_expression(&ctx, input("private", "h()"), &ann, false)
        .expect("c");
    f.catalog
        .create_expression(&ctx, input("mine-shared", "k()"), &peter(), true)
        .expect("d");

    let own = f
        .catalog
        .list_expressions(&ctx, "999", false, false)
        .expect("list own");
    assert_eq!(own.keys().collect::<Vec<_>>(), vec!["a", "d"]);

    let visible = f
        .catalog
        .list_expressions(&ctx, "999", true, false)
        .expect("list shared");
    assert_eq!(visible.keys().collect::<Vec<_>>(), vec!["a", "b", "d"]);
    assert_eq!(visible.values().filter(|e| e.name == "mine-shared").count(), 1);

    // Rows matching both the owner and the shared clause come back once.
    let store = Store::open(f._tmp.path().join("store")).expect("reopen store");
    let mut rows: Vec<String> = SqliteCatalogStore::new(&store)
        .list_expressions(&ctx, "999", true)
        .expect("store listing")
        .into_iter()
        .map(|e| e.id)
        .collect();
    rows.sort();
    assert_eq!(rows, vec!["a", "b", "d"]);
    assert!(visible.values().all(|e| e.source_code.is_empty()));
}

#[test]
fn refresh_swaps_in_directory_details_and_keeps_unknown_snapshots() {
    let f = fixture(vec![10], vec!["a", "b"]);
    let ctx = RequestContext::background();
    let ghost = UserInfo::new("Ghost", "404", "g@x");

    f.catalog
        .create_expression(&ctx, input("mine", "f()"), &peter(), true)
        .expect("a");
    f.catalog
        .create_expression(&ctx, input("ghost", "g()"), &ghost, true)
        .expect("b");

    let refreshed = f.catalog.get_expression(&ctx, "a", true).expect("get a");
    assert_eq!(refreshed.origin.creator.name, "Peter Renamed");
    assert_eq!(refreshed.origin.creator.email, "peter@new");
    assert_eq!(refreshed.origin.creator.user_id, "999");

    let listed = f
        .catalog
        .list_expressions(&ctx, "999", true, true)
        .expect("list");
    assert_eq!(listed["b"].origin.creator, ghost);

    let stored = f.catalog.get_expression(&ctx, "a", false).expect("get raw");
    assert_eq!(stored.origin.creator, peter());
}

#[test]
fn recent_run_stats_are_stored_and_cleared_by_update() {
    let f = fixture(vec![10, 20], vec!["exp1"]);
    let ctx = RequestContext::background();
    let created = f
        .catalog
        .create_expression(&ctx, input("e1", "f()"), &peter(), false)
        .expect("create");

    let stats = ExpressionExecStats {
        data_required: vec!["Fe".to_string(), "Ca".to_string()],
        runtime_ms: 12.5,
        timestamp_unix_sec: 15,
    };
    f.catalog
        .store_expression_recent_run_stats(&ctx, "exp1", &stats)
        .expect("stats");

    let with_stats = f.catalog.get_expression(&ctx, "exp1", false).expect("get");
    assert_eq!(with_stats.recent_exec_stats, Some(stats));
    assert_eq!(with_stats.origin, created.origin);
    assert_eq!(with_stats.source_code, "f()");

    let updated = f
        .catalog
        .update_expression(&ctx, "exp1", input("e1", "f2()"), &peter(), 10, false, "f()")
        .expect("update");
    assert!(updated.recent_exec_stats.is_none());
    let stored = f.catalog.get_expression(&ctx, "exp1", false).expect("get");
    assert!(stored.recent_exec_stats.is_none());
    assert_eq!(stored.source_code, "f2()");
}

#[test]
fn missing_expressions_are_not_found_except_on_delete() {
    let f = fixture(vec![10], vec!["exp1"]);
    let ctx = RequestContext::background();

    assert!(
        f.catalog
            .get_expression(&ctx, "nope", false)
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        f.catalog
            .store_expression_recent_run_stats(&ctx, "nope", &ExpressionExecStats::default())
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        f.catalog
            .update_expression(&ctx, "nope", input("x", "f()"), &peter(), 1, false, "")
            .unwrap_err()
            .is_not_found()
    );
    f.catalog
        .delete_expression(&ctx, "nope")
        .expect("deleting a missing id succeeds");

    f.catalog
        .create_expression(&ctx, input("e1", "f()"), &peter(), false)
        .expect("create");
    f.catalog.delete_expression(&ctx, "exp1").expect("delete");
    assert!(
        f.catalog
            .get_expression(&ctx, "exp1", false)
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn publishing_records_the_doi_on_the_expression_and_in_the_doi_collection() {
    let f = fixture(vec![10], vec!["exp1"]);
    let ctx = RequestContext::background();
    f.catalog
        .create_expression(&ctx, input("e1", "f()"), &peter(), false)
        .expect("create");

    let metadata = DoiMetadata {
        title: "Iron ratio".to_string(),
        description: "ratio of Fe to Ca".to_string(),
        ..Default::default()
    };
    let published = f
        .catalog
        .publish_expression_to_zenodo(&ctx, "exp1", b"PK\x03\x04zip".to_vec(), &metadata)
        .expect("publish");

    let doi = published.doi_metadata.expect("doi on returned expression");
    assert_eq!(doi.title, "Iron ratio");
    assert_eq!(doi.doi, "10.5281/zenodo.42");
    assert_eq!(doi.doi_link, "https://doi.org/10.5281/zenodo.42");
    assert_eq!(doi.doi_badge, "https://zenodo.org/badge/42.svg");

    let artifacts = f.publisher.artifacts.lock().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].filename, "exp1.zip");
    assert_eq!(artifacts[0].bytes, b"PK\x03\x04zip".to_vec());
    drop(artifacts);

    let stored = f.catalog.get_expression(&ctx, "exp1", false).expect("get");
    assert_eq!(stored.doi_metadata.as_ref(), Some(&doi));
    assert_eq!(f.catalog.get_doi(&ctx, "exp1").expect("doi record"), doi);

    let updated = f
        .catalog
        .update_expression(&ctx, "exp1", input("e1b", ""), &peter(), 10, false, "f()")
        .expect("update keeps doi");
    assert_eq!(updated.doi_metadata, Some(doi));
}

#[test]
fn publishing_a_missing_expression_does_not_contact_the_publisher() {
    let f = fixture(vec![10], vec!["exp1"]);
    let ctx = RequestContext::background();
    let err = f
        .catalog
        .publish_expression_to_zenodo(&ctx, "nope", vec![1], &DoiMetadata::default())
        .expect_err("missing");
    assert!(err.is_not_found());
    assert!(f.publisher.artifacts.lock().unwrap().is_empty());
    assert!(f.catalog.get_doi(&ctx, "nope").unwrap_err().is_not_found());
}

#[test]
fn cancelled_context_stops_before_touching_the_store() {
    let f = fixture(vec![10], vec!["exp1"]);
    let ctx = RequestContext::background();
    ctx.cancel();
    let err = f
        .catalog
        .create_expression(&ctx, input("e1", "f()"), &peter(), false)
        .expect_err("cancelled");
    assert!(err.is_cancelled());

    let live = RequestContext::background();
    assert!(
        f.catalog
            .list_expressions(&live, "999", true, false)
            .expect("list")
            .is_empty()
    );
}
