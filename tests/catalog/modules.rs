use pixlise_catalog::catalog::Catalog;
use pixlise_catalog::catalog::expressions::{Expression, ExpressionExecStats};
use pixlise_catalog::catalog::model::{Origin, UserInfo};
use pixlise_catalog::catalog::modules::{
    INITIAL_VERSION_COMMENT, Module, ModuleInput, ModuleVersion, ModuleVersionInput,
};
use pixlise_catalog::catalog::semver::SemanticVersion;
use pixlise_catalog::catalog::sqlite::SqliteCatalogStore;
use pixlise_catalog::catalog::storage::{
    CatalogStorage, DoiStorage, ExpressionStorage, ModuleStorage, ModuleVersionStorage,
};
use pixlise_catalog::core::cancel::RequestContext;
use pixlise_catalog::core::error::CatalogError;
use pixlise_catalog::core::store::Store;
use pixlise_catalog::core::time::{FixedClock, SequenceIdGenerator};
use pixlise_catalog::plugins::users::StaticUserDirectory;
use pixlise_catalog::plugins::zenodo::{
    DoiArtifact, DoiMetadata, DoiPublisher, ZenodoError, ZenodoPublishResponse,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Succeeds unless constructed with `failing()`, and remembers what it was asked to publish.
#[derive(Default)]
struct FakePublisher {
    fail: bool,
    calls: Mutex<Vec<(DoiArtifact, DoiMetadata)>>,
}

impl FakePublisher {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl DoiPublisher for FakePublisher {
    fn publish(
        &self,
        _ctx: &RequestContext,
        artifact: &DoiArtifact,
        metadata: &DoiMetadata,
    ) -> Result<ZenodoPublishResponse, ZenodoError> {
        self.calls
            .lock()
            .unwrap()
            .push((artifact.clone(), metadata.clone()));
        if self.fail {
            return Err(ZenodoError::Status {
                step: "publish",
                code: 500,
                body: "boom".to_string(),
            });
        }
        Ok(ZenodoPublishResponse {
            doi: "10.5281/zenodo.7".to_string(),
            doi_url: "https://doi.org/10.5281/zenodo.7".to_string(),
            ..Default::default()
        })
    }
}

struct Fixture {
    _tmp: TempDir,
    store: Arc<SqliteCatalogStore>,
    catalog: Catalog,
    publisher: Arc<FakePublisher>,
}

fn fixture_with(now: i64, ids: Vec<&str>, publisher: FakePublisher) -> Fixture {
    let tmp = TempDir::new().expect("tempdir");
    let store = Store::open(tmp.path().join("store")).expect("open store");
    let sqlite = Arc::new(SqliteCatalogStore::new(&store));
    let publisher = Arc::new(publisher);
    let catalog = Catalog::new(
        Arc::clone(&sqlite) as Arc<dyn CatalogStorage>,
        Arc::new(StaticUserDirectory::new().with_user("999", "Peter Renamed", "peter@new")),
        Arc::clone(&publisher) as Arc<dyn DoiPublisher>,
        Arc::new(FixedClock::at(now)),
        Arc::new(SequenceIdGenerator::new(ids)),
    );
    Fixture {
        _tmp: tmp,
        store: sqlite,
        catalog,
        publisher,
    }
}

fn fixture(now: i64, ids: Vec<&str>) -> Fixture {
    fixture_with(now, ids, FakePublisher::default())
}

fn peter() -> UserInfo {
    UserInfo::new("Peter", "999", "p@x")
}

fn module_input(name: &str) -> ModuleInput {
    ModuleInput {
        name: name.to_string(),
        source_code: "g()".to_string(),
        comments: "cm".to_string(),
        tags: vec!["t".to_string()],
        doi_metadata: None,
    }
}

fn version_input(bump: &str, source: &str) -> ModuleVersionInput {
    ModuleVersionInput {
        version_update: bump.to_string(),
        source_code: source.to_string(),
        ..Default::default()
    }
}

fn header(id: &str) -> Module {
    Module {
        id: id.to_string(),
        name: "M".to_string(),
        comments: String::new(),
        origin: Origin {
            shared: true,
            creator: peter(),
            created_unix_time_sec: 500,
            modified_unix_time_sec: 500,
        },
    }
}

#[test]
fn creating_a_module_seeds_the_initial_version() {
    let f = fixture(1000, vec!["mod1"]);
    let ctx = RequestContext::background();

    let outcome = f
        .catalog
        .create_module(&ctx, module_input("M"), &peter(), false)
        .expect("create");
    assert!(outcome.publication.is_none());
    assert!(outcome.publish_error().is_none());

    let wire = outcome.module;
    assert_eq!(wire.module.id, "mod1");
    assert_eq!(wire.module.name, "M");
    assert_eq!(wire.module.comments, "cm");
    assert_eq!(
        wire.module.origin,
        Origin {
            shared: true,
            creator: peter(),
            created_unix_time_sec: 1000,
            modified_unix_time_sec: 1000,
        }
    );
    assert_eq!(wire.version.source_code, "g()");
    assert_eq!(wire.version.summary.version.to_string(), "0.0.1");
    assert_eq!(wire.version.summary.comments, INITIAL_VERSION_COMMENT);
    assert_eq!(wire.version.summary.tags, vec!["t".to_string()]);
    assert_eq!(wire.version.summary.time_stamp_unix_sec, 1000);

    let stored = f
        .store
        .get_module_version(&ctx, "mod1", SemanticVersion::INITIAL)
        .expect("stored version");
    assert_eq!(stored.id, "mod1-v0.0.1");

    let json = serde_json::to_value(&wire).expect("wire json");
    assert_eq!(json["version"]["version"], "0.0.1");
    assert_eq!(json["version"]["sourceCode"], "g()");
    assert_eq!(json["origin"]["creator"]["userID"], "999");
}

#[test]
fn adding_a_version_bumps_from_the_latest() {
    let f = fixture(2000, vec![]);
    let ctx = RequestContext::background();
    f.store.insert_module(&ctx, &header("mod1")).expect("header");
    for (major, minor, patch) in [(0, 0, 1), (1, 2, 3), (0, 9, 9)] {
        f.store
            .insert_module_version(
                &ctx,
                &ModuleVersion::new(
                    "mod1",
                    SemanticVersion::new(major, minor, patch),
                    "old()".to_string(),
                    String::new(),
                    Vec::new(),
                    500,
                ),
            )
            .expect("seed version");
    }

    let outcome = f
        .catalog
        .add_module_version(&ctx, "mod1", version_input("minor", "h()"), false)
        .expect("add minor");
    let added = &outcome.module.version;
    assert_eq!(added.summary.version, SemanticVersion::new(1, 3, 0));
    assert_eq!(added.source_code, "h()");
    assert_eq!(added.summary.time_stamp_unix_sec, 2000);
    assert!(added.summary.tags.is_empty());
    assert_eq!(outcome.module.module.origin.modified_unix_time_sec, 500);

    let patch = f
        .catalog
        .add_module_version(&ctx, "mod1", version_input("", "i()"), false)
        .expect("add patch");
    assert_eq!(patch.module.version.summary.version.to_string(), "1.3.1");

    let major = f
        .catalog
        .add_module_version(&ctx, "mod1", version_input("major", "j()"), false)
        .expect("add major");
    assert_eq!(major.module.version.summary.version.to_string(), "2.0.0");

    let versions: Vec<String> = f
        .store
        .list_module_versions(&ctx, "mod1")
        .expect("versions")
        .iter()
        .map(|v| v.version.to_string())
        .collect();
    assert_eq!(
        versions,
        vec!["0.0.1", "0.9.9", "1.2.3", "1.3.0", "1.3.1", "2.0.0"]
    );
}

#[test]
fn listing_fails_when_a_module_has_no_versions() {
    let f = fixture(1000, vec!["mod1"]);
    let ctx = RequestContext::background();
    f.catalog
        .create_module(&ctx, module_input("Good"), &peter(), false)
        .expect("create");
    f.store
        .insert_module(&ctx, &header("orphan7"))
        .expect("header only");

    let err = f
        .catalog
        .list_modules(&ctx, false)
        .expect_err("orphan header must fail the listing");
    assert!(matches!(err, CatalogError::InvariantViolation(_)), "{err:?}");
    assert!(err.to_string().contains("orphan7"), "{err}");

    let err = f
        .catalog
        .add_module_version(&ctx, "orphan7", version_input("patch", "x()"), false)
        .expect_err("no latest version");
    assert!(matches!(err, CatalogError::InvariantViolation(_)), "{err:?}");
}

#[test]
fn listing_returns_summaries_and_can_refresh_creators() {
    let f = fixture(1000, vec!["mod1", "mod2"]);
    let ctx = RequestContext::background();
    f.catalog
        .create_module(&ctx, module_input("Alpha"), &peter(), false)
        .expect("create 1");
    f.catalog
        .create_module(&ctx, module_input("Beta"), &UserInfo::new("Ann", "555", "a@x"), false)
        .expect("create 2");
    f.catalog
        .add_module_version(&ctx, "mod1", version_input("patch", "g2()"), false)
        .expect("add");

    let listed = f.catalog.list_modules(&ctx, true).expect("list");
    assert_eq!(listed.len(), 2);
    let alpha = &listed["mod1"];
    assert_eq!(alpha.module.origin.creator.name, "Peter Renamed");
    let versions: Vec<String> = alpha.versions.iter().map(|v| v.version.to_string()).collect();
    assert_eq!(versions, vec!["0.0.1", "0.0.2"]);
    assert_eq!(listed["mod2"].module.origin.creator.name, "Ann");

    let json = serde_json::to_value(alpha).expect("json");
    assert!(json["versions"][0].get("sourceCode").is_none());
}

#[test]
fn get_module_returns_latest_or_requested_version() {
    let f = fixture(1000, vec!["mod1"]);
    let ctx = RequestContext::background();
    f.catalog
        .create_module(&ctx, module_input("M"), &peter(), false)
        .expect("create");
    f.catalog
        .add_module_version(&ctx, "mod1", version_input("minor", "h()"), false)
        .expect("add");

    let latest = f.catalog.get_module(&ctx, "mod1", None, false).expect("latest");
    assert_eq!(latest.version.summary.version.to_string(), "0.1.0");
    assert_eq!(latest.version.source_code, "h()");

    let first = f
        .catalog
        .get_module(&ctx, "mod1", Some(SemanticVersion::INITIAL), true)
        .expect("first");
    assert_eq!(first.version.source_code, "g()");
    assert_eq!(first.module.origin.creator.email, "peter@new");

    assert!(
        f.catalog
            .get_module(&ctx, "mod1", Some(SemanticVersion::new(9, 9, 9)), false)
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        f.catalog
            .get_module(&ctx, "nope", None, false)
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn invalid_input_is_rejected_before_any_write() {
    let f = fixture(1000, vec!["mod1", "mod2"]);
    let ctx = RequestContext::background();

    for name in ["", "1abc", "has space", "trailing_", "dash-name"] {
        let err = f
            .catalog
            .create_module(&ctx, module_input(name), &peter(), false)
            .expect_err(name);
        assert!(matches!(err, CatalogError::InvalidInput(_)), "{name}: {err:?}");
    }
    assert!(f.store.list_modules(&ctx).expect("list").is_empty());

    f.catalog
        .create_module(&ctx, module_input("Geo_2"), &peter(), false)
        .expect("valid name");
    let err = f
        .catalog
        .add_module_version(&ctx, "mod1", version_input("huge", "h()"), false)
        .expect_err("bad selector");
    assert!(matches!(err, CatalogError::InvalidInput(_)), "{err:?}");
    assert!(err.to_string().contains("huge"), "{err}");
    assert_eq!(f.store.list_module_versions(&ctx, "mod1").expect("versions").len(), 1);

    let err = f
        .catalog
        .add_module_version(&ctx, "missing", version_input("patch", "h()"), false)
        .expect_err("missing module");
    assert!(err.is_not_found());
}

#[test]
fn publishing_a_module_records_the_doi_under_the_version_id() {
    let f = fixture(1000, vec!["mod1"]);
    let ctx = RequestContext::background();

    let outcome = f
        .catalog
        .create_module(&ctx, module_input("M"), &peter(), true)
        .expect("create");
    let published = outcome
        .publication
        .as_ref()
        .expect("publication attempted")
        .as_ref()
        .expect("publication succeeded");
    assert_eq!(published.doi, "10.5281/zenodo.7");

    let calls = f.publisher.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (artifact, metadata) = &calls[0];
    assert_eq!(artifact.filename, "mod1.json");
    let body: serde_json::Value = serde_json::from_slice(&artifact.bytes).expect("artifact json");
    assert_eq!(body["version"]["version"], "0.0.1");
    assert_eq!(metadata.title, "M v0.0.1");
    assert_eq!(metadata.description, "cm");
    assert_eq!(metadata.keywords, "t");
    assert_eq!(metadata.creators[0].name, "Peter");
    drop(calls);

    let doi = f.catalog.get_doi(&ctx, "mod1-v0.0.1").expect("doi recorded");
    assert_eq!(doi.doi, "10.5281/zenodo.7");
    assert_eq!(doi.doi_link, "https://doi.org/10.5281/zenodo.7");
}

#[test]
fn supplied_metadata_is_used_for_new_versions() {
    let f = fixture(1000, vec!["mod1"]);
    let ctx = RequestContext::background();
    f.catalog
        .create_module(&ctx, module_input("M"), &peter(), false)
        .expect("create");

    let mut input = version_input("minor", "h()");
    input.doi_metadata = Some(DoiMetadata {
        title: "Custom".to_string(),
        ..Default::default()
    });
    f.catalog
        .add_module_version(&ctx, "mod1", input, true)
        .expect("add");

    let calls = f.publisher.calls.lock().unwrap();
    assert_eq!(calls[0].1.title, "Custom");
    drop(calls);
    assert_eq!(f.catalog.get_doi(&ctx, "mod1-v0.1.0").expect("doi").title, "Custom");
}

#[test]
fn failed_publication_is_reported_without_undoing_the_write() {
    let f = fixture_with(1000, vec!["mod1"], FakePublisher::failing());
    let ctx = RequestContext::background();

    let outcome = f
        .catalog
        .create_module(&ctx, module_input("M"), &peter(), true)
        .expect("write still succeeds");
    let err = outcome.publish_error().expect("publish error reported");
    assert!(matches!(err, ZenodoError::Status { code: 500, .. }), "{err:?}");

    assert_eq!(
        f.catalog
            .get_module(&ctx, "mod1", None, false)
            .expect("module kept")
            .version
            .source_code,
        "g()"
    );
    assert!(f.catalog.get_doi(&ctx, "mod1-v0.0.1").unwrap_err().is_not_found());
}

#[test]
fn version_id_collisions_are_reported_as_already_exists() {
    let f = fixture(1000, vec!["mod1"]);
    let ctx = RequestContext::background();
    f.catalog
        .create_module(&ctx, module_input("M"), &peter(), false)
        .expect("create");

    let dup = ModuleVersion::new(
        "mod1",
        SemanticVersion::INITIAL,
        "again()".to_string(),
        String::new(),
        Vec::new(),
        1000,
    );
    let err = f
        .store
        .insert_module_version(&ctx, &dup)
        .expect_err("duplicate version");
    assert!(matches!(err, CatalogError::AlreadyExists(ref id) if id == "mod1-v0.0.1"), "{err:?}");
}

/// Delegates to SQLite but refuses every version insert.
struct VersionlessStore(Arc<SqliteCatalogStore>);

impl ExpressionStorage for VersionlessStore {
    fn list_expressions(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        include_shared: bool,
    ) -> Result<Vec<Expression>, CatalogError> {
        self.0.list_expressions(ctx, user_id, include_shared)
    }
    fn get_expression(&self, ctx: &RequestContext, id: &str) -> Result<Expression, CatalogError> {
        self.0.get_expression(ctx, id)
    }
    fn insert_expression(&self, ctx: &RequestContext, expr: &Expression) -> Result<(), CatalogError> {
        self.0.insert_expression(ctx, expr)
    }
    fn replace_expression(
        &self,
        ctx: &RequestContext,
        expr: &Expression,
    ) -> Result<Expression, CatalogError> {
        self.0.replace_expression(ctx, expr)
    }
    fn set_recent_exec_stats(
        &self,
        ctx: &RequestContext,
        id: &str,
        stats: &ExpressionExecStats,
    ) -> Result<(), CatalogError> {
        self.0.set_recent_exec_stats(ctx, id, stats)
    }
    fn set_expression_doi(
        &self,
        ctx: &RequestContext,
        id: &str,
        doi: &DoiMetadata,
    ) -> Result<(), CatalogError> {
        self.0.set_expression_doi(ctx, id, doi)
    }
    fn delete_expression(&self, ctx: &RequestContext, id: &str) -> Result<(), CatalogError> {
        self.0.delete_expression(ctx, id)
    }
}

impl ModuleStorage for VersionlessStore {
    fn list_modules(&self, ctx: &RequestContext) -> Result<Vec<Module>, CatalogError> {
        self.0.list_modules(ctx)
    }
    fn get_module(&self, ctx: &RequestContext, id: &str) -> Result<Module, CatalogError> {
        self.0.get_module(ctx, id)
    }
    fn insert_module(&self, ctx: &RequestContext, module: &Module) -> Result<(), CatalogError> {
        self.0.insert_module(ctx, module)
    }
    fn delete_module(&self, ctx: &RequestContext, id: &str) -> Result<(), CatalogError> {
        self.0.delete_module(ctx, id)
    }
}

impl ModuleVersionStorage for VersionlessStore {
    fn list_module_versions(
        &self,
        ctx: &RequestContext,
        module_id: &str,
    ) -> Result<Vec<ModuleVersion>, CatalogError> {
        self.0.list_module_versions(ctx, module_id)
    }
    fn latest_module_version(
        &self,
        ctx: &RequestContext,
        module_id: &str,
    ) -> Result<ModuleVersion, CatalogError> {
        self.0.latest_module_version(ctx, module_id)
    }
    fn get_module_version(
        &self,
        ctx: &RequestContext,
        module_id: &str,
        version: SemanticVersion,
    ) -> Result<ModuleVersion, CatalogError> {
        self.0.get_module_version(ctx, module_id, version)
    }
    fn insert_module_version(
        &self,
        _ctx: &RequestContext,
        version: &ModuleVersion,
    ) -> Result<(), CatalogError> {
        Err(CatalogError::AlreadyExists(version.id.clone()))
    }
}

impl DoiStorage for VersionlessStore {
    fn put_doi(
        &self,
        ctx: &RequestContext,
        id: &str,
        doi: &DoiMetadata,
        recorded_unix_sec: i64,
    ) -> Result<(), CatalogError> {
        self.0.put_doi(ctx, id, doi, recorded_unix_sec)
    }
    fn get_doi(&self, ctx: &RequestContext, id: &str) -> Result<DoiMetadata, CatalogError> {
        self.0.get_doi(ctx, id)
    }
}

#[test]
fn failed_initial_version_removes_the_header_again() {
    let tmp = TempDir::new().expect("tempdir");
    let store = Store::open(tmp.path().join("store")).expect("open store");
    let sqlite = Arc::new(SqliteCatalogStore::new(&store));
    let catalog = Catalog::new(
        Arc::new(VersionlessStore(Arc::clone(&sqlite))),
        Arc::new(StaticUserDirectory::new()),
        Arc::new(FakePublisher::default()),
        Arc::new(FixedClock::at(1000)),
        Arc::new(SequenceIdGenerator::new(["mod1"])),
    );
    let ctx = RequestContext::background();

    let err = catalog
        .create_module(&ctx, module_input("M"), &peter(), false)
        .expect_err("version insert fails");
    assert!(matches!(err, CatalogError::AlreadyExists(_)), "{err:?}");
    assert!(sqlite.get_module(&ctx, "mod1").unwrap_err().is_not_found());
    assert!(sqlite.list_modules(&ctx).expect("list").is_empty());
}
