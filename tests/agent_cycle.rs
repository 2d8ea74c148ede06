mod support;

use support::{
    scratch_home::ScratchHome,
    tree::{file_names, remove_file, write_file},
};

use std::{fs, io::Read, path::Path, sync::Arc};

use driftscan::{
    app_dirs,
    changeset::{
        COVERAGE_FILE, Category, ChangeSetStore, DirChangeSetStore, FileEntryType, read_all,
    },
    config::{self, AgentConfig, CONFIG_FILE_NAME},
    detect::{DriftDetector, StaticResourceLocator, sha256_reader},
    sender::{ContentSource, FilesSender, OutboxTransport, content_hashes},
};

const RESOURCE: i32 = 10001;

struct AgentHarness {
    scratch: ScratchHome,
    config: AgentConfig,
    detector: DriftDetector,
}

impl AgentHarness {
    /// A scratch agent configured through TOML with one filtered definition.
    fn new(pinned: bool) -> Self {
        let scratch = ScratchHome::new();
        let root = scratch.resource_root();

        let toml = format!(
            r#"
[agent]
lock_timeout_ms = 500

[[resources]]
id = {RESOURCE}
root = '{}'

[[resources.definitions]]
id = 1
name = "app-config"
base_dir = "conf"
pinned = {pinned}
includes = [{{ path = "", pattern = "*.xml" }}]
excludes = [{{ path = "tmp" }}]
"#,
            root.display()
        );
        let config_path = scratch.root().join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml).expect("write config");
        let config = config::load_from_path(&config_path).expect("load config");

        let changesets = app_dirs::changesets_dir().expect("changesets dir");
        let detector = DriftDetector::new(
            Arc::new(DirChangeSetStore::new(changesets)),
            Arc::new(StaticResourceLocator::from_config(&config)),
        );
        Self {
            scratch,
            config,
            detector,
        }
    }

    fn base(&self) -> std::path::PathBuf {
        self.scratch.resource_root().join("conf")
    }

    fn definition_dir(&self) -> std::path::PathBuf {
        app_dirs::changesets_dir()
            .expect("changesets dir")
            .join(RESOURCE.to_string())
            .join("app-config")
    }

    fn coverage_paths(&self) -> Vec<String> {
        let (_, entries) = read_all(
            self.detector.store().as_ref(),
            &self.definition_dir().join(COVERAGE_FILE),
        )
        .expect("read coverage");
        let mut paths: Vec<_> = entries.into_iter().map(|entry| entry.path).collect();
        paths.sort();
        paths
    }
}

fn sha256(content: &str) -> String {
    sha256_reader(content.as_bytes()).expect("hash")
}

fn zip_members(path: &Path) -> Vec<(String, String)> {
    let file = fs::File::open(path).expect("open archive");
    let mut archive = zip::ZipArchive::new(file).expect("read archive");
    let mut members = Vec::new();
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).expect("archive member");
        let mut text = String::new();
        member.read_to_string(&mut text).expect("read member");
        members.push((member.name().to_string(), text));
    }
    members.sort();
    members
}

#[test]
fn filtered_drift_is_detected_and_packaged_into_the_outbox() {
    let harness = AgentHarness::new(false);
    let base = harness.base();
    write_file(&base, "app.xml", "<app/>");
    write_file(&base, "modules/db.xml", "<db/>");
    write_file(&base, "tmp/cache.xml", "<cache/>");
    write_file(&base, "notes.txt", "ignored");
    let schedule = harness.config.schedules().remove(0);

    let first = harness.detector.detect(&schedule).expect("first cycle");
    assert!(first.base_dir_exists);
    assert_eq!(first.version, 0);
    assert!(!first.upload_due());
    assert_eq!(harness.coverage_paths(), vec!["app.xml", "modules/db.xml"]);

    write_file(&base, "app.xml", "<app debug=\"true\"/>");
    write_file(&base, "modules/cache.xml", "<cache size=\"64\"/>");
    remove_file(&base, "modules/db.xml");
    write_file(&base, "readme.txt", "still ignored");

    let second = harness.detector.detect(&schedule).expect("second cycle");
    assert_eq!(second.version, 1);
    assert_eq!(
        (second.added, second.changed, second.removed),
        (1, 1, 1)
    );
    assert!(second.upload_due());
    let delta = second.drift_changeset.clone().expect("delta written");
    let (headers, entries) =
        read_all(harness.detector.store().as_ref(), &delta).expect("read delta");
    assert_eq!(headers.category, Category::Drift);
    assert_eq!(headers.version, 1);
    let removed = entries
        .iter()
        .find(|entry| entry.kind == FileEntryType::Removed)
        .expect("removed entry");
    assert_eq!(removed.path, "modules/db.xml");
    assert_eq!(removed.old_hash.as_deref(), Some(sha256("<db/>").as_str()));

    let store = Arc::clone(harness.detector.store());
    let hashes = content_hashes(store.as_ref(), &delta).expect("content hashes");
    let coverage = store
        .find_changeset(RESOURCE, "app-config", Category::Coverage)
        .expect("coverage path");
    let coverage_headers = store.reader(&coverage).expect("coverage").headers().clone();
    let sender = FilesSender::new(
        store,
        ContentSource::for_resource(
            harness.detector.locator().as_ref(),
            harness.detector.locks(),
            RESOURCE,
            harness.detector.lock_timeout(),
        ),
        Arc::new(OutboxTransport::new(
            app_dirs::outbox_dir().expect("outbox dir"),
        )),
    );
    let outcome = sender
        .send(RESOURCE, &coverage_headers, &hashes)
        .expect("send content");
    assert_eq!((outcome.packaged, outcome.skipped), (2, 0));

    let outbox = app_dirs::outbox_dir().expect("outbox dir");
    let delivered = file_names(&outbox);
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].starts_with("10001_app-config_content_"));
    let mut expected = vec![
        (
            sha256("<app debug=\"true\"/>"),
            "<app debug=\"true\"/>".to_string(),
        ),
        (
            sha256("<cache size=\"64\"/>"),
            "<cache size=\"64\"/>".to_string(),
        ),
    ];
    expected.sort();
    assert_eq!(zip_members(&outbox.join(&delivered[0])), expected);

    let third = harness.detector.detect(&schedule).expect("idle cycle");
    assert_eq!(third.version, 1);
    assert!(third.drift_changeset.is_none());
    assert!(!third.upload_due());
}

#[test]
fn pinned_definition_reports_repeats_until_compliance_returns() {
    let harness = AgentHarness::new(true);
    let base = harness.base();
    write_file(&base, "app.xml", "<app/>");
    let schedule = harness.config.schedules().remove(0);

    harness.detector.detect(&schedule).expect("baseline");
    assert!(harness.definition_dir().join("snapshot.pinned").is_file());

    write_file(&base, "app.xml", "<app mode=\"rogue\"/>");
    let drifted = harness.detector.detect(&schedule).expect("drift");
    assert_eq!(drifted.version, 1);
    assert!(drifted.upload_due());

    let drifted_again = harness.detector.detect(&schedule).expect("still drifted");
    assert!(drifted_again.repeat);
    assert!(!drifted_again.upload_due());
    assert_eq!(drifted_again.version, 1);

    let drifted_third = harness.detector.detect(&schedule).expect("still drifted");
    assert!(drifted_third.repeat);

    write_file(&base, "app.xml", "<app/>");
    let restored = harness.detector.detect(&schedule).expect("compliant");
    assert!(!restored.repeat);
    assert_eq!(restored.version, 2);
    let delta = restored.drift_changeset.expect("compliance delta");
    let (_, entries) = read_all(harness.detector.store().as_ref(), &delta).expect("read delta");
    assert!(entries.is_empty());
}

#[test]
fn missing_base_dir_produces_nothing_and_unschedule_purges() {
    let harness = AgentHarness::new(false);
    let schedule = harness.config.schedules().remove(0);

    let summary = harness.detector.detect(&schedule).expect("cycle");
    assert!(!summary.base_dir_exists);
    assert!(summary.new_snapshot.is_none());
    assert!(file_names(&harness.definition_dir()).is_empty());

    write_file(&harness.base(), "app.xml", "<app/>");
    let summary = harness.detector.detect(&schedule).expect("cycle");
    assert!(summary.new_snapshot.is_some());

    harness.detector.unschedule(&schedule).expect("unschedule");
    assert!(!harness.definition_dir().exists());
}
