//! End-to-end pipeline scenarios: source through composition to the writer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream;
use pretty_assertions::assert_eq;

use super::test_support::{drain, stream_of};
use super::{compose, BoxTransform, MapRecord, StageSource, Transform};
use crate::app::App;
use crate::errors::PipelineError;
use crate::record::{Contents, FileRecord};
use crate::registry::{StageOptions, StageRegistry};
use crate::stages::{DestStage, DestTarget, InitStage};
use crate::store::TemplateStore;
use crate::vfs::MemoryVfs;

fn fixture_vfs() -> Arc<MemoryVfs> {
    Arc::new(
        MemoryVfs::new()
            .with_file("a.md", "alpha")
            .with_file("b.md", "beta"),
    )
}

#[tokio::test]
async fn test_dest_routes_relative_dir_against_record_cwd() {
    let vfs = MemoryVfs::new().with_file("/a/foo.md", "x");
    let rec = vfs.record("/a/foo.md").unwrap().with_cwd("/a");

    let routed = Box::new(DestStage::new(DestTarget::dir("out"))).apply(stream_of(vec![rec]));
    let (records, errors) = drain(routed).await;

    assert!(errors.is_empty());
    assert_eq!(records[0].path, PathBuf::from("/a/out/foo.md"));
    assert_eq!(records[0].contents_utf8().as_deref(), Some("x"));
}

#[tokio::test]
async fn test_negated_pattern_excluded_from_written_output() {
    let vfs = fixture_vfs();
    let app = App::builder().vfs(vfs.clone()).build();

    app.task("build", |app, scope| async move {
        let sourced = app.src(&scope, &["*.md", "!b.md"]);
        let routed = app.dest(DestTarget::dir("/out")).apply(sourced);
        app.write(routed).await.map(|_| ())
    });

    let reports = app.run(&["build"]).await;
    assert!(reports[0].is_ok());

    let written = vfs.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].path, PathBuf::from("/out/a.md"));
}

#[tokio::test]
async fn test_init_rejects_streamed_record_without_ingesting() {
    let store = Arc::new(TemplateStore::new());
    let streamed = FileRecord {
        contents: Contents::stream(Box::pin(stream::once(async { Ok(b"x".to_vec()) }))),
        ..FileRecord::new("streamed.md")
    };

    let stage = Box::new(InitStage::for_collection(store.clone(), "task_docs"));
    let (records, errors) = drain(stage.apply(stream_of(vec![streamed]))).await;

    assert!(records.is_empty());
    assert!(matches!(errors[0], PipelineError::Streaming(_)));
    assert!(store.records("task_docs").is_empty());
}

#[tokio::test]
async fn test_unknown_stage_name_equivalent_to_omitting_it() {
    let registry = StageRegistry::new();
    let opts = StageOptions::new();
    let input = vec![
        FileRecord::new("a.md").with_contents("alpha"),
        FileRecord::new("b.md").with_contents("beta"),
    ];

    let with_unknown = compose(
        &registry,
        vec![StageSource::named("missing")],
        &opts,
    );
    let without: BoxTransform = compose(&registry, Vec::new(), &opts);

    let (through_unknown, _) = drain(with_unknown.apply(stream_of(input.clone()))).await;
    let (through_empty, _) = drain(without.apply(stream_of(input))).await;

    let paths = |recs: &[FileRecord]| recs.iter().map(|r| r.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths(&through_unknown), paths(&through_empty));
    assert_eq!(through_unknown.len(), 2);
}

#[tokio::test]
async fn test_full_pipeline_with_user_stage_and_ingestion() {
    let vfs = fixture_vfs();
    let app = App::builder().vfs(vfs.clone()).build();

    app.task("pages", |app, scope| async move {
        let annotate = MapRecord::new("annotate", |mut rec: FileRecord| {
            rec.data.insert("page".to_string(), serde_json::json!(true));
            Ok(rec)
        });

        let sourced = app.src(&scope, &["*.md"]);
        let pipeline = app.combine(
            &scope,
            vec![
                StageSource::named("init"),
                StageSource::built(annotate),
                StageSource::named("dest"),
            ],
            StageOptions::new().with_option("dest_dir", serde_json::json!("/site")),
        );
        app.write(pipeline.apply(sourced)).await.map(|_| ())
    });

    let reports = app.run(&["pages"]).await;
    assert!(reports[0].is_ok());

    // Ingested before annotation, routed after it.
    let collection = app.get_collection("task_pages").unwrap();
    assert_eq!(collection.len(), 2);

    let written = vfs.written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0].path, PathBuf::from("/site/a.md"));
    assert_eq!(written[0].data.get("page"), Some(&serde_json::json!(true)));
}

#[tokio::test]
async fn test_flag_disabled_stage_skips_ingestion() {
    let vfs = fixture_vfs();
    let app = App::builder().vfs(vfs.clone()).build();

    app.task("raw", |app, scope| async move {
        let sourced = app.src(&scope, &["*.md"]);
        let pipeline = app.combine(
            &scope,
            vec![StageSource::named("init")],
            StageOptions::new().with_option("plugin init", serde_json::json!(false)),
        );
        app.write(pipeline.apply(sourced)).await.map(|_| ())
    });

    let reports = app.run(&["raw"]).await;
    assert!(reports[0].is_ok());

    // Records still flow, but nothing landed in the store.
    assert_eq!(vfs.written().len(), 2);
    assert!(app.get_collection("task_raw").unwrap().is_empty());
}

#[tokio::test]
async fn test_per_record_error_does_not_stop_siblings() {
    let vfs = fixture_vfs();
    let app = App::builder().vfs(vfs.clone()).build();

    app.task("flaky", |app, scope| async move {
        let reject: BoxTransform = Box::new(MapRecord::new("reject-b", |rec: FileRecord| {
            if rec.path == PathBuf::from("b.md") {
                Err(PipelineError::internal("rejected"))
            } else {
                Ok(rec)
            }
        }));

        let sourced = app.src(&scope, &["*.md"]);
        let routed = app.dest(DestTarget::dir("/out")).apply(reject.apply(sourced));
        app.write(routed).await.map(|_| ())
    });

    let reports = app.run(&["flaky"]).await;
    // The surviving record was written; the task reports the record's error.
    assert!(!reports[0].is_ok());
    let written = vfs.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].path, PathBuf::from("/out/a.md"));
}

#[tokio::test]
async fn test_dest_locals_survive_to_written_records() {
    let vfs = fixture_vfs();
    let app = App::builder().vfs(vfs.clone()).build();

    app.task("locals", |app, scope| async move {
        let mut locals = HashMap::new();
        locals.insert("layout".to_string(), serde_json::json!("page"));

        let sourced = app.src(&scope, &["a.md"]);
        let routed = app
            .dest_with_locals(DestTarget::dir("/out"), locals)
            .apply(sourced);
        app.write(routed).await.map(|_| ())
    });

    let reports = app.run(&["locals"]).await;
    assert!(reports[0].is_ok());
    assert_eq!(
        vfs.written()[0].locals.get("layout"),
        Some(&serde_json::json!("page"))
    );
}
