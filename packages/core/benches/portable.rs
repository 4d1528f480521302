//! Benchmarks for portable document export/import
//!
//! Run with: `cargo bench -p deskflow-core`
//!
//! These benchmarks measure:
//! - Export of a 20-desktop, 500-note subtree (including checksum)
//! - Import of the same document into a fresh workspace
//! - Checksum throughput on its own

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deskflow_core::services::portable_codec::rolling_hash;
use deskflow_core::{DeskflowEngine, EngineConfig, NewNote, Position};
use tokio::runtime::Runtime;

/// Engine with one workspace: a root, 19 child desktops and 25 notes each
async fn setup_engine() -> (DeskflowEngine, String) {
    let engine = DeskflowEngine::in_memory(EngineConfig::default(), None);
    let service = engine.workspaces();
    let (ws, root) = service.create_workspace("bench", "Bench").await.unwrap();

    let mut desktops = vec![root.id.clone()];
    for i in 0..19 {
        let parent = &desktops[i / 4];
        let desktop = service
            .create_desktop(&ws.id, Some(parent.as_str()), &format!("Desktop {}", i + 1))
            .await
            .unwrap();
        desktops.push(desktop.id);
    }

    for desktop in &desktops {
        let mut previous: Option<String> = None;
        for n in 0..25 {
            let note = service
                .create_note(
                    desktop,
                    NewNote::new(format!("Note {}", n), Position::new(n as f64 * 10.0, 0.0))
                        .with_content("Lorem ipsum dolor sit amet, consectetur adipiscing elit."),
                )
                .await
                .unwrap();
            if let Some(prev) = previous {
                service
                    .create_connection(desktop, &prev, &note.id, None)
                    .await
                    .unwrap();
            }
            previous = Some(note.id);
        }
    }

    (engine, root.id)
}

fn bench_export(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (engine, root_id) = rt.block_on(setup_engine());

    c.bench_function("export_500_notes", |b| {
        b.iter(|| {
            let text = rt
                .block_on(engine.portable().export_to_string(&root_id))
                .unwrap();
            black_box(text);
        });
    });
}

fn bench_import(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (engine, root_id) = rt.block_on(setup_engine());
    let document = rt.block_on(engine.portable().export(&root_id)).unwrap();

    let mut group = c.benchmark_group("import");
    group.sample_size(10);

    group.bench_function("500_notes", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let mut total = std::time::Duration::ZERO;
                for _ in 0..iters {
                    let target = DeskflowEngine::in_memory(EngineConfig::default(), None);
                    let (ws, _) = target
                        .workspaces()
                        .create_workspace("bench", "Target")
                        .await
                        .unwrap();

                    let start = std::time::Instant::now();
                    let result = target.portable().import(&document, &ws.id, None).await;
                    total += start.elapsed();

                    assert!(result.success);
                    black_box(result);
                }
                total
            })
        });
    });

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (engine, root_id) = rt.block_on(setup_engine());
    let document = rt.block_on(engine.portable().export(&root_id)).unwrap();
    let content = serde_json::to_string(&document.content).unwrap();

    c.bench_function("checksum_content", |b| {
        b.iter(|| black_box(rolling_hash(black_box(&content))));
    });
}

criterion_group!(benches, bench_export, bench_import, bench_checksum);
criterion_main!(benches);
