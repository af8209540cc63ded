use criterion::{criterion_group, criterion_main, Criterion};
use spindle_core::{Engine, EngineConfig};
use spindle_runtime::{CancelToken, ScriptedExecutor, ToolScript};
use spindle_schema::{
    classify, BlankMode, DeviceId, EraseRequest, OperationRequest, Tool, WriteOptions,
};
use spindle_telemetry::parse_text;
use std::path::Path;
use std::sync::Arc;

fn recorded_burn() -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cdrecord_burn.log");
    std::fs::read_to_string(path).unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let log = recorded_burn().repeat(50);
    c.bench_function("parse_cdrecord_log_50x", |b| {
        b.iter(|| parse_text(Tool::Cdrecord, &log));
    });
}

fn bench_classify(c: &mut Criterion) {
    let stderr = "cdrecord: Input/output error. write_g1: scsi sendcmd: no error\n\
                  CDB:  2A 00 00 00 1F 00 00 00 1F 00\n\
                  Buffer under run detected";
    c.bench_function("classify_cdrecord_underrun", |b| {
        b.iter(|| classify(Tool::Cdrecord, 255, stderr));
    });
}

fn bench_erase_run(c: &mut Criterion) {
    c.bench_function("engine_erase_scripted", |b| {
        b.iter_with_setup(
            || {
                let dir = tempfile::tempdir().unwrap();
                let mut config = EngineConfig::rooted_at(dir.path());
                config.poll_interval_ms = 1;
                let executor = Arc::new(ScriptedExecutor::new().with_script(
                    Tool::Cdrecord,
                    ToolScript::lines(["Blanking PMA, TOC, pregap", "Blanking time:   1.234s"]),
                ));
                let engine = Engine::with_executor(config, executor);
                (dir, engine)
            },
            |(_dir, engine)| {
                let request = OperationRequest::Erase(EraseRequest {
                    device: DeviceId::new("/dev/sr0"),
                    mode: BlankMode::Fast,
                    options: WriteOptions::default(),
                });
                let terminal = engine.run(&request, &CancelToken::new(), |_| {});
                assert!(terminal.phase.failure().is_none());
            },
        );
    });
}

criterion_group!(benches, bench_parse, bench_classify, bench_erase_run);
criterion_main!(benches);
