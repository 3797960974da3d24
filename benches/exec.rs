use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use cinder::*;
use std::sync::Arc;

fn snapshot_bytes(n: usize) -> Vec<u8> {
    let mut v = b"REDIS0011".to_vec();
    for i in 0..n {
        let k = format!("k{}", i);
        let val = format!("v{}", i);
        v.push(0x00);
        v.push(k.len() as u8);
        v.extend_from_slice(k.as_bytes());
        v.push(val.len() as u8);
        v.extend_from_slice(val.as_bytes());
    }
    v.push(rdb::OPCODE_EOF);
    v
}

fn bench_load(c: &mut Criterion) {
    let bytes = snapshot_bytes(1000);
    c.bench_function("rdb_load_1k", |b| {
        b.iter_batched(
            Store::new,
            |store| {
                rdb::load_into(&bytes[..], &store).unwrap();
                black_box(store)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_exec_get(c: &mut Criterion) {
    let store = Store::new();
    rdb::load_into(&snapshot_bytes(1000)[..], &store).unwrap();
    let d = Dispatcher::new(Arc::new(store), Arc::new(Config::default()));
    let keys: Vec<Bytes> = (0..1000).map(|i| Bytes::from(format!("k{}", i))).collect();

    c.bench_function("exec_get_1k", |b| {
        let mut out = BytesMut::with_capacity(16 * 1024);
        b.iter(|| {
            out.clear();
            for k in &keys {
                d.exec(Cmd::Get(k.clone()), &mut out);
            }
            black_box(out.len());
        });
    });
}

criterion_group!(benches, bench_load, bench_exec_get);
criterion_main!(benches);
