//! Upload benchmarks

use blockblob_uploadr::blob::{BlockId, BlockList};
use blockblob_uploadr::upload::ChunkSource;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn benchmark_chunking(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let data = vec![0u8; 16 * 1024 * 1024];
    let mut group = c.benchmark_group("chunk_source");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk_size in [64 * 1024, 1024 * 1024, 4 * 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    rt.block_on(async {
                        let mut source = ChunkSource::new(&data[..], chunk_size).unwrap();
                        while let Some(chunk) = source.next_chunk().await.unwrap() {
                            black_box(chunk);
                        }
                    })
                });
            },
        );
    }

    group.finish();
}

fn benchmark_block_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_list_xml");

    for blocks in [10u64, 1_000, 50_000] {
        let list: BlockList = (1..=blocks).map(BlockId::new).collect();
        group.throughput(Throughput::Elements(blocks));
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &list, |b, list| {
            b.iter(|| black_box(list.to_xml().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_chunking, benchmark_block_list);
criterion_main!(benches);
