use std::hint::black_box;
use std::io::{self, Cursor};

use criterion::{criterion_group, criterion_main, Criterion};

use conntop::parallel::{ParallelConfig, ParallelProcessor};
use conntop::source::{RawChunk, SourceStream};
use conntop::{AddressMatcher, PartialTally, RecordBatch, RecordSchema};

fn conn_line(i: usize) -> String {
    let mut fields: Vec<String> = (0..21).map(|f| format!("f{}", f)).collect();
    fields[2] = format!("128.252.{}.{}", i % 256, (i / 256) % 256);
    fields[4] = format!("93.184.{}.34", i % 64);
    fields[16] = (i * 37 % 5000).to_string();
    fields[18] = (i * 11 % 9000).to_string();
    fields.join("\t")
}

fn sample_input(lines: usize) -> Vec<u8> {
    let mut input = String::from("#separator \\x09\n#path\tconn\n");
    for i in 0..lines {
        input.push_str(&conn_line(i));
        input.push('\n');
    }
    input.into_bytes()
}

fn bench_parse_line(c: &mut Criterion) {
    let schema = RecordSchema::default();
    let line = conn_line(12345);
    c.bench_function("parse_line_zeek", |b| {
        b.iter(|| {
            black_box(schema.parse_line(black_box(&line)));
        });
    });
}

fn bench_parse_line_comment(c: &mut Criterion) {
    let schema = RecordSchema::default();
    let line = "#fields\tts\tuid\tid.orig_h\tid.orig_p\tid.resp_h";
    c.bench_function("parse_line_comment", |b| {
        b.iter(|| {
            black_box(schema.parse_line(black_box(line)));
        });
    });
}

fn bench_parse_chunk(c: &mut Criterion) {
    let schema = RecordSchema::default();
    let chunk = RawChunk {
        line_no: 1,
        bytes: conn_line(7).into_bytes(),
    };
    c.bench_function("parse_chunk", |b| {
        b.iter(|| {
            black_box(schema.parse_chunk(black_box(&chunk)));
        });
    });
}

fn bench_fold_batch(c: &mut Criterion) {
    let schema = RecordSchema::default();
    let records = (0..64)
        .filter_map(|i| schema.parse_line(&conn_line(i)))
        .collect();
    let batch = RecordBatch {
        records,
        skipped: 0,
    };
    let prefix = AddressMatcher::parse(&["128.252."]).unwrap();
    let cidr = AddressMatcher::parse(&["128.252.0.0/16"]).unwrap();

    c.bench_function("fold_batch_prefix", |b| {
        b.iter(|| {
            black_box(PartialTally::fold(black_box(&batch), &prefix));
        });
    });
    c.bench_function("fold_batch_cidr", |b| {
        b.iter(|| {
            black_box(PartialTally::fold(black_box(&batch), &cidr));
        });
    });
}

fn bench_line_framing(c: &mut Criterion) {
    let input = sample_input(10_000);
    c.bench_function("frame_10k_lines", |b| {
        b.iter(|| {
            let stream = SourceStream::new(Cursor::new(input.as_slice()), 64 * 1024);
            black_box(stream.count());
        });
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let input = sample_input(10_000);
    let mut group = c.benchmark_group("pipeline_10k_lines");
    group.sample_size(20);
    for parsers in [1usize, 6] {
        group.bench_function(format!("{}_parsers", parsers), |b| {
            b.iter(|| {
                let processor = ParallelProcessor::new(ParallelConfig {
                    parser_pool_size: parsers,
                    ..ParallelConfig::default()
                });
                let tally = processor
                    .process(
                        Cursor::new(input.clone()),
                        RecordSchema::default(),
                        AddressMatcher::parse(&["128.252."]).unwrap(),
                        io::sink(),
                    )
                    .unwrap();
                black_box(tally.grand_total());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_line,
    bench_parse_line_comment,
    bench_parse_chunk,
    bench_fold_batch,
    bench_line_framing,
    bench_pipeline
);
criterion_main!(benches);
