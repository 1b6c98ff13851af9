//! Throughput of the outbound SMS splitter (§4.I) across the two
//! encodings it has to budget differently: an 8-bit payload that fits
//! in one part, and a 7-bit payload long enough to force a multi-part
//! concatenated split.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use bearerbox::message::{Sms, SmsType};
use bearerbox::splitter::{self, SplitOptions};

fn single_part_opts() -> SplitOptions {
    SplitOptions {
        max_octets: 140,
        max_messages: 1,
        ..SplitOptions::default()
    }
}

fn multi_part_opts() -> SplitOptions {
    SplitOptions {
        max_octets: 140,
        max_messages: 10,
        concatenation: true,
        ..SplitOptions::default()
    }
}

fn sms_with_len(len: usize, flag_8bit: bool) -> Sms {
    let mut sms = Sms::new("1234", "5678", SmsType::MtReply);
    sms.flag_8bit = flag_8bit;
    sms.msgdata = vec![b'x'; len];
    sms
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("splitter");

    group.bench_function("single_part_8bit", |b| {
        b.iter_batched(
            || sms_with_len(120, true),
            |sms| black_box(splitter::split(sms, &single_part_opts())),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("multi_part_7bit_concatenated", |b| {
        b.iter_batched(
            || sms_with_len(400, false),
            |sms| black_box(splitter::split(sms, &multi_part_opts())),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_split);
criterion_main!(benches);
