use std::{fmt::Write, hint::black_box, path::Path};

use criterion::{Criterion, criterion_group, criterion_main};
use phpstitch::{BundleOptions, FragmentPipeline};

/// A fragment shaped like a typical library file
fn synthetic_fragment(functions: usize) -> String {
    let mut source = String::from(
        "<?php\ndeclare(strict_types=1);\n\nnamespace Bench;\n\nuse Bench\\Support\\Helper;\n\nrequire_once __DIR__ . '/helper.php';\n\nif (defined('BENCH_LOADED')) {\n    return;\n}\n",
    );
    for i in 0..functions {
        let _ = write!(
            source,
            "\n/** Doubles the input */\nfunction f{i}(int $x): int\n{{\n    // the body\n    $s = <<<EOT\n  value {i}\n  EOT;\n    return $x * 2 + strlen($s);\n}}\n"
        );
    }
    source
}

fn bench_pipeline(c: &mut Criterion) {
    let source = synthetic_fragment(200);
    let mut pipeline = FragmentPipeline::new(&BundleOptions::default()).expect("pipeline");

    c.bench_function("transform_fragment", |b| {
        b.iter(|| {
            pipeline
                .transform_source(Path::new("bench.php"), black_box(&source))
                .expect("transform")
        });
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
