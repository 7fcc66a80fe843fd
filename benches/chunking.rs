use criterion::{Criterion, criterion_group, criterion_main};
use ops_rag::embeddings::{ChunkingConfig, chunk_documents};
use ops_rag::loaders::{Document, DocumentSource};
use std::hint::black_box;

fn synthetic_log(lines: usize) -> String {
    (0..lines)
        .map(|i| {
            format!(
                "2024-05-01 10:{:02}:{:02} ERROR OrderService - order {} failed: NullPointerException at OrderService.placeOrder(OrderService.java:{})\n",
                (i / 60) % 60,
                i % 60,
                i,
                40 + i % 20
            )
        })
        .collect()
}

fn synthetic_java(methods: usize) -> String {
    let mut source = String::from("package shop;\n\npublic class OrderService {\n");
    for i in 0..methods {
        source.push_str(&format!(
            "    /** Places order variant {i}. */\n    public Order place{i}(Order order) {{\n        if (order.getStock() == null) {{\n            throw new IllegalStateException(\"missing stock\");\n        }}\n        return repository.save(order);\n    }}\n\n"
        ));
    }
    source.push_str("}\n");
    source
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let source = DocumentSource::Directory {
        root: "data/log".to_string(),
    };
    let documents = vec![
        Document::new("order-service.log", synthetic_log(2_000), source.clone()),
        Document::new("OrderService.java", synthetic_java(200), source),
    ];
    let config = ChunkingConfig::default();
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_documents(black_box(&documents), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
