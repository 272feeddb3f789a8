use criterion::{black_box, criterion_group, criterion_main, Criterion};
use objectpool::{FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration, Strategy};
use std::thread;

struct Buffers;

const BUFFER_SIZE: usize = 64 * 1024;

impl ObjectFactory<Vec<u8>> for Buffers {
    fn make_object(&self, _pool: &ObjectPool<Vec<u8>>) -> FactoryResult<Vec<u8>> {
        Ok(Vec::with_capacity(BUFFER_SIZE))
    }

    fn destroy_object(&self, _pool: &ObjectPool<Vec<u8>>, _object: &Vec<u8>) -> FactoryResult<()> {
        Ok(())
    }
}

fn pool(strategy: Strategy) -> ObjectPool<Vec<u8>> {
    let config = PoolConfiguration::new()
        .with_maximum(64)
        .with_warmup(64)
        .with_strategy(strategy)
        .without_executor();
    ObjectPool::new(Buffers, config).unwrap()
}

fn borrow(c: &mut Criterion) {
    c.bench_function("borrow_lifo", |b| {
        let pool = pool(Strategy::Lifo);
        b.iter(|| {
            let mut buffer = black_box(pool.borrow_object().unwrap());
            buffer.push(1);
            buffer.clear();
            black_box(buffer.capacity())
        })
    });
    c.bench_function("borrow_fifo", |b| {
        let pool = pool(Strategy::Fifo);
        b.iter(|| {
            let buffer = black_box(pool.borrow_object().unwrap());
            black_box(buffer.capacity())
        })
    });
    c.bench_function("system", |b| {
        b.iter(|| {
            let buffer: Vec<u8> = black_box(Vec::with_capacity(BUFFER_SIZE));
            black_box(buffer.capacity())
        })
    });
}

fn borrow_multi(c: &mut Criterion) {
    c.bench_function("borrow_multi", |b| {
        let pool = pool(Strategy::Lifo);
        b.iter(|| {
            thread::scope(|scope| {
                for _ in 0..8 {
                    scope.spawn(|| {
                        for _ in 0..256 {
                            let buffer = black_box(pool.borrow_object().unwrap());
                            black_box(buffer.capacity());
                        }
                    });
                }
            });
        })
    });
}

criterion_group!(benches, borrow, borrow_multi);
criterion_main!(benches);
