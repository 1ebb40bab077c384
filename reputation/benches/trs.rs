#[macro_use]
extern crate bencher;
use bencher::Bencher;
use witnet_explorer_reputation::trs::{penalize_factor, Alpha, Reputation, TotalReputationSet};

const PENALIZATION_FACTOR: f64 = 0.5;

fn ids(n: u64) -> Vec<String> {
    (0..n).map(|i| format!("wit1qqqq{:032}", i)).collect()
}

fn packet(ids: &[String]) -> Vec<(String, Reputation)> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), Reputation(10 + (i as u64 % 4))))
        .collect()
}

fn bench_gain(b: &mut Bencher) {
    let v = packet(&ids(10_000));

    b.iter(|| {
        let mut a = TotalReputationSet::new();
        a.gain(Alpha(10), v.clone()).unwrap();
    })
}

fn bench_gain_x10(b: &mut Bencher) {
    let v = packet(&ids(10_000));

    b.iter(|| {
        let mut a = TotalReputationSet::new();
        for j in 0..10 {
            a.gain(Alpha(10 + j), v.clone()).unwrap();
        }
    })
}

fn bench_gain_expire(b: &mut Bencher) {
    let v = packet(&ids(10_000));

    b.iter(|| {
        let mut a = TotalReputationSet::new();
        a.gain(Alpha(10), v.clone()).unwrap();
        a.expire(&Alpha(10)).unwrap();
    })
}

fn bench_gain_penalize(b: &mut Bencher) {
    let identities = ids(10_000);
    let v = packet(&identities);

    b.iter(|| {
        let mut a = TotalReputationSet::new();
        a.gain(Alpha(10), v.clone()).unwrap();
        // Apply a one-lie penalization to each identity
        let pp = identities
            .iter()
            .map(|id| (id, penalize_factor(PENALIZATION_FACTOR, 1)));
        a.penalize_many(pp).unwrap();
    })
}

fn bench_gain_penalize_few(b: &mut Bencher) {
    let identities = ids(10_000);
    let v = packet(&identities);

    b.iter(|| {
        let mut a = TotalReputationSet::new();
        a.gain(Alpha(10), v.clone()).unwrap();
        // Penalize few identities but with a big penalization
        let pp = identities
            .iter()
            .take(1000)
            .map(|id| (id, penalize_factor(PENALIZATION_FACTOR, 10)));
        a.penalize_many(pp).unwrap();
    })
}

fn bench_100_alpha_full_cycle(b: &mut Bencher) {
    let identities = ids(10_000);
    let v = packet(&identities);

    let mut a = TotalReputationSet::new();
    for j in 0..100 {
        a.gain(Alpha(j), v.clone()).unwrap();
    }

    b.iter(|| {
        let mut a = a.clone();
        // Expire
        a.expire(&Alpha(0)).unwrap();
        // Gain
        a.gain(Alpha(100), v.clone()).unwrap();
        // Apply a one-lie penalization to each identity
        let pp = identities
            .iter()
            .map(|id| (id, penalize_factor(PENALIZATION_FACTOR, 1)));
        a.penalize_many(pp).unwrap();
        a
    })
}

fn bench_100_alpha_expire(b: &mut Bencher) {
    let v = packet(&ids(10_000));

    let mut a = TotalReputationSet::new();
    for j in 0..100 {
        a.gain(Alpha(j), v.clone()).unwrap();
    }

    b.iter(|| {
        let mut a = a.clone();
        a.expire(&Alpha(100)).unwrap();
    })
}

fn bench_rep_sum(b: &mut Bencher) {
    let v = packet(&ids(10_000));

    b.iter(|| {
        let mut a = TotalReputationSet::new();
        a.gain(Alpha(10), v.clone()).unwrap();
        a.get_total_sum()
    })
}

benchmark_main!(benches);
benchmark_group!(
    benches,
    bench_gain,
    bench_gain_x10,
    bench_gain_expire,
    bench_gain_penalize,
    bench_gain_penalize_few,
    bench_100_alpha_full_cycle,
    bench_100_alpha_expire,
    bench_rep_sum,
);
