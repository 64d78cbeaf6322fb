mod common;

use common::{world, Entry, Id};
use kmer_dht::{AtomicDomain, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of ranks racing for the same slots.
const RANKS: usize = 6;

/// Slots per rank.
const CAPACITY: usize = 32;

/// Number of times the whole race is repeated.
const ITERATIONS: usize = 8;

#[test]
fn exactly_one_claim_wins() {
    for _ in 0..ITERATIONS {
        let winners: Vec<AtomicUsize> = (0..RANKS * CAPACITY)
            .map(|_| AtomicUsize::new(0))
            .collect();
        world(RANKS).run(|rank| {
            let domain = AtomicDomain::new(rank);
            let map = HashMap::<Entry>::new(rank, CAPACITY);
            rank.barrier();
            // every rank goes after every slot on every rank, starting at a different place
            for i in 0..RANKS * CAPACITY {
                let i = (i + rank.rank_me() * 7) % (RANKS * CAPACITY);
                if map.try_claim(i / CAPACITY, i % CAPACITY, &domain) {
                    winners[i].fetch_add(1, Ordering::Relaxed);
                }
            }
            rank.barrier();
            for owner in 0..RANKS {
                for slot in 0..CAPACITY {
                    assert!(map.occupied(owner, slot));
                }
            }
        });
        for (i, w) in winners.iter().enumerate() {
            let w = w.load(Ordering::Relaxed);
            assert_eq!(w, 1, "slot {} had {} winners", i, w);
        }
    }
}

#[test]
fn racing_inserts_never_share_a_slot() {
    // every rank inserts into the same target rank, all starting from the same slot
    let placements = world(RANKS).run(|rank| {
        let domain = AtomicDomain::new(rank);
        let map = HashMap::<Entry>::new(rank, CAPACITY);
        rank.barrier();
        let me = rank.rank_me() as u64;
        let mut mine = Vec::new();
        for i in 0..4u64 {
            // keys are multiples of RANKS * CAPACITY offset by the same amount, so they share a
            // target rank and a first slot
            let key = (me * 4 + i) * (RANKS * CAPACITY) as u64 + 1;
            mine.push((key, map.try_insert(&Entry::new(key), &domain).unwrap()));
        }
        map.drain();
        rank.barrier();
        for &(key, _) in &mine {
            assert_eq!(map.find(&Id(key)), Some(Entry::new(key)));
        }
        mine
    });

    let mut slots: Vec<_> = placements
        .iter()
        .flatten()
        .map(|(_, p)| (p.rank, p.slot))
        .collect();
    assert!(slots.iter().all(|&(r, _)| r == 1));
    slots.sort_unstable();
    slots.dedup();
    assert_eq!(slots.len(), RANKS * 4);
    assert_eq!(slots, (1..=RANKS * 4).map(|s| (1, s)).collect::<Vec<_>>());
}
