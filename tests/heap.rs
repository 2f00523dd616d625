//! Heap scenarios over a real [`Region`], checking the structural invariants
//! after every call and the user data after every phase.

use nextfit::{Heap, HeapError, HeapPtr, Region, ALIGNMENT, HEADER_SIZE, MIN_REGION_SIZE};

/// Deterministic xorshift so failures can be reproduced.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

fn fill(heap: &mut Heap<Region>, ptr: HeapPtr, len: usize, tag: u8) {
    heap.bytes_mut(ptr).unwrap()[..len].fill(tag);
}

fn check(heap: &Heap<Region>, ptr: HeapPtr, len: usize, tag: u8) {
    assert!(
        heap.bytes(ptr).unwrap()[..len].iter().all(|byte| *byte == tag),
        "contents of {ptr:?} corrupted"
    );
}

#[test]
fn random_workload_keeps_invariants_and_data() {
    let mut heap = Heap::new(Region::request(16 * 1024).unwrap());
    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
    let mut live: Vec<(HeapPtr, usize, u8)> = Vec::new();

    for round in 0..2_000 {
        if rng.below(3) == 0 && !live.is_empty() {
            let (ptr, len, tag) = live.swap_remove(rng.below(live.len()));
            check(&heap, ptr, len, tag);
            heap.release(ptr);
        } else {
            let len = rng.below(300);
            let tag = (round % 251) as u8;

            match heap.allocate(len) {
                Ok(ptr) => {
                    assert_eq!(heap.address_of(ptr) % ALIGNMENT, 0);
                    assert!(heap.usable_size(ptr).unwrap() >= len);
                    fill(&mut heap, ptr, len, tag);
                    live.push((ptr, len, tag));
                }
                Err(HeapError::OutOfMemory { requested }) => assert_eq!(requested, len),
                Err(err) => panic!("unexpected error {err}"),
            }
        }

        assert_eq!(heap.validate(), Ok(()), "round {round}");
    }

    for (ptr, len, tag) in &live {
        check(&heap, *ptr, *len, *tag);
    }

    // Live blocks never overlap.
    let mut spans: Vec<_> = live
        .iter()
        .map(|(ptr, _, _)| (ptr.offset(), ptr.offset() + heap.usable_size(*ptr).unwrap()))
        .collect();
    spans.sort();
    for pair in spans.windows(2) {
        assert!(pair[0].1 + HEADER_SIZE <= pair[1].0);
    }

    for (ptr, _, _) in live.drain(..) {
        heap.try_release(ptr).unwrap();
    }

    let stats = heap.stats().unwrap();
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.free_blocks, 1);
}

#[test]
fn exhaustion_then_recovery() {
    let mut heap = Heap::new(Region::request(4096).unwrap());
    let mut pointers = Vec::new();

    while let Ok(ptr) = heap.allocate(100) {
        pointers.push(ptr);
    }
    assert!(!pointers.is_empty());
    assert!(matches!(heap.allocate(100), Err(HeapError::OutOfMemory { .. })));

    let victim = pointers[pointers.len() / 2];
    heap.release(victim);

    assert_eq!(heap.allocate(100), Ok(victim));
    assert_eq!(heap.validate(), Ok(()));
}

#[test]
fn double_release_leaves_cycle_intact() {
    let mut heap = Heap::new(Region::request(4096).unwrap());

    let a = heap.allocate(32).unwrap();
    let b = heap.allocate(32).unwrap();
    let _c = heap.allocate(32).unwrap();

    heap.release(b);
    let before = heap.stats().unwrap();

    heap.release(b);
    assert_eq!(heap.try_release(b), Err(HeapError::NotAllocated { offset: b.offset() }));
    assert_eq!(heap.stats().unwrap(), before);
    assert_eq!(heap.validate(), Ok(()));

    heap.release(a);
    heap.release(a);
    assert_eq!(heap.validate(), Ok(()));
}

#[test]
fn region_too_small_never_allocates() {
    // A region of a single page is always big enough, so the smallest case
    // is a slice of it.
    let mut region = Region::request(MIN_REGION_SIZE).unwrap();
    let mut heap = Heap::new(&mut region.as_mut()[..MIN_REGION_SIZE - ALIGNMENT]);

    assert!(matches!(heap.init(), Err(HeapError::RegionTooSmall { .. })));
    assert!(!heap.is_initialized());
    assert!(heap.allocate(0).is_err());
    assert!(heap.allocate(8).is_err());
}

#[test]
fn same_size_round_trip_reuses_block() {
    let mut heap = Heap::new(Region::request(8192).unwrap());

    for size in [0, 1, 8, 24, 100, 1000] {
        let ptr = heap.allocate(size).unwrap();
        heap.release(ptr);
        assert_eq!(heap.allocate(size), Ok(ptr), "size {size}");
        heap.release(ptr);
    }
}
