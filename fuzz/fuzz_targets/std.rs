#![no_main]

use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use kumquat::{Error, HashMap as KumquatHashMap};
use std::collections::HashMap as StdHashMap;

#[derive(Debug, Arbitrary)]
enum Operation {
    Put(i32, i32),
    Remove(i32),
    Get(i32),
    Contains(i32),
    Len,
    IsEmpty,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    operations: Vec<Operation>,
}

// Folds a key into a small range so operations collide and force resizes. Non-positive
// keys are kept to exercise argument validation.
fn key(k: i32) -> i32 {
    if k > 0 {
        k % 256 + 1
    } else {
        k
    }
}

fn fuzz_hashmap(input: FuzzInput) {
    let mut std_map = StdHashMap::new();
    let kumquat_raw = KumquatHashMap::new();
    let kumquat_map = kumquat_raw.pin();

    for op in input.operations {
        match op {
            Operation::Put(k, v) => {
                let k = key(k);
                let kumquat_result = kumquat_map.put(k, v);
                if k <= 0 {
                    assert_eq!(kumquat_result, Err(Error::InvalidKey(k)));
                } else if v <= 0 {
                    assert_eq!(kumquat_result, Err(Error::InvalidValue(v)));
                } else {
                    assert_eq!(kumquat_result, Ok(std_map.insert(k, v)));
                }
            }
            Operation::Remove(k) => {
                let k = key(k);
                let kumquat_result = kumquat_map.remove(k);
                if k <= 0 {
                    assert_eq!(kumquat_result, Err(Error::InvalidKey(k)));
                } else {
                    assert_eq!(kumquat_result, Ok(std_map.remove(&k)));
                }
            }
            Operation::Get(k) => {
                let k = key(k);
                let kumquat_result = kumquat_map.get(k);
                if k <= 0 {
                    assert_eq!(kumquat_result, Err(Error::InvalidKey(k)));
                } else {
                    assert_eq!(kumquat_result, Ok(std_map.get(&k).copied()));
                }
            }
            Operation::Contains(k) => {
                let k = key(k);
                if k > 0 {
                    assert_eq!(kumquat_map.contains_key(k), Ok(std_map.contains_key(&k)));
                }
            }
            Operation::Len => {
                assert_eq!(std_map.len(), kumquat_map.len());
            }
            Operation::IsEmpty => {
                assert_eq!(std_map.is_empty(), kumquat_map.is_empty());
            }
        }
    }

    // Final consistency checks
    for (k, v) in std_map.iter() {
        assert_eq!(kumquat_map.get(*k), Ok(Some(*v)));
    }
    assert_eq!(std_map.len(), kumquat_map.len());
    assert_eq!(std_map.is_empty(), kumquat_map.is_empty());
}

fuzz_target!(|data: FuzzInput| {
    fuzz_hashmap(data);
});
