#![allow(dead_code)]

use kumquat::HashMap;
use seize::Collector;

// Run the test on different configurations of a `HashMap`.
pub fn with_map(mut test: impl FnMut(&dyn Fn() -> HashMap)) {
    // The default collector.
    test(&(|| HashMap::new()));

    // Reclaim superseded tables as eagerly as possible to stress guard protection.
    test(
        &(|| {
            HashMap::builder()
                .collector(Collector::new().batch_size(1))
                .build()
        }),
    );
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two()
    }
}

// Scales an iteration count for the current test configuration.
pub fn scaled(n: usize) -> usize {
    if cfg!(miri) {
        (n / 100).max(1)
    } else if cfg!(kumquat_stress) {
        n * 4
    } else {
        n
    }
}
