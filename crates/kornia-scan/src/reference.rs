//! Sequential host references.

use crate::element::{Element, FloatElement};
use crate::kernels::scan::ScanMode;

/// Left-to-right sum.
pub fn sequential_sum<T: Element>(input: &[T]) -> T {
    input.iter().fold(T::zero(), |acc, &v| acc.accumulate(v))
}

/// Compensated (Kahan) sum.
pub fn kahan_sum<T: FloatElement>(input: &[T]) -> T {
    let mut sum = T::zero();
    let mut compensation = T::zero();
    for &value in input {
        let y = value - compensation;
        let t = sum + y;
        compensation = (t - sum) - y;
        sum = t;
    }
    sum
}

/// Left-to-right prefix sum.
pub fn sequential_scan<T: Element>(input: &[T], mode: ScanMode) -> Vec<T> {
    let mut running = T::zero();
    input
        .iter()
        .map(|&v| {
            let before = running;
            running = running.accumulate(v);
            match mode {
                ScanMode::Inclusive => running,
                ScanMode::Exclusive => before,
            }
        })
        .collect()
}
