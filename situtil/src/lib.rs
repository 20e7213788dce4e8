//! Small utilities shared by every crate in this workspace: an ordered
//! string->string tag map, a hierarchical stopwatch, and logger setup.

mod collections;
pub mod logger;
mod time;

pub use crate::collections::Tags;
pub use crate::time::{elapsed_seconds, Timer};

/// Stringify a number with commas: 1234567 -> "1,234,567"
pub fn prettyprint_usize(x: usize) -> String {
    let num = format!("{}", x);
    let mut result = String::new();
    let mut i = num.len();
    for c in num.chars() {
        result.push(c);
        i -= 1;
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prettyprint_usize() {
        assert_eq!(prettyprint_usize(0), "0");
        assert_eq!(prettyprint_usize(999), "999");
        assert_eq!(prettyprint_usize(1000), "1,000");
        assert_eq!(prettyprint_usize(1234567), "1,234,567");
    }
}
