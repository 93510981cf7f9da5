//! Host stack growth for the recursive parser and evaluator.
//!
//! Nested Lua calls, metamethod re-entry and deeply nested expressions all
//! recurse on the native stack. Wrapping the recursive entry points in
//! [`ensure_sufficient_stack`] grows the stack on demand, so the configured
//! call-depth limit is what stops runaway recursion, not a host crash.

/// Grow when less than this much stack remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(n: u32) -> u32 {
        ensure_sufficient_stack(|| if n == 0 { 0 } else { 1 + depth(n - 1) })
    }

    #[test]
    fn deep_recursion_survives() {
        assert_eq!(depth(200_000), 200_000);
    }
}
