//! Monotonic and thread-CPU clocks, plus per-thread trace ids.

/// Monotonic clock in microseconds. This is the trace clock: every event
/// timestamp in the recorder comes from here.
pub fn monotonic_micros() -> i64 {
    clock_micros(libc::CLOCK_MONOTONIC)
}

/// CPU time consumed by the calling thread, in microseconds, or `-1` when the
/// host cannot report it.
pub fn thread_cpu_micros() -> i64 {
    clock_micros(libc::CLOCK_THREAD_CPUTIME_ID)
}

fn clock_micros(clock: libc::clockid_t) -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    if rc != 0 {
        return -1;
    }
    ts.tv_sec as i64 * 1_000_000 + ts.tv_nsec as i64 / 1_000
}

/// The calling thread's trace id (its kernel tid).
pub fn current_trace_id() -> i64 {
    thread_local! {
        static TRACE_ID: i64 = unsafe { libc::syscall(libc::SYS_gettid) as i64 };
    }
    TRACE_ID.try_with(|&id| id).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let a = monotonic_micros();
        let b = monotonic_micros();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn trace_id_is_stable_within_a_thread() {
        assert_eq!(current_trace_id(), current_trace_id());
        assert!(current_trace_id() > 0);
    }

    #[test]
    fn trace_ids_differ_across_threads() {
        let here = current_trace_id();
        let there = std::thread::spawn(current_trace_id).join().unwrap();
        assert_ne!(here, there);
    }
}
