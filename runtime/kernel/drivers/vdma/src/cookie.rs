// Licensed under the Apache-2.0 license

use crate::hil::DmaStatus;

pub const MIN_COOKIE: i32 = 1;
pub const MAX_COOKIE: i32 = i32::MAX;

/// Transfer identifier handed out by `submit`.
///
/// Cookies grow by one per segment and wrap from [`MAX_COOKIE`] back to
/// [`MIN_COOKIE`]. Zero means "not submitted yet".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Cookie(pub i32);

impl Cookie {
    pub const UNASSIGNED: Cookie = Cookie(0);
    pub const MIN: Cookie = Cookie(MIN_COOKIE);
    pub const MAX: Cookie = Cookie(MAX_COOKIE);

    pub const fn next(self) -> Cookie {
        if self.0 < MAX_COOKIE {
            Cookie(self.0 + 1)
        } else {
            Cookie(MIN_COOKIE)
        }
    }

    pub const fn is_assigned(self) -> bool {
        self.0 >= MIN_COOKIE
    }

    /// Completion test against the channel counters, valid across a wrap
    /// of the cookie space.
    pub fn status(self, last_complete: Cookie, last_used: Cookie) -> DmaStatus {
        let (c, done, used) = (self.0, last_complete.0, last_used.0);
        let complete = if done <= used {
            c <= done || c > used
        } else {
            c <= done && c > used
        };
        if complete {
            DmaStatus::Complete
        } else {
            DmaStatus::InProgress
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_next_wraps_to_min() {
        assert_eq!(Cookie::MIN.next(), Cookie(2));
        assert_eq!(Cookie(MAX_COOKIE - 1).next(), Cookie::MAX);
        assert_eq!(Cookie::MAX.next(), Cookie::MIN);
        assert!(!Cookie::UNASSIGNED.is_assigned());
    }

    #[test]
    fn test_status_without_wrap() {
        let done = Cookie(5);
        let used = Cookie(8);
        assert_eq!(Cookie(4).status(done, used), DmaStatus::Complete);
        assert_eq!(Cookie(5).status(done, used), DmaStatus::Complete);
        assert_eq!(Cookie(6).status(done, used), DmaStatus::InProgress);
        assert_eq!(Cookie(8).status(done, used), DmaStatus::InProgress);
    }

    #[test]
    fn test_status_across_wrap() {
        // Issued MAX-1, MAX, MIN, 2; completed up to MAX.
        let used = Cookie::MAX.next().next();
        let done = Cookie::MAX;
        assert_eq!(used, Cookie(2));
        assert_eq!(Cookie(MAX_COOKIE - 1).status(done, used), DmaStatus::Complete);
        assert_eq!(Cookie::MAX.status(done, used), DmaStatus::Complete);
        assert_eq!(Cookie::MIN.status(done, used), DmaStatus::InProgress);
        assert_eq!(Cookie(2).status(done, used), DmaStatus::InProgress);

        // Completion catches up past the wrap.
        let done = Cookie(2);
        assert_eq!(Cookie::MAX.status(done, used), DmaStatus::Complete);
        assert_eq!(Cookie::MIN.status(done, used), DmaStatus::Complete);
        assert_eq!(Cookie(2).status(done, used), DmaStatus::Complete);
    }

    #[test]
    fn test_status_monotonic_over_wrap() {
        // Walk a window of cookies across the wrap, completing one at a time.
        let mut issued = [Cookie::UNASSIGNED; 6];
        let mut last = Cookie(MAX_COOKIE - 3);
        for slot in issued.iter_mut() {
            last = last.next();
            *slot = last;
        }
        let mut done = Cookie(MAX_COOKIE - 3);
        for (i, cookie) in issued.iter().enumerate() {
            assert_eq!(cookie.status(done, last), DmaStatus::InProgress);
            done = *cookie;
            for earlier in &issued[..=i] {
                assert_eq!(earlier.status(done, last), DmaStatus::Complete);
            }
            for later in &issued[i + 1..] {
                assert_eq!(later.status(done, last), DmaStatus::InProgress);
            }
        }
    }
}
