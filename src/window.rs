use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Keep at most `n` aligned samples, evicting the oldest.
    Bounded(usize),
    /// Expanding window.
    Unbounded,
}

impl WindowPolicy {
    pub fn from_flag(use_fixed_train_size: bool, capacity: usize) -> Self {
        if use_fixed_train_size {
            WindowPolicy::Bounded(capacity.max(1))
        } else {
            WindowPolicy::Unbounded
        }
    }
}

/// Aligned price history for both legs of the pair.
#[derive(Debug, Clone)]
pub struct RollingWindowBuffer {
    policy: WindowPolicy,
    s0: VecDeque<f64>,
    s1: VecDeque<f64>,
}

impl RollingWindowBuffer {
    pub fn new(policy: WindowPolicy) -> Self {
        let capacity = match policy {
            WindowPolicy::Bounded(n) => n,
            WindowPolicy::Unbounded => 0,
        };
        Self {
            policy,
            s0: VecDeque::with_capacity(capacity),
            s1: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns false when the pair was rejected because a price is missing.
    pub fn append(&mut self, p0: Option<f64>, p1: Option<f64>) -> bool {
        let (p0, p1) = match (usable(p0), usable(p1)) {
            (Some(p0), Some(p1)) => (p0, p1),
            _ => {
                log::warn!("[WINDOW] missing price p0={:?} p1={:?}; skipped", p0, p1);
                return false;
            }
        };

        if let WindowPolicy::Bounded(n) = self.policy {
            while self.s0.len() >= n {
                self.s0.pop_front();
                self.s1.pop_front();
            }
        }
        self.s0.push_back(p0);
        self.s1.push_back(p1);
        true
    }

    pub fn len(&self) -> usize {
        self.s0.len()
    }

    pub fn first(&self) -> Option<(f64, f64)> {
        Some((*self.s0.front()?, *self.s1.front()?))
    }

    pub fn last(&self) -> Option<(f64, f64)> {
        Some((*self.s0.back()?, *self.s1.back()?))
    }

    pub fn series(&self) -> (Vec<f64>, Vec<f64>) {
        (
            self.s0.iter().copied().collect(),
            self.s1.iter().copied().collect(),
        )
    }
}

pub(crate) fn usable(price: Option<f64>) -> Option<f64> {
    price.filter(|p| p.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_window_evicts_oldest_pair() {
        let mut buf = RollingWindowBuffer::new(WindowPolicy::Bounded(3));
        for i in 0..5 {
            assert!(buf.append(Some(i as f64), Some(10.0 + i as f64)));
        }
        let (s0, s1) = buf.series();
        assert_eq!(s0, vec![2.0, 3.0, 4.0]);
        assert_eq!(s1, vec![12.0, 13.0, 14.0]);
        assert_eq!(buf.first(), Some((2.0, 12.0)));
    }

    #[test]
    fn unbounded_window_keeps_everything() {
        let mut buf = RollingWindowBuffer::new(WindowPolicy::Unbounded);
        for i in 0..100 {
            buf.append(Some(i as f64), Some(i as f64));
        }
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.first(), Some((0.0, 0.0)));
    }

    #[test]
    fn missing_leg_leaves_both_windows_untouched() {
        let mut buf = RollingWindowBuffer::new(WindowPolicy::Bounded(4));
        buf.append(Some(1.0), Some(2.0));
        assert!(!buf.append(Some(3.0), None));
        assert!(!buf.append(None, Some(3.0)));
        assert!(!buf.append(Some(f64::NAN), Some(3.0)));
        let (s0, s1) = buf.series();
        assert_eq!(s0.len(), s1.len());
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.last(), Some((1.0, 2.0)));
    }

    #[test]
    fn policy_follows_fixed_train_flag() {
        assert_eq!(WindowPolicy::from_flag(true, 10), WindowPolicy::Bounded(10));
        assert_eq!(WindowPolicy::from_flag(false, 10), WindowPolicy::Unbounded);
    }
}
