//! Package queue for tally-track.
//!
//! This module provides the ordered queue of outgoing packages with:
//! - FIFO ordering for delivery
//! - Single-flight tracking (at most one package handed out at a time)
//! - Retry accounting against a ceiling
//! - Max size limits to prevent unbounded memory growth
//!
//! The queue is owned by the package handler in track-client, which
//! persists it after every change. Unlike a plain work queue, the package
//! being delivered stays at the head until its outcome is known, so a
//! snapshot taken mid-flight still contains it.

use std::collections::VecDeque;
use track_types::{ActivityPackage, PackageId};

/// Error type for queue operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Queue is at capacity.
    Full {
        /// Current queue capacity.
        capacity: usize,
    },
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full { capacity } => {
                write!(f, "package queue full (capacity: {})", capacity)
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// What happened to a package after a failed delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// The package stays at the head and will be attempted again.
    Retry {
        /// Failed attempts so far, including this one.
        retries: u32,
    },
    /// The package was removed and will never be delivered.
    Dropped {
        /// The abandoned package.
        package: ActivityPackage,
    },
}

/// Ordered package queue with single-flight tracking.
///
/// Packages flow through the queue in this order:
/// 1. `enqueue()` - add to the back
/// 2. `begin_next()` - mark the head in flight and hand out a copy
/// 3. `complete()` - remove the head (delivery confirmed)
///
/// If delivery fails, call `fail()`: the head either stays for another
/// attempt or is dropped once it reaches the retry ceiling.
#[derive(Debug)]
pub struct PackageQueue {
    /// Maximum number of packages.
    capacity: usize,
    /// Packages in delivery order. The in-flight package, if any, is the head.
    queue: VecDeque<ActivityPackage>,
    /// Id of the package currently being delivered.
    in_flight: Option<PackageId>,
}

impl PackageQueue {
    /// Create an empty queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::new(),
            in_flight: None,
        }
    }

    /// Rebuild a queue from persisted packages, keeping their order.
    ///
    /// Packages beyond capacity are kept: they were accepted before and
    /// dropping them silently would lose data. New enqueues fail until the
    /// queue drains below capacity.
    pub fn from_packages(capacity: usize, packages: Vec<ActivityPackage>) -> Self {
        Self {
            capacity,
            queue: packages.into(),
            in_flight: None,
        }
    }

    /// Add a package to the back of the queue.
    pub fn enqueue(&mut self, package: ActivityPackage) -> Result<(), QueueError> {
        if self.queue.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        self.queue.push_back(package);
        Ok(())
    }

    /// Remove the most recently enqueued package.
    ///
    /// Used to roll back an enqueue whose persistence failed. Never removes
    /// the in-flight package.
    pub fn pop_back(&mut self) -> Option<ActivityPackage> {
        let back = self.queue.back()?;
        if Some(back.id()) == self.in_flight {
            return None;
        }
        self.queue.pop_back()
    }

    /// Mark the head in flight and return a copy of it.
    ///
    /// Returns `None` if the queue is empty or a package is already in flight.
    pub fn begin_next(&mut self) -> Option<ActivityPackage> {
        if self.in_flight.is_some() {
            return None;
        }
        let head = self.queue.front()?;
        self.in_flight = Some(head.id());
        Some(head.clone())
    }

    /// Confirm delivery of the in-flight package and remove it.
    ///
    /// Returns `None` (and changes nothing) if `id` is not in flight.
    pub fn complete(&mut self, id: &PackageId) -> Option<ActivityPackage> {
        if self.in_flight != Some(*id) {
            return None;
        }
        self.in_flight = None;
        self.queue.pop_front()
    }

    /// Record a failed delivery of the in-flight package.
    ///
    /// A retryable failure increments the retry count and keeps the package
    /// at the head while the count is below `max_retries`. A permanent
    /// failure, or reaching the ceiling, drops it.
    ///
    /// Returns `None` (and changes nothing) if `id` is not in flight.
    pub fn fail(
        &mut self,
        id: &PackageId,
        retryable: bool,
        max_retries: u32,
    ) -> Option<FailureOutcome> {
        if self.in_flight != Some(*id) {
            return None;
        }
        self.in_flight = None;
        let package = self.queue.pop_front()?.with_failed_attempt();

        if retryable && package.retries() < max_retries {
            let retries = package.retries();
            self.queue.push_front(package);
            Some(FailureOutcome::Retry { retries })
        } else {
            Some(FailureOutcome::Dropped { package })
        }
    }

    /// Forget the in-flight marker without recording an outcome.
    ///
    /// The head stays queued and will be handed out again.
    pub fn release(&mut self) {
        self.in_flight = None;
    }

    /// Id of the package currently in flight.
    pub fn in_flight(&self) -> Option<PackageId> {
        self.in_flight
    }

    /// Check if a package is in flight.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The head of the queue, if any.
    pub fn front(&self) -> Option<&ActivityPackage> {
        self.queue.front()
    }

    /// Number of packages, including the in-flight one.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of packages accepted.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over packages in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = &ActivityPackage> {
        self.queue.iter()
    }

    /// Copy of all packages in delivery order, for persistence.
    pub fn to_vec(&self) -> Vec<ActivityPackage> {
        self.queue.iter().cloned().collect()
    }

    /// Remove every package and clear the in-flight marker.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use track_types::{ActivityKind, ParamValue, Parameters};

    fn make_package() -> ActivityPackage {
        ActivityPackage::new(ActivityKind::Event, Parameters::new(), 0)
    }

    fn make_numbered(n: i64) -> ActivityPackage {
        let mut params = Parameters::new();
        params.insert("n".into(), ParamValue::Int(n));
        ActivityPackage::new(ActivityKind::Event, params, 0)
    }

    fn number(pkg: &ActivityPackage) -> i64 {
        match pkg.parameter("n") {
            Some(ParamValue::Int(n)) => *n,
            other => panic!("unexpected parameter {:?}", other),
        }
    }

    #[test]
    fn queue_accepts_packages() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn queue_respects_capacity() {
        let mut queue = PackageQueue::new(2);

        queue.enqueue(make_package()).unwrap();
        queue.enqueue(make_package()).unwrap();
        let overflow = queue.enqueue(make_package());

        assert_eq!(overflow, Err(QueueError::Full { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn begin_next_hands_out_head_in_order() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_numbered(1)).unwrap();
        queue.enqueue(make_numbered(2)).unwrap();

        let first = queue.begin_next().unwrap();
        assert_eq!(number(&first), 1);

        queue.complete(&first.id()).unwrap();
        let second = queue.begin_next().unwrap();
        assert_eq!(number(&second), 2);
    }

    #[test]
    fn head_stays_queued_while_in_flight() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();

        let pkg = queue.begin_next().unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.in_flight(), Some(pkg.id()));
        assert_eq!(queue.to_vec()[0].id(), pkg.id());
    }

    #[test]
    fn only_one_package_in_flight() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();
        queue.enqueue(make_package()).unwrap();

        assert!(queue.begin_next().is_some());
        assert!(queue.begin_next().is_none());
    }

    #[test]
    fn begin_next_on_empty_returns_none() {
        let mut queue = PackageQueue::new(100);
        assert!(queue.begin_next().is_none());
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn complete_with_wrong_id_is_no_op() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();
        let _ = queue.begin_next();

        assert!(queue.complete(&PackageId::new()).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.is_in_flight());
    }

    #[test]
    fn complete_without_begin_is_no_op() {
        let mut queue = PackageQueue::new(100);
        let pkg = make_package();
        let id = pkg.id();
        queue.enqueue(pkg).unwrap();

        assert!(queue.complete(&id).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn retryable_failure_keeps_head_and_counts() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_numbered(1)).unwrap();
        queue.enqueue(make_numbered(2)).unwrap();

        let pkg = queue.begin_next().unwrap();
        let outcome = queue.fail(&pkg.id(), true, 5).unwrap();

        assert_eq!(outcome, FailureOutcome::Retry { retries: 1 });
        assert!(!queue.is_in_flight());

        let again = queue.begin_next().unwrap();
        assert_eq!(again.id(), pkg.id());
        assert_eq!(again.retries(), 1);
        assert_eq!(number(&again), 1);
    }

    #[test]
    fn permanent_failure_drops_head() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_numbered(1)).unwrap();
        queue.enqueue(make_numbered(2)).unwrap();

        let pkg = queue.begin_next().unwrap();
        let outcome = queue.fail(&pkg.id(), false, 5).unwrap();

        assert!(matches!(outcome, FailureOutcome::Dropped { .. }));
        assert_eq!(queue.len(), 1);
        assert_eq!(number(&queue.begin_next().unwrap()), 2);
    }

    #[test]
    fn reaching_retry_ceiling_drops_package() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();
        let ceiling = 3;

        for attempt in 1..ceiling {
            let pkg = queue.begin_next().unwrap();
            let outcome = queue.fail(&pkg.id(), true, ceiling).unwrap();
            assert_eq!(outcome, FailureOutcome::Retry { retries: attempt });
        }

        let pkg = queue.begin_next().unwrap();
        match queue.fail(&pkg.id(), true, ceiling).unwrap() {
            FailureOutcome::Dropped { package } => assert_eq!(package.retries(), ceiling),
            other => panic!("expected drop, got {:?}", other),
        }
        assert!(queue.is_empty());
        assert!(queue.begin_next().is_none());
    }

    #[test]
    fn zero_ceiling_drops_on_first_failure() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();
        let pkg = queue.begin_next().unwrap();

        let outcome = queue.fail(&pkg.id(), true, 0).unwrap();
        assert!(matches!(outcome, FailureOutcome::Dropped { .. }));
    }

    #[test]
    fn release_makes_head_available_again() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();
        let pkg = queue.begin_next().unwrap();

        queue.release();

        let again = queue.begin_next().unwrap();
        assert_eq!(again.id(), pkg.id());
        assert_eq!(again.retries(), 0);
    }

    #[test]
    fn pop_back_rolls_back_last_enqueue() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_numbered(1)).unwrap();
        queue.enqueue(make_numbered(2)).unwrap();

        let popped = queue.pop_back().unwrap();
        assert_eq!(number(&popped), 2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_back_never_removes_in_flight() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();
        let _ = queue.begin_next();

        assert!(queue.pop_back().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn from_packages_keeps_order_and_overflow() {
        let packages: Vec<_> = (1..=3).map(make_numbered).collect();
        let mut queue = PackageQueue::from_packages(2, packages);

        assert_eq!(queue.len(), 3);
        assert!(queue.enqueue(make_package()).is_err());
        let order: Vec<_> = queue.iter().map(number).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn clear_removes_all() {
        let mut queue = PackageQueue::new(100);
        queue.enqueue(make_package()).unwrap();
        queue.enqueue(make_package()).unwrap();
        let _ = queue.begin_next();

        queue.clear();

        assert!(queue.is_empty());
        assert!(!queue.is_in_flight());
    }
}
