use beacon_core::{Clock, JoinError, LeaseDuration, LeaseId, RenewalError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};

use crate::lease::Lease;

/// Told about a lease the manager could not renew. Called once per failure;
/// the manager stops renewing that lease afterwards.
pub trait RenewalListener: Send + Sync {
    fn on_renewal_failed(&self, lease: &Arc<Lease>, error: &RenewalError);
}

impl<F> RenewalListener for F
where
    F: Fn(&Arc<Lease>, &RenewalError) + Send + Sync,
{
    fn on_renewal_failed(&self, lease: &Arc<Lease>, error: &RenewalError) {
        self(lease, error)
    }
}

/// Default listener: records the failure in the log and nothing else.
pub struct LogRenewalFailure;

impl RenewalListener for LogRenewalFailure {
    fn on_renewal_failed(&self, lease: &Arc<Lease>, error: &RenewalError) {
        error!(
            lease = %lease.id(),
            registry = %lease.registry().id(),
            error = %error,
            "lease could not be renewed"
        );
    }
}

/// How long a lease should be kept alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalTarget {
    Forever,
    /// Stop renewing once the lease reaches this clock time.
    Until(u64),
}

struct Scheduled {
    generation: u64,
    handle: AbortHandle,
}

type Schedule = Arc<Mutex<HashMap<LeaseId, Scheduled>>>;

/// Keeps leases alive by renewing each one `safety_margin` before it expires.
///
/// Every lease runs on its own task, so a slow, failed or cancelled renewal
/// never shifts another lease's schedule.
pub struct LeaseManager {
    clock: Arc<dyn Clock>,
    safety_margin: Duration,
    schedule: Schedule,
    generations: AtomicU64,
    closed: AtomicBool,
}

impl LeaseManager {
    pub fn new(clock: Arc<dyn Clock>, safety_margin: Duration) -> Result<Self, JoinError> {
        if safety_margin.is_zero() {
            return Err(JoinError::Config("safety margin must be positive".into()));
        }
        Ok(Self {
            clock,
            safety_margin,
            schedule: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Clock time at which the next renewal of `lease` fires.
    pub fn renewal_due(&self, lease: &Lease) -> u64 {
        renewal_due(lease.expiration(), self.clock.now_millis(), as_millis(self.safety_margin))
    }

    /// Starts renewing `lease` until `target`. A lease already being renewed
    /// is rescheduled with the new target and listener. After [`shutdown`]
    /// nothing is scheduled and `false` is returned.
    ///
    /// [`shutdown`]: Self::shutdown
    pub fn renew_until(&self, lease: Arc<Lease>, target: RenewalTarget, listener: Arc<dyn RenewalListener>) -> bool {
        let id = lease.id();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let renewal = Renewal {
            clock: self.clock.clone(),
            margin_ms: as_millis(self.safety_margin),
            lease,
            target,
            listener,
        };
        let schedule = self.schedule.clone();

        let mut scheduled = self.schedule.lock();
        if self.closed.load(Ordering::Acquire) {
            debug!(lease = %id, "lease manager shut down, not renewing");
            return false;
        }
        let handle = tokio::spawn(async move {
            renewal.run().await;
            let mut scheduled = schedule.lock();
            if scheduled.get(&id).is_some_and(|s| s.generation == generation) {
                scheduled.remove(&id);
            }
            metrics::gauge!("beacon_active_leases").set(scheduled.len() as f64);
        });
        let previous = scheduled.insert(
            id,
            Scheduled {
                generation,
                handle: handle.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        metrics::gauge!("beacon_active_leases").set(scheduled.len() as f64);
        true
    }

    /// Stops renewing a lease. The lease itself is left to lapse.
    pub fn cancel(&self, lease: LeaseId) -> bool {
        match self.schedule.lock().remove(&lease) {
            Some(scheduled) => {
                scheduled.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_renewing(&self, lease: LeaseId) -> bool {
        self.schedule.lock().contains_key(&lease)
    }

    pub fn len(&self) -> usize {
        self.schedule.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops every renewal and refuses new ones.
    pub fn shutdown(&self) {
        let drained: Vec<Scheduled> = {
            let mut scheduled = self.schedule.lock();
            self.closed.store(true, Ordering::Release);
            scheduled.drain().map(|(_, s)| s).collect()
        };
        for scheduled in drained {
            scheduled.handle.abort();
        }
        metrics::gauge!("beacon_active_leases").set(0.0);
    }
}

const MIN_WAIT_MS: u64 = 1;

struct Renewal {
    clock: Arc<dyn Clock>,
    margin_ms: u64,
    lease: Arc<Lease>,
    target: RenewalTarget,
    listener: Arc<dyn RenewalListener>,
}

impl Renewal {
    async fn run(self) {
        loop {
            let expiration = self.lease.expiration();
            if let RenewalTarget::Until(target) = self.target {
                if expiration >= target {
                    debug!(lease = %self.lease.id(), "lease reached its renewal target");
                    return;
                }
            }

            let now = self.clock.now_millis();
            let due = renewal_due(expiration, now, self.margin_ms);
            // Grants already in the past still wait at least a tick.
            let wait = due.saturating_sub(now).max(MIN_WAIT_MS);
            self.clock.sleep(Duration::from_millis(wait)).await;

            let now = self.clock.now_millis();
            let requested = renewal_request(self.lease.requested(), self.target, now);

            match self.lease.registry().remote().renew(self.lease.id(), requested).await {
                Ok(expiration) => {
                    self.lease.extend(expiration);
                    metrics::counter!("beacon_lease_renewals_total").increment(1);
                    debug!(
                        lease = %self.lease.id(),
                        registry = %self.lease.registry().id(),
                        expiration,
                        "lease renewed"
                    );
                }
                Err(err) => {
                    metrics::counter!("beacon_lease_renewal_failures_total").increment(1);
                    warn!(
                        lease = %self.lease.id(),
                        registry = %self.lease.registry().id(),
                        error = %err,
                        "lease renewal failed"
                    );
                    self.listener.on_renewal_failed(&self.lease, &err);
                    return;
                }
            }
        }
    }
}

/// What to ask the registry for: the lease's own request, shortened to
/// whatever is left before a bounded target.
fn renewal_request(requested: LeaseDuration, target: RenewalTarget, now: u64) -> LeaseDuration {
    match target {
        RenewalTarget::Forever => requested,
        RenewalTarget::Until(target) => {
            let remaining = Duration::from_millis(target.saturating_sub(now));
            match requested {
                LeaseDuration::Forever => LeaseDuration::Bounded(remaining),
                LeaseDuration::Bounded(d) => LeaseDuration::Bounded(d.min(remaining)),
            }
        }
    }
}

/// `expiration - margin`, or halfway to expiration when the remaining
/// time is already inside the margin.
fn renewal_due(expiration: u64, now: u64, margin_ms: u64) -> u64 {
    let remaining = expiration.saturating_sub(now);
    if remaining > margin_ms {
        expiration - margin_ms
    } else {
        now + remaining / 2
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
