use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tokio::task::JoinHandle;

use crate::{
    error::{AppError, Result},
    middleware_layer::pipeline::{Call, Stage},
};

/// Per-client-IP token buckets.
///
/// Each IP gets a bucket of `burst` tokens refilled at `per_second`. Buckets
/// are created on first sight and updated atomically per key, so calls
/// from different IPs never serialize on each other.
///
/// Precondition: none; this stage runs first.
/// Postcondition on success: one token was taken from the caller's bucket.
pub struct RateLimiterStage {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl RateLimiterStage {
    /// Creates a limiter giving every client `burst` tokens refilled at
    /// `per_second`.
    ///
    /// # Arguments
    ///
    /// * `per_second` - Refill rate; must be positive and finite.
    /// * `burst` - Bucket capacity; must be at least 1.
    ///
    /// # Returns
    ///
    /// A `Result<Self>`; the refill period `1 / per_second` must be a
    /// representable, non-zero `Duration`.
    pub fn new(per_second: f64, burst: u32) -> Result<Self> {
        if !(per_second.is_finite() && per_second > 0.0) {
            return Err(AppError::Internal(format!("invalid refill rate: {}", per_second)));
        }
        let burst = NonZeroU32::new(burst)
            .ok_or_else(|| AppError::Internal("burst must be at least 1".to_string()))?;
        let period = Duration::try_from_secs_f64(1.0 / per_second)
            .map_err(|e| AppError::Internal(format!("invalid refill rate {}: {}", per_second, e)))?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| AppError::Internal("refill period must be non-zero".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
        })
    }

    /// Takes one token from `ip`'s bucket if one is available.
    pub fn allow(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Number of clients currently holding a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Drops buckets that have refilled completely; they carry no state a
    /// fresh bucket would not.
    pub fn sweep(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        before.saturating_sub(self.limiter.len())
    }

    /// Runs [`RateLimiterStage::sweep`] every `every` until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let stage = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = stage.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = stage.tracked_clients(), "🧹 Idle rate buckets evicted");
                }
            }
        })
    }
}

#[async_trait]
impl Stage for RateLimiterStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn admit(&self, call: &mut Call) -> Result<()> {
        let Some(peer) = call.peer() else {
            tracing::error!(method = %call.method(), "could not resolve peer address");
            return Err(AppError::Internal("could not resolve peer address".to_string()));
        };

        if self.allow(peer.ip()) {
            Ok(())
        } else {
            tracing::warn!(ip = %peer.ip(), method = %call.method(), "❌ Rate limit exceeded");
            Err(AppError::ResourceExhausted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn burst_plus_one_rejects_exactly_once() {
        let limiter = RateLimiterStage::new(1.0, 5).unwrap();
        let rejected = (0..6).filter(|_| !limiter.allow(ip(1))).count();
        assert_eq!(rejected, 1);
    }

    #[test]
    fn refills_one_token_per_period() {
        let limiter = RateLimiterStage::new(20.0, 3).unwrap();
        for _ in 0..3 {
            assert!(limiter.allow(ip(1)));
        }
        assert!(!limiter.allow(ip(1)));

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = RateLimiterStage::new(1.0, 1).unwrap();
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
        assert!(limiter.allow(ip(2)));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn sweep_evicts_refilled_buckets_only() {
        let limiter = RateLimiterStage::new(50.0, 2).unwrap();
        limiter.allow(ip(1));
        limiter.allow(ip(1));
        assert_eq!(limiter.tracked_clients(), 1);

        // 2 tokens at 50/s are back after 40ms.
        std::thread::sleep(Duration::from_millis(80));
        limiter.allow(ip(2));

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[tokio::test]
    async fn stage_rejects_unknown_peer() {
        let stage = RateLimiterStage::new(5.0, 10).unwrap();
        let mut call = Call::new("/forum.v1.Health/Check");
        assert!(matches!(stage.admit(&mut call).await, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn stage_throttles_by_peer_ip_not_port() {
        let stage = RateLimiterStage::new(1.0, 1).unwrap();
        let a = SocketAddr::new(ip(9), 40000);
        let b = SocketAddr::new(ip(9), 40001);

        let mut first = Call::new("/forum.v1.Health/Check").with_peer(a);
        assert!(stage.admit(&mut first).await.is_ok());
        let mut second = Call::new("/forum.v1.Health/Check").with_peer(b);
        assert!(matches!(stage.admit(&mut second).await, Err(AppError::ResourceExhausted)));
    }

    #[test]
    fn rejects_bad_quota() {
        assert!(RateLimiterStage::new(0.0, 5).is_err());
        assert!(RateLimiterStage::new(5.0, 0).is_err());
    }

    #[test]
    fn rejects_rates_whose_period_does_not_fit() {
        assert!(matches!(RateLimiterStage::new(1e-30, 5), Err(AppError::Internal(_))));
        assert!(matches!(RateLimiterStage::new(1e30, 5), Err(AppError::Internal(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_from_one_ip_share_one_bucket() {
        const BURST: u32 = 16;
        let stage = Arc::new(RateLimiterStage::new(0.01, BURST).unwrap());
        let barrier = Arc::new(tokio::sync::Barrier::new(BURST as usize + 1));
        let peer = SocketAddr::new(ip(77), 5000);

        let handles: Vec<_> = (0..=BURST)
            .map(|_| {
                let stage = stage.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    let mut call = Call::new("/forum.v1.Health/Check").with_peer(peer);
                    stage.admit(&mut call).await
                })
            })
            .collect();

        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => {}
                Err(AppError::ResourceExhausted) => exhausted += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(exhausted, 1);
    }
}
