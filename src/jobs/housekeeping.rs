// ==================== HOUSEKEEPING ====================
// Jobs periódicos: limpeza dos baldes ociosos do rate limiter e desativação
// de ofertas vencidas

use std::sync::Arc;

use tokio::time::{interval, Duration};

use crate::database::MongoDB;
use crate::middleware::RateLimiter;
use crate::services::offer_service;

const RATE_LIMIT_SWEEP_SECS: u64 = 60;
const OFFER_EXPIRY_SECS: u64 = 3600;

/// Inicia os dois loops em background. Retorna logo após o spawn.
pub fn start(db: MongoDB, limiters: Vec<Arc<RateLimiter>>) {
    log::info!("🧹 Starting housekeeping jobs (rate limits every {}s, offers every {}s)", RATE_LIMIT_SWEEP_SECS, OFFER_EXPIRY_SECS);

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(RATE_LIMIT_SWEEP_SECS));
        loop {
            ticker.tick().await;
            sweep_rate_limits(&limiters);
        }
    });

    tokio::spawn(async move {
        // o primeiro tick é imediato, então ofertas vencidas saem já no startup
        let mut ticker = interval(Duration::from_secs(OFFER_EXPIRY_SECS));
        loop {
            ticker.tick().await;
            match offer_service::deactivate_expired(&db).await {
                Ok(0) => log::debug!("⏰ Offer expiry check: nothing to deactivate"),
                Ok(count) => log::info!("🏷️ Deactivated {} expired offers", count),
                Err(e) => log::error!("❌ Offer expiry check failed: {}", e),
            }
        }
    });
}

fn sweep_rate_limits(limiters: &[Arc<RateLimiter>]) -> usize {
    let mut purged = 0;
    for limiter in limiters {
        let removed = limiter.purge_expired();
        if removed > 0 {
            log::debug!(
                "🧹 Rate limiter '{}': dropped {} idle clients, {} still tracked",
                limiter.scope(),
                removed,
                limiter.tracked()
            );
        }
        purged += removed;
    }
    purged
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::Quota;
    use std::net::IpAddr;
    use std::num::NonZeroU32;
    use std::time::Duration as StdDuration;

    fn fast(scope: &'static str) -> Arc<RateLimiter> {
        let quota = Quota::with_period(StdDuration::from_millis(1))
            .unwrap()
            .allow_burst(NonZeroU32::new(5).unwrap());
        Arc::new(RateLimiter::new(scope, quota))
    }

    #[test]
    fn sweep_clears_idle_clients_of_every_limiter() {
        let auth = fast("auth");
        let api = fast("api");
        auth.check("10.0.0.1".parse::<IpAddr>().unwrap()).unwrap();
        api.check("10.0.0.2".parse::<IpAddr>().unwrap()).unwrap();
        api.check("10.0.0.3".parse::<IpAddr>().unwrap()).unwrap();

        std::thread::sleep(StdDuration::from_millis(20));

        assert_eq!(sweep_rate_limits(&[auth.clone(), api.clone()]), 3);
        assert_eq!(auth.tracked(), 0);
        assert_eq!(api.tracked(), 0);
    }
}
