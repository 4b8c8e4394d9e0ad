use at_voucher::workflows::invoices::BillingPeriod;
use at_voucher::workflows::Services;
use chrono::{DateTime, Datelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Calendar month that was last invoiced, as `(year, month)`.
type InvoicedMonth = (i32, u32);

/// Runs the voucher sweep every `interval`, and bills the previous month once per new month.
pub(crate) async fn run_periodic(services: Arc<Services>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut last_invoiced: Option<InvoicedMonth> = None;
    info!(interval_secs = interval.as_secs(), "scheduled jobs started");
    loop {
        ticker.tick().await;
        last_invoiced = run_once(&services, Utc::now(), last_invoiced);
    }
}

pub(crate) fn run_once(
    services: &Services,
    now: DateTime<Utc>,
    last_invoiced: Option<InvoicedMonth>,
) -> Option<InvoicedMonth> {
    let month = (now.year(), now.month());
    let period = (last_invoiced != Some(month)).then(|| BillingPeriod::previous_month(now));
    match services.run_scheduled(now, period) {
        Ok(run) => {
            if !run.vouchers.expired.is_empty() || !run.invoices.is_empty() {
                info!(
                    expired = run.vouchers.expired.len(),
                    invoices = run.invoices.len(),
                    "scheduled run changed records"
                );
            }
            if period.is_some() {
                Some(month)
            } else {
                last_invoiced
            }
        }
        Err(err) => {
            error!(error = %err, "scheduled run failed");
            last_invoiced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_voucher::config::ProgramConfig;
    use at_voucher::store::MemoryStore;
    use at_voucher::workflows::notifications::NotificationQueue;
    use chrono::TimeZone;

    fn services() -> Services {
        let (queue, _receiver) = NotificationQueue::channel();
        Services::new(
            Arc::new(MemoryStore::default()),
            &ProgramConfig::default(),
            "secret",
            queue,
        )
    }

    #[test]
    fn invoices_once_per_month() {
        let services = services();
        let june = Utc.with_ymd_and_hms(2025, 6, 2, 3, 0, 0).single().expect("valid time");
        let later_in_june = Utc.with_ymd_and_hms(2025, 6, 20, 3, 0, 0).single().expect("valid time");
        let july = Utc.with_ymd_and_hms(2025, 7, 1, 3, 0, 0).single().expect("valid time");

        let first = run_once(&services, june, None);
        assert_eq!(first, Some((2025, 6)));
        assert_eq!(run_once(&services, later_in_june, first), Some((2025, 6)));
        assert_eq!(run_once(&services, july, first), Some((2025, 7)));
    }
}
