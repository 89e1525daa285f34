//! # Prometheus Metrics
//!
//! Counters and gauges for a scenario run, rendered in the Prometheus text
//! exposition format at the end of `keel run --metrics`.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Holds all Prometheus metric handles for a run.
#[derive(Clone)]
pub struct VaultMetrics {
    registry: Registry,
    /// Committed deposit batches.
    pub deposits_total: IntCounter,
    /// Committed withdrawal batches.
    pub withdrawals_total: IntCounter,
    /// Margin increases the vault admitted.
    pub margin_admitted_total: IntCounter,
    /// Margin increases the vault declined.
    pub margin_refused_total: IntCounter,
    /// Vaults handed to a liquidator.
    pub liquidations_total: IntCounter,
    /// Operations rejected by the vault, by error kind.
    pub rejected_operations_total: IntCounterVec,
    /// Last observed collateral value in the base currency.
    pub collateral_value: Gauge,
    /// Last observed epoch.
    pub life: IntGauge,
}

impl VaultMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("keel".into()), None)?;

        let deposits_total = IntCounter::new("deposits_total", "Committed deposit batches")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Committed withdrawal batches")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let margin_admitted_total = IntCounter::new(
            "margin_admitted_total",
            "Margin increases admitted by the vault",
        )?;
        registry.register(Box::new(margin_admitted_total.clone()))?;

        let margin_refused_total = IntCounter::new(
            "margin_refused_total",
            "Margin increases declined by the vault",
        )?;
        registry.register(Box::new(margin_refused_total.clone()))?;

        let liquidations_total =
            IntCounter::new("liquidations_total", "Vaults handed to a liquidator")?;
        registry.register(Box::new(liquidations_total.clone()))?;

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rejected_operations_total",
                "Vault operations rejected, by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_operations_total.clone()))?;

        let collateral_value = Gauge::new(
            "collateral_value",
            "Last observed collateral value in the base currency",
        )?;
        registry.register(Box::new(collateral_value.clone()))?;

        let life = IntGauge::new("life", "Last observed liquidation epoch")?;
        registry.register(Box::new(life.clone()))?;

        Ok(Self {
            registry,
            deposits_total,
            withdrawals_total,
            margin_admitted_total,
            margin_refused_total,
            liquidations_total,
            rejected_operations_total,
            collateral_value,
            life,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_namespace() {
        let metrics = VaultMetrics::new().unwrap();
        metrics.deposits_total.inc();
        metrics
            .rejected_operations_total
            .with_label_values(&["health"])
            .inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("keel_deposits_total 1"));
        assert!(text.contains("keel_rejected_operations_total{kind=\"health\"} 1"));
    }
}
