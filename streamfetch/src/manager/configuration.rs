use anyhow::bail;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Builder)]
#[builder(default)]
pub struct ManagerConfiguration {
    /// Period between checker firings.
    pub(crate) check_interval: Duration,
    /// Wall-clock cadence at which every pool member is bounced regardless
    /// of health. Zero disables periodic restarts.
    pub(crate) restart_period: Duration,
    /// Restart-on-failure policy applied to directly started fetchers.
    /// Playlist items always get `false`; failover is their recovery path.
    pub(crate) restart_on_failure: bool,
}

impl Default for ManagerConfiguration {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(10_000),
            restart_period: Duration::ZERO,
            restart_on_failure: true,
        }
    }
}

impl ManagerConfiguration {
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn restart_period(&self) -> Duration {
        self.restart_period
    }

    pub fn restart_on_failure(&self) -> bool {
        self.restart_on_failure
    }
}

impl ManagerConfigurationBuilder {
    pub fn build_and_validate(&mut self) -> anyhow::Result<ManagerConfiguration> {
        let c = self.build()?;
        if c.check_interval.is_zero() {
            bail!("Check interval must not be zero!");
        }
        if !c.restart_period.is_zero() && c.restart_period < c.check_interval {
            bail!("Restart period must not be shorter than the check interval!");
        }
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_check_every_ten_seconds_without_restarts() {
        let c = ManagerConfiguration::default();
        assert_eq!(c.check_interval(), Duration::from_millis(10_000));
        assert!(c.restart_period().is_zero());
        assert!(c.restart_on_failure());
    }

    #[test]
    fn validation_rejects_nonsense_cadences() {
        assert!(ManagerConfigurationBuilder::default()
            .check_interval(Duration::ZERO)
            .build_and_validate()
            .is_err());
        assert!(ManagerConfigurationBuilder::default()
            .check_interval(Duration::from_secs(10))
            .restart_period(Duration::from_secs(5))
            .build_and_validate()
            .is_err());
        assert!(ManagerConfigurationBuilder::default()
            .check_interval(Duration::from_secs(10))
            .restart_period(Duration::from_secs(30))
            .build_and_validate()
            .is_ok());
    }
}
