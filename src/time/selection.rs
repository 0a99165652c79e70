//! Runtime scheme selection.
//!
//! Every scheme is compiled in; the application picks one by name and the
//! choice is turned into a [`BoxedScheme`] here.

use std::fmt;
use std::str::FromStr;

use crate::error::TimestepError;
use crate::time::arkode::{ArkodeAdapter, ArkodeConfig};
use crate::time::ars343::Ars343;
use crate::time::explicit::{ForwardEuler, SspRk3};
use crate::time::scheme::BoxedScheme;

/// Which time-stepping scheme drives the model.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SchemeConfig {
    /// Forward Euler on the full tendency
    ForwardEuler,
    /// Three-stage SSP Runge-Kutta on the full tendency
    SspRk3,
    /// Fixed-step ARS(3,4,3) IMEX
    #[default]
    Ars343,
    /// Adaptive additive Runge-Kutta
    Arkode(ArkodeConfig),
}

impl SchemeConfig {
    /// Name accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::ForwardEuler => "forward-euler",
            Self::SspRk3 => "ssp-rk3",
            Self::Ars343 => "ars343",
            Self::Arkode(_) => "arkode",
        }
    }

    /// Construct the scheme.
    pub fn build(&self) -> BoxedScheme {
        match self {
            Self::ForwardEuler => Box::new(ForwardEuler),
            Self::SspRk3 => Box::new(SspRk3),
            Self::Ars343 => Box::new(Ars343::new()),
            Self::Arkode(config) => Box::new(ArkodeAdapter::new(config.clone())),
        }
    }
}

impl fmt::Display for SchemeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchemeConfig {
    type Err = TimestepError;

    /// Parse a scheme name. `"arkode"` selects the default adaptive settings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward-euler" | "euler" => Ok(Self::ForwardEuler),
            "ssp-rk3" | "ssprk3" => Ok(Self::SspRk3),
            "ars343" => Ok(Self::Ars343),
            "arkode" => Ok(Self::Arkode(ArkodeConfig::default())),
            other => Err(TimestepError::Unsupported(format!(
                "unknown time-stepping scheme '{other}' (expected forward-euler, ssp-rk3, ars343 or arkode)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("ars343".parse::<SchemeConfig>().unwrap(), SchemeConfig::Ars343);
        assert_eq!(" SSP-RK3 ".parse::<SchemeConfig>().unwrap(), SchemeConfig::SspRk3);
        assert!(matches!(
            "arkode".parse::<SchemeConfig>().unwrap(),
            SchemeConfig::Arkode(_)
        ));
        let err = "leapfrog".parse::<SchemeConfig>().unwrap_err();
        assert!(matches!(err, TimestepError::Unsupported(_)));
    }

    #[test]
    fn test_build_reports_instances() {
        for (config, name, instances) in [
            (SchemeConfig::ForwardEuler, "forward-euler", 3),
            (SchemeConfig::SspRk3, "ssp-rk3", 4),
            (SchemeConfig::Ars343, "ars343", 10),
            (SchemeConfig::Arkode(ArkodeConfig::default()), "arkode", 50),
        ] {
            let scheme = config.build();
            assert_eq!(scheme.name(), name);
            assert_eq!(config.to_string(), name);
            assert_eq!(scheme.component_data_instances(), instances);
            assert_eq!(scheme.tracer_data_instances(), instances);
        }
    }
}
