//! Threshold policy types: operators, tiers, and the crossing test

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::Action;

/// Comparison direction shared by both threshold tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOperator {
    GreaterThan,
    LessThan,
}

impl ThresholdOperator {
    /// Check whether `value` violates a trigger under this operator
    pub fn is_violated(&self, value: f64, trigger: f64) -> bool {
        match self {
            ThresholdOperator::GreaterThan => value > trigger,
            ThresholdOperator::LessThan => value < trigger,
        }
    }

    /// Symbol used in the tier descriptor passed to actions (">80", "<20")
    pub fn symbol(&self) -> &'static str {
        match self {
            ThresholdOperator::GreaterThan => ">",
            ThresholdOperator::LessThan => "<",
        }
    }
}

impl std::str::FromStr for ThresholdOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greater_than" | ">" => Ok(Self::GreaterThan),
            "less_than" | "<" => Ok(Self::LessThan),
            _ => Err(format!("Unknown threshold operator: {}. Use: greater_than or less_than", s)),
        }
    }
}

impl fmt::Display for ThresholdOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdOperator::GreaterThan => write!(f, "greater_than"),
            ThresholdOperator::LessThan => write!(f, "less_than"),
        }
    }
}

/// Severity tier identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Soft,
    Hard,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Soft => "soft",
            Tier::Hard => "hard",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One configured severity tier. Immutable once resolved from config.
#[derive(Clone)]
pub struct ThresholdLevel {
    /// Numeric trigger value
    pub trigger: f64,

    /// Minimum continuous violation before the tier is considered active
    pub sustain: Duration,

    /// Minimum time after a successful action before the tier may act again.
    /// Zero means the action fires at most once per violation episode.
    pub cooldown: Duration,

    /// Action fired when the tier activates
    pub action: Arc<dyn Action>,
}

impl fmt::Debug for ThresholdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdLevel")
            .field("trigger", &self.trigger)
            .field("sustain", &self.sustain)
            .field("cooldown", &self.cooldown)
            .field("action", &self.action.name())
            .finish()
    }
}

/// The resolved pair of optional tiers plus the shared operator
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    pub operator: ThresholdOperator,
    pub soft: Option<ThresholdLevel>,
    pub hard: Option<ThresholdLevel>,
}

impl ThresholdPolicy {
    /// Human-readable descriptor for a tier, e.g. ">80"
    pub fn descriptor(&self, level: &ThresholdLevel) -> String {
        format!("{}{}", self.operator.symbol(), level.trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greater_than_violation() {
        let op = ThresholdOperator::GreaterThan;
        assert!(op.is_violated(90.0, 80.0));
        assert!(!op.is_violated(80.0, 80.0));
        assert!(!op.is_violated(70.0, 80.0));
    }

    #[test]
    fn test_less_than_violation() {
        let op = ThresholdOperator::LessThan;
        assert!(op.is_violated(10.0, 20.0));
        assert!(!op.is_violated(20.0, 20.0));
        assert!(!op.is_violated(30.0, 20.0));
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("greater_than".parse::<ThresholdOperator>().unwrap(), ThresholdOperator::GreaterThan);
        assert_eq!(">".parse::<ThresholdOperator>().unwrap(), ThresholdOperator::GreaterThan);
        assert_eq!("less_than".parse::<ThresholdOperator>().unwrap(), ThresholdOperator::LessThan);
        assert_eq!("<".parse::<ThresholdOperator>().unwrap(), ThresholdOperator::LessThan);
        assert!("between".parse::<ThresholdOperator>().is_err());
    }

    #[test]
    fn test_tier_labels() {
        assert_eq!(Tier::Soft.label(), "soft");
        assert_eq!(Tier::Hard.label(), "hard");
    }
}
