//! Metric components: the smallest mergeable units of statistical state.
//!
//! Every component knows its wire type id and how to convert itself to and from a
//! [`MetricComponentMessage`]. Merging never mutates an operand.

use std::fmt::Debug;

use crate::error::{ProfileError, Result};
use crate::metrics::kll_sketch::KllSketch;
use crate::wire::{metric_component_message::Value as WireValue, MetricComponentMessage};

/// Wire conversion shared by all component types.
pub trait MetricComponent: Clone + Debug + PartialEq + Send + Sync + Sized {
    /// Type id written next to the value.
    const TYPE_ID: u32;

    fn to_message(&self) -> MetricComponentMessage;

    /// Decodes a component, rejecting messages written for a different component type.
    fn from_message(msg: &MetricComponentMessage) -> Result<Self>;
}

fn check_type_id(msg: &MetricComponentMessage, expected: u32) -> Result<()> {
    if msg.type_id != expected {
        return Err(ProfileError::deserialization(format!(
            "unexpected component type id {}, expected {expected}",
            msg.type_id
        )));
    }
    Ok(())
}

fn integral_value(msg: &MetricComponentMessage, expected: u32) -> Result<i64> {
    check_type_id(msg, expected)?;
    match msg.value {
        Some(WireValue::N(n)) => Ok(n),
        // proto3 drops default scalars, so a zero counter may arrive without a value.
        None => Ok(0),
        Some(_) => Err(ProfileError::deserialization(format!(
            "component with type id {expected} does not hold an integral value"
        ))),
    }
}

macro_rules! integral_component {
    ($(#[$meta:meta])* $name:ident, $type_id:expr, $zero:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self($zero)
            }
        }

        impl MetricComponent for $name {
            const TYPE_ID: u32 = $type_id;

            fn to_message(&self) -> MetricComponentMessage {
                MetricComponentMessage {
                    type_id: Self::TYPE_ID,
                    value: Some(WireValue::N(self.0)),
                }
            }

            fn from_message(msg: &MetricComponentMessage) -> Result<Self> {
                if msg.value.is_none() {
                    check_type_id(msg, Self::TYPE_ID)?;
                    return Ok(Self::default());
                }
                integral_value(msg, Self::TYPE_ID).map(Self)
            }
        }
    };
}

integral_component!(
    /// A summing counter. Merge is exact addition; exceeding `i64::MAX` is an error.
    IntegralComponent,
    0,
    0
);

integral_component!(
    /// A running minimum over integers. The zero value is `i64::MAX`.
    MinIntegralComponent,
    1,
    i64::MAX
);

integral_component!(
    /// A running maximum over integers. The zero value is `i64::MIN`.
    MaxIntegralComponent,
    2,
    i64::MIN
);

impl IntegralComponent {
    /// Adds `delta`, returning `None` on overflow.
    pub fn checked_add(&self, delta: usize) -> Option<Self> {
        let delta = i64::try_from(delta).ok()?;
        self.0.checked_add(delta).map(Self)
    }

    /// Merges by addition, returning `None` on overflow.
    pub fn checked_merge(&self, other: &Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl MinIntegralComponent {
    pub fn merge(&self, other: &Self) -> Self {
        Self(self.0.min(other.0))
    }

    pub fn update(&mut self, value: i64) {
        self.0 = self.0.min(value);
    }
}

impl MaxIntegralComponent {
    pub fn merge(&self, other: &Self) -> Self {
        Self(self.0.max(other.0))
    }

    pub fn update(&mut self, value: i64) {
        self.0 = self.0.max(value);
    }
}

/// A floating-point component.
///
/// There is no generic merge: the owning metric decides how its fractional components
/// combine (a mean is weighted by counts, for example).
#[derive(Debug, Clone, Copy, Default)]
pub struct FractionalComponent(f64);

/// Bitwise, so non-finite values (an `m2` of `NaN` after infinite input) equal themselves
/// and a decoded component always equals the one that was encoded.
impl PartialEq for FractionalComponent {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl FractionalComponent {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl MetricComponent for FractionalComponent {
    const TYPE_ID: u32 = 3;

    fn to_message(&self) -> MetricComponentMessage {
        MetricComponentMessage {
            type_id: Self::TYPE_ID,
            value: Some(WireValue::D(self.0)),
        }
    }

    fn from_message(msg: &MetricComponentMessage) -> Result<Self> {
        check_type_id(msg, Self::TYPE_ID)?;
        match msg.value {
            Some(WireValue::D(d)) => Ok(Self(d)),
            None => Ok(Self(0.0)),
            Some(_) => Err(ProfileError::deserialization(
                "fractional component does not hold a double value",
            )),
        }
    }
}

/// An approximate-quantile sketch, treated as opaque mergeable state.
#[derive(Debug, Clone, PartialEq)]
pub struct KllComponent(KllSketch);

impl KllComponent {
    pub fn new(sketch: KllSketch) -> Self {
        Self(sketch)
    }

    /// An empty sketch with accuracy parameter `k`.
    pub fn empty(k: usize) -> Result<Self> {
        KllSketch::new(k).map(Self)
    }

    pub fn sketch(&self) -> &KllSketch {
        &self.0
    }

    pub fn update(&mut self, value: f64) {
        self.0.update(value);
    }

    pub fn merge(&self, other: &Self) -> Result<Self> {
        let mut merged = self.0.clone();
        merged.merge(&other.0)?;
        Ok(Self(merged))
    }
}

impl MetricComponent for KllComponent {
    const TYPE_ID: u32 = 5;

    fn to_message(&self) -> MetricComponentMessage {
        MetricComponentMessage {
            type_id: Self::TYPE_ID,
            value: Some(WireValue::Kll(self.0.to_message())),
        }
    }

    fn from_message(msg: &MetricComponentMessage) -> Result<Self> {
        check_type_id(msg, Self::TYPE_ID)?;
        match &msg.value {
            Some(WireValue::Kll(kll)) => KllSketch::from_message(kll).map(Self),
            _ => Err(ProfileError::deserialization(
                "kll component does not hold a sketch",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_merge_is_exact_and_checked() {
        let a = IntegralComponent::new(40);
        let b = IntegralComponent::new(2);
        assert_eq!(a.checked_merge(&b).unwrap().value(), 42);
        assert_eq!(a.checked_add(3).unwrap().value(), 43);

        let max = IntegralComponent::new(i64::MAX);
        assert!(max.checked_merge(&IntegralComponent::new(1)).is_none());
        assert!(max.checked_add(1).is_none());
    }

    #[test]
    fn test_extrema_zero_values_are_identities() {
        let min = MinIntegralComponent::new(-5);
        assert_eq!(min.merge(&MinIntegralComponent::default()), min);

        let max = MaxIntegralComponent::new(17);
        assert_eq!(MaxIntegralComponent::default().merge(&max), max);

        let mut running = MaxIntegralComponent::default();
        for v in [3, -1, 9, 2] {
            running.update(v);
        }
        assert_eq!(running.value(), 9);
    }

    #[test]
    fn test_message_round_trip_keeps_type_id() {
        let component = MinIntegralComponent::new(-3);
        let msg = component.to_message();
        assert_eq!(msg.type_id, 1);
        assert_eq!(MinIntegralComponent::from_message(&msg).unwrap(), component);

        let fractional = FractionalComponent::new(2.5);
        assert_eq!(
            FractionalComponent::from_message(&fractional.to_message()).unwrap(),
            fractional
        );
    }

    #[test]
    fn test_non_finite_fractional_equals_itself() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0] {
            let component = FractionalComponent::new(value);
            assert_eq!(component, component);
            assert_eq!(
                FractionalComponent::from_message(&component.to_message()).unwrap(),
                component
            );
        }
        assert_ne!(FractionalComponent::new(0.0), FractionalComponent::new(-0.0));
    }

    #[test]
    fn test_mismatched_message_is_rejected() {
        let msg = IntegralComponent::new(1).to_message();
        let err = MaxIntegralComponent::from_message(&msg).unwrap_err();
        assert!(matches!(err, ProfileError::Deserialization(_)));

        let bad_variant = MetricComponentMessage {
            type_id: 0,
            value: Some(WireValue::D(1.0)),
        };
        assert!(IntegralComponent::from_message(&bad_variant).is_err());

        let no_sketch = MetricComponentMessage {
            type_id: 5,
            value: None,
        };
        assert!(KllComponent::from_message(&no_sketch).is_err());
    }

    #[test]
    fn test_empty_value_decodes_to_zero() {
        let msg = MetricComponentMessage {
            type_id: 0,
            value: None,
        };
        assert_eq!(IntegralComponent::from_message(&msg).unwrap().value(), 0);
    }

    #[test]
    fn test_kll_component_merge() {
        let mut a = KllComponent::empty(32).unwrap();
        let mut b = KllComponent::empty(32).unwrap();
        a.update(1.0);
        b.update(5.0);

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.sketch().count(), 2);
        assert_eq!(merged.sketch().max(), Some(5.0));
        // Operands are untouched.
        assert_eq!(a.sketch().count(), 1);

        let decoded = KllComponent::from_message(&merged.to_message()).unwrap();
        assert_eq!(decoded, merged);
    }
}
