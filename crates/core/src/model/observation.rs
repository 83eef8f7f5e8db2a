use thiserror::Error;

use super::Symbol;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ObservationError {
    #[error("confidence must be a finite value in [0, 1], got {0}")]
    InvalidConfidence(f32),
}

/// One classifier response for one submitted frame, already mapped into the
/// catalog vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    label: Symbol,
    confidence: f32,
}

impl Observation {
    /// # Errors
    ///
    /// Returns `ObservationError::InvalidConfidence` if `confidence` is NaN,
    /// infinite, or outside `[0, 1]`.
    pub fn new(label: Symbol, confidence: f32) -> Result<Self, ObservationError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ObservationError::InvalidConfidence(confidence));
        }
        Ok(Self { label, confidence })
    }

    #[must_use]
    pub fn label(&self) -> &Symbol {
        &self.label
    }

    #[must_use]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_bounds_are_inclusive() {
        let label = Symbol::new("hello").unwrap();
        assert!(Observation::new(label.clone(), 0.0).is_ok());
        assert!(Observation::new(label.clone(), 1.0).is_ok());
        assert!(Observation::new(label.clone(), 1.01).is_err());
        assert!(Observation::new(label.clone(), -0.1).is_err());
        assert!(Observation::new(label, f32::NAN).is_err());
    }
}
