//! The validity oracle (`spec.md` §4.4, `SPEC_FULL.md` §4.4a).
//!
//! Framework back-ends that actually execute an operator are external
//! collaborators (`spec.md` §1); this module only defines the trait
//! boundary and the `DEVICE`-selected built-in backends used by tests and
//! local experimentation.

use std::collections::HashMap;

use crate::operator_instance::OperatorInstance;
use crate::symbol::SymbolAssignment;

/// The sum-type result of probing one operator under one assignment
/// (`spec.md` §9: "Probing an operator returns a sum result").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The operator executed and produced outputs.
    Ok {
        /// The concrete input tuple that was probed.
        inputs: Vec<i64>,
        /// The concrete output tuple the operator produced.
        outputs: Vec<i64>,
    },
    /// The operator raised during execution.
    Failed {
        /// The concrete input tuple that was probed.
        inputs: Vec<i64>,
    },
    /// The probe could not be categorised (e.g. a non-`OracleError`
    /// exception, or an assignment outside the oracle's domain).
    Uncategorised,
}

/// `validity_oracle(OI, input_assignment) -> (inputs, outputs|⊥)`
/// (`spec.md` §4.4): executes the operator under a concrete assignment
/// and reports shapes.
pub trait ValidityOracle: Send + Sync {
    /// Probe `oi` under `assignment`.
    fn probe(&self, oi: &OperatorInstance, assignment: &SymbolAssignment) -> ProbeOutcome;
}

/// The oracle backend selected by the `DEVICE` environment variable
/// (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// CPU execution backend.
    Cpu,
    /// CUDA execution backend.
    Cuda,
}

impl Device {
    /// Read `DEVICE` from the environment, defaulting to [`Device::Cpu`]
    /// when unset or unrecognised.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("DEVICE").as_deref() {
            Ok("cuda") => Device::Cuda,
            _ => Device::Cpu,
        }
    }
}

/// An in-memory fixture oracle keyed by the exact input tuple, for tests
/// and for replaying a previously recorded corpus without a real
/// framework backend.
#[derive(Debug, Clone, Default)]
pub struct FixtureOracle {
    responses: HashMap<Vec<i64>, Option<Vec<i64>>>,
}

impl FixtureOracle {
    /// An oracle with no canned responses (every probe is
    /// [`ProbeOutcome::Uncategorised`]).
    #[must_use]
    pub fn new() -> Self {
        FixtureOracle::default()
    }

    /// Record that probing with `inputs` should succeed with `outputs`.
    pub fn succeed(&mut self, inputs: Vec<i64>, outputs: Vec<i64>) -> &mut Self {
        self.responses.insert(inputs, Some(outputs));
        self
    }

    /// Record that probing with `inputs` should fail.
    pub fn fail(&mut self, inputs: Vec<i64>) -> &mut Self {
        self.responses.insert(inputs, None);
        self
    }
}

impl ValidityOracle for FixtureOracle {
    fn probe(&self, _oi: &OperatorInstance, assignment: &SymbolAssignment) -> ProbeOutcome {
        let inputs = assignment.as_slice().to_vec();
        match self.responses.get(&inputs) {
            Some(Some(outputs)) => ProbeOutcome::Ok {
                inputs,
                outputs: outputs.clone(),
            },
            Some(None) => ProbeOutcome::Failed { inputs },
            None => ProbeOutcome::Uncategorised,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_oracle_returns_recorded_response() {
        let mut oracle = FixtureOracle::new();
        oracle.succeed(vec![2, 3], vec![2, 3]);
        oracle.fail(vec![-1, 3]);

        let oi_args = crate::operator_instance::OperatorInstance::new(
            "relu",
            0,
            vec![],
            vec![],
            Default::default(),
            Default::default(),
        )
        .unwrap();

        assert_eq!(
            oracle.probe(&oi_args, &SymbolAssignment::new(vec![2, 3])),
            ProbeOutcome::Ok {
                inputs: vec![2, 3],
                outputs: vec![2, 3]
            }
        );
        assert_eq!(
            oracle.probe(&oi_args, &SymbolAssignment::new(vec![-1, 3])),
            ProbeOutcome::Failed { inputs: vec![-1, 3] }
        );
        assert_eq!(
            oracle.probe(&oi_args, &SymbolAssignment::new(vec![9, 9])),
            ProbeOutcome::Uncategorised
        );
    }

    #[test]
    fn device_defaults_to_cpu() {
        std::env::remove_var("DEVICE");
        assert_eq!(Device::from_env(), Device::Cpu);
    }
}
