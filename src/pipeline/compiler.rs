use super::binding::PartBinding;
use super::compiled_plan::{CompiledPlan, PlanStats, PlanStep};
use super::error::{PipelineError, PipelineResult};
use super::part::Arity;
use super::store::{SharedStore, StoreLayout};
use std::collections::HashSet;

/// Validates bindings as they are registered and compiles them into a store
/// layout plus an execution plan when the vehicle starts.
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Check a candidate binding against the ones already accepted.
    ///
    /// Returns the input keys that no earlier binding produces and no seed
    /// provides. Those are legal (the consumer sees the previous tick's value,
    /// or `absent`), but usually point at a registration order mistake.
    ///
    /// # Errors
    /// * `Configuration` for empty or repeated keys
    /// * `ArityMismatch` when the part declares an arity the binding does not match
    /// * `DuplicateOutput` when an earlier binding already writes one of the outputs
    pub fn validate(
        accepted: &[PartBinding],
        candidate: &PartBinding,
        declared: Option<Arity>,
        seeded: &HashSet<String>,
    ) -> PipelineResult<Vec<String>> {
        let label = &candidate.label;

        if candidate.keys().any(str::is_empty) {
            return Err(PipelineError::Configuration {
                binding: label.clone(),
                message: "key names must not be empty".to_string(),
            });
        }

        let mut own_outputs = HashSet::new();
        for key in &candidate.outputs {
            if !own_outputs.insert(key.as_str()) {
                return Err(PipelineError::Configuration {
                    binding: label.clone(),
                    message: format!("output key '{}' is listed twice", key),
                });
            }
        }

        if let Some(arity) = declared {
            if arity.inputs != candidate.inputs.len() {
                return Err(PipelineError::ArityMismatch {
                    binding: label.clone(),
                    expected: arity.inputs,
                    found: candidate.inputs.len(),
                });
            }
            if arity.outputs != candidate.outputs.len() {
                return Err(PipelineError::ArityMismatch {
                    binding: label.clone(),
                    expected: arity.outputs,
                    found: candidate.outputs.len(),
                });
            }
        }

        for earlier in accepted {
            if let Some(key) = earlier
                .outputs
                .iter()
                .find(|k| own_outputs.contains(k.as_str()))
            {
                return Err(PipelineError::DuplicateOutput {
                    key: key.clone(),
                    first: earlier.label.clone(),
                    second: label.clone(),
                });
            }
        }

        let produced: HashSet<&str> = accepted
            .iter()
            .flat_map(|b| b.outputs.iter().map(String::as_str))
            .collect();

        let forward_refs = candidate
            .inputs
            .iter()
            .chain(candidate.run_condition.iter())
            .filter(|key| !produced.contains(key.as_str()) && !seeded.contains(*key))
            .cloned()
            .collect();

        Ok(forward_refs)
    }

    /// Compile the accepted bindings into a store and a plan.
    ///
    /// Each binding's outputs form one lock group, so a publish touches one
    /// lock. Keys that are only read (or only seeded) get single-key groups.
    pub fn compile<'a>(
        bindings: &[PartBinding],
        seeded: impl IntoIterator<Item = &'a str>,
    ) -> (SharedStore, CompiledPlan) {
        let start_time = std::time::Instant::now();

        let mut layout = StoreLayout::new();
        for binding in bindings {
            layout.group(&binding.outputs);
        }

        let seeded: HashSet<&str> = seeded.into_iter().collect();
        let mut unproduced = Vec::new();
        for binding in bindings {
            for key in binding
                .inputs
                .iter()
                .chain(binding.run_condition.iter())
            {
                if layout.slot(key).is_none() && !seeded.contains(key.as_str()) {
                    unproduced.push(key.clone());
                }
                layout.key(key);
            }
        }
        let mut seeded: Vec<&str> = seeded.into_iter().collect();
        seeded.sort_unstable();
        for key in seeded {
            layout.key(key);
        }

        let store = layout.build();

        let steps = bindings
            .iter()
            .map(|binding| PlanStep {
                inputs: binding.inputs.iter().map(|k| store.slot(k)).collect(),
                outputs: binding
                    .outputs
                    .iter()
                    .filter_map(|k| store.slot(k))
                    .collect(),
                gate: binding.run_condition.as_deref().and_then(|k| store.slot(k)),
            })
            .collect();

        let stats = PlanStats {
            total_parts: bindings.len(),
            threaded_parts: bindings
                .iter()
                .filter(|b| b.mode == super::binding::ExecutionMode::Threaded)
                .count(),
            gated_parts: bindings.iter().filter(|b| b.run_condition.is_some()).count(),
            keys: store.len(),
            key_groups: store.group_count(),
            unproduced_keys: unproduced,
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        (store, CompiledPlan { steps, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::binding::{Binding, ExecutionMode};
    use crate::pipeline::id::PartId;

    fn bind(id: u32, inputs: &[&str], outputs: &[&str]) -> PartBinding {
        Binding::new()
            .inputs(inputs.iter().copied())
            .outputs(outputs.iter().copied())
            .into_part_binding(PartId(id), &format!("part{}", id), ExecutionMode::Synchronous)
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let first = bind(0, &[], &["user/angle", "user/throttle"]);
        let second = bind(1, &[], &["pilot/angle", "user/throttle"]);
        let err = PipelineCompiler::validate(&[first], &second, None, &HashSet::new()).unwrap_err();
        match err {
            PipelineError::DuplicateOutput { key, first, second } => {
                assert_eq!(key, "user/throttle");
                assert_eq!(first.id, PartId(0));
                assert_eq!(second.id, PartId(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_repeated_own_output_rejected() {
        let binding = bind(0, &[], &["x", "x"]);
        let err = PipelineCompiler::validate(&[], &binding, None, &HashSet::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }

    #[test]
    fn test_empty_key_rejected() {
        let binding = bind(0, &[""], &["x"]);
        assert!(PipelineCompiler::validate(&[], &binding, None, &HashSet::new()).is_err());
    }

    #[test]
    fn test_declared_arity_checked() {
        let binding = bind(0, &["a"], &["b", "c"]);
        let ok = PipelineCompiler::validate(&[], &binding, Some(Arity::new(1, 2)), &HashSet::new());
        assert!(ok.is_ok());

        let err = PipelineCompiler::validate(&[], &binding, Some(Arity::new(1, 1)), &HashSet::new())
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::ArityMismatch {
                binding: binding.label.clone(),
                expected: 1,
                found: 2,
            }
        );
    }

    #[test]
    fn test_forward_references_reported() {
        let camera = bind(0, &[], &["cam/image"]);
        let pilot = Binding::new()
            .inputs(["cam/image", "imu/accel"])
            .outputs(["pilot/angle"])
            .run_condition("run_pilot")
            .into_part_binding(PartId(1), "pilot", ExecutionMode::Synchronous);

        let seeded: HashSet<String> = ["run_pilot".to_string()].into_iter().collect();
        let refs = PipelineCompiler::validate(&[camera], &pilot, None, &seeded).unwrap();
        assert_eq!(refs, vec!["imu/accel".to_string()]);
    }

    #[test]
    fn test_compile_groups_outputs_per_binding() {
        let bindings = vec![
            bind(0, &[], &["cam/image", "cam/stamp"]),
            Binding::new()
                .inputs(["cam/image"])
                .outputs(["pilot/angle"])
                .run_condition("run_pilot")
                .into_part_binding(PartId(1), "pilot", ExecutionMode::Threaded),
        ];

        let (store, plan) = PipelineCompiler::compile(&bindings, ["user/mode"]);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.stats.total_parts, 2);
        assert_eq!(plan.stats.threaded_parts, 1);
        assert_eq!(plan.stats.gated_parts, 1);
        assert_eq!(plan.stats.unproduced_keys, vec!["run_pilot".to_string()]);
        assert_eq!(store.len(), 5);
        // cam group, pilot group, run_pilot, user/mode
        assert_eq!(store.group_count(), 4);

        let cam = &plan.steps[0];
        assert_eq!(cam.outputs[0].group(), cam.outputs[1].group());
        let pilot = &plan.steps[1];
        assert_eq!(pilot.inputs, vec![store.slot("cam/image")]);
        assert!(pilot.gate.is_some());
        assert_ne!(pilot.gate.map(|g| g.group()), Some(cam.outputs[0].group()));
    }
}
