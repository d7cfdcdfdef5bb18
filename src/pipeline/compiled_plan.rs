use crate::pipeline::id::KeySlot;

/// Resolved store slots for one binding.
#[derive(Debug, Clone, Default)]
pub struct PlanStep {
    /// Input key slots, in binding order
    pub inputs: Vec<Option<KeySlot>>,

    /// Output key slots, in binding order
    pub outputs: Vec<KeySlot>,

    /// Run-condition key slot, if the binding is gated
    pub gate: Option<KeySlot>,
}

/// Execution plan for a vehicle: one resolved step per binding, in
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct CompiledPlan {
    /// One step per binding, indexed like the bindings
    pub steps: Vec<PlanStep>,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Total number of bindings
    pub total_parts: usize,

    /// Bindings running their own worker
    pub threaded_parts: usize,

    /// Bindings with a run condition
    pub gated_parts: usize,

    /// Distinct keys in the store
    pub keys: usize,

    /// Lock groups in the store
    pub key_groups: usize,

    /// Keys read by some binding but never written nor seeded
    pub unproduced_keys: Vec<String>,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    /// Check if the plan has any steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
