//! Exclusive CPU reservation for benchmark execution.

use tracing::{debug, warn};

use benchbot_core::{CommandSpec, Node, Result};

/// An exclusive CPU reservation on one node.
///
/// Prefers `cset shield`, which migrates other tasks off the reserved CPU;
/// when `cset` is unavailable the reservation degrades to process pinning
/// only (the pipeline pins the harness with `taskset` either way). Must be
/// released after execution, success or failure.
pub struct CpuShield {
    cpu: u32,
    via_cset: bool,
}

impl CpuShield {
    /// Reserve the node's benchmark CPU.
    pub async fn acquire(node: &dyn Node) -> Result<Self> {
        let cpu = node.cpu();
        let spec = CommandSpec::new("cset").args([
            "shield".to_string(),
            "-c".to_string(),
            cpu.to_string(),
            "-k".to_string(),
            "on".to_string(),
        ]);

        match node.run(spec).await {
            Ok(outcome) if outcome.success() => {
                debug!(node = %node.name(), cpu, "CPU shield up");
                Ok(Self {
                    cpu,
                    via_cset: true,
                })
            }
            Ok(outcome) => {
                warn!(node = %node.name(), cpu, exit = ?outcome.exit_code,
                      "cset shield failed, falling back to pinning only");
                Ok(Self {
                    cpu,
                    via_cset: false,
                })
            }
            Err(e) => {
                warn!(node = %node.name(), cpu, error = %e,
                      "cset unavailable, falling back to pinning only");
                Ok(Self {
                    cpu,
                    via_cset: false,
                })
            }
        }
    }

    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    /// Tear the shield down. Failures are logged, not propagated: the
    /// reservation must never outlive the execution it protected.
    pub async fn release(self, node: &dyn Node) {
        if !self.via_cset {
            return;
        }
        let spec = CommandSpec::new("cset").args(["shield", "--reset"]);
        match node.run(spec).await {
            Ok(outcome) if outcome.success() => {
                debug!(node = %node.name(), cpu = self.cpu, "CPU shield down");
            }
            Ok(outcome) => {
                warn!(node = %node.name(), exit = ?outcome.exit_code, "cset shield reset failed");
            }
            Err(e) => {
                warn!(node = %node.name(), error = %e, "cset shield reset failed");
            }
        }
    }
}
