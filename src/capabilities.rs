//! # Worker Capabilities
//!
//! Hardware capability declarations and the binary requirement matcher used
//! by allocation. Hard requirements are pass/fail per field: a worker
//! missing any required field is excluded from the eligible set entirely,
//! never merely penalized.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{MarketError, MarketResult};

/// Named hardware feature flags.
///
/// Stored as a single bitfield on-ledger; every flag has an explicit named
/// constant here so no magic integers leak into matching logic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityFlags(u64);

impl CapabilityFlags {
    pub const NONE: CapabilityFlags = CapabilityFlags(0);
    pub const CUDA: CapabilityFlags = CapabilityFlags(1 << 0);
    pub const OPENCL: CapabilityFlags = CapabilityFlags(1 << 1);
    pub const FP16: CapabilityFlags = CapabilityFlags(1 << 2);
    pub const INT8: CapabilityFlags = CapabilityFlags(1 << 3);
    pub const NVLINK: CapabilityFlags = CapabilityFlags(1 << 4);
    pub const INFINIBAND: CapabilityFlags = CapabilityFlags(1 << 5);
    pub const TENSOR_CORES: CapabilityFlags = CapabilityFlags(1 << 6);
    pub const MULTI_GPU: CapabilityFlags = CapabilityFlags(1 << 7);
    pub const TEE: CapabilityFlags = CapabilityFlags(1 << 8);
    pub const AVX512: CapabilityFlags = CapabilityFlags(1 << 9);

    const ALL_KNOWN: [(CapabilityFlags, &'static str); 10] = [
        (Self::CUDA, "cuda"),
        (Self::OPENCL, "opencl"),
        (Self::FP16, "fp16"),
        (Self::INT8, "int8"),
        (Self::NVLINK, "nvlink"),
        (Self::INFINIBAND, "infiniband"),
        (Self::TENSOR_CORES, "tensor-cores"),
        (Self::MULTI_GPU, "multi-gpu"),
        (Self::TEE, "tee"),
        (Self::AVX512, "avx512"),
    ];

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is also set in `self`
    pub fn contains(&self, other: CapabilityFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CapabilityFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CapabilityFlags) {
        self.0 &= !other.0;
    }

    pub fn union(self, other: CapabilityFlags) -> CapabilityFlags {
        CapabilityFlags(self.0 | other.0)
    }

    /// Names of the set flags, in declaration order
    pub fn names(&self) -> Vec<&'static str> {
        Self::ALL_KNOWN
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for CapabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

/// Hardware facts declared by a worker at registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCapabilities {
    pub gpu_memory_gb: u32,
    pub cpu_cores: u32,
    pub ram_gb: u32,
    pub storage_gb: u32,
    pub bandwidth_mbps: u32,
    pub flags: CapabilityFlags,
    pub gpu_model: String,
    pub cpu_model: String,
}

impl WorkerCapabilities {
    /// Registration-time validation: all numeric fields must be positive.
    pub fn validate(&self) -> MarketResult<()> {
        let fields = [
            ("gpu_memory_gb", self.gpu_memory_gb),
            ("cpu_cores", self.cpu_cores),
            ("ram_gb", self.ram_gb),
            ("storage_gb", self.storage_gb),
            ("bandwidth_mbps", self.bandwidth_mbps),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(MarketError::InvalidArgument(format!(
                    "capability field {} must be > 0",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Minimum hardware a job demands from its worker.
///
/// Every populated field is a hard requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRequirements {
    pub min_gpu_memory_gb: u32,
    pub min_cpu_cores: u32,
    pub min_ram_gb: u32,
    pub min_storage_gb: u32,
    pub min_bandwidth_mbps: u32,
    pub required_flags: CapabilityFlags,
}

impl ComputeRequirements {
    /// Binary pass/fail check across every required field
    pub fn meets(&self, caps: &WorkerCapabilities) -> bool {
        self.first_mismatch(caps).is_none()
    }

    /// The first unmet requirement, for a specific `CapabilityMismatch` error
    pub fn first_mismatch(&self, caps: &WorkerCapabilities) -> Option<String> {
        if caps.gpu_memory_gb < self.min_gpu_memory_gb {
            return Some(format!(
                "gpu_memory_gb: required {}, available {}",
                self.min_gpu_memory_gb, caps.gpu_memory_gb
            ));
        }
        if caps.cpu_cores < self.min_cpu_cores {
            return Some(format!(
                "cpu_cores: required {}, available {}",
                self.min_cpu_cores, caps.cpu_cores
            ));
        }
        if caps.ram_gb < self.min_ram_gb {
            return Some(format!(
                "ram_gb: required {}, available {}",
                self.min_ram_gb, caps.ram_gb
            ));
        }
        if caps.storage_gb < self.min_storage_gb {
            return Some(format!(
                "storage_gb: required {}, available {}",
                self.min_storage_gb, caps.storage_gb
            ));
        }
        if caps.bandwidth_mbps < self.min_bandwidth_mbps {
            return Some(format!(
                "bandwidth_mbps: required {}, available {}",
                self.min_bandwidth_mbps, caps.bandwidth_mbps
            ));
        }
        if !caps.flags.contains(self.required_flags) {
            let mut missing = self.required_flags;
            missing.remove(caps.flags);
            return Some(format!("missing flags: {}", missing));
        }
        None
    }

    /// Hardware-match subscore (0-100) for workers that already passed the
    /// hard filter. Rewards headroom over the minimums so larger machines
    /// rank above machines that barely qualify. Tunable policy, not law.
    pub fn match_subscore(&self, caps: &WorkerCapabilities) -> u8 {
        debug_assert!(self.meets(caps));

        fn headroom(available: u32, required: u32) -> f64 {
            if required == 0 {
                // Unconstrained field contributes full headroom
                return 1.5;
            }
            // 1.0 at exact match, 2.0 at double the requirement, capped
            (available as f64 / required as f64).min(2.0) / 2.0 + 0.5
        }

        let ratios = [
            headroom(caps.gpu_memory_gb, self.min_gpu_memory_gb),
            headroom(caps.cpu_cores, self.min_cpu_cores),
            headroom(caps.ram_gb, self.min_ram_gb),
            headroom(caps.storage_gb, self.min_storage_gb),
            headroom(caps.bandwidth_mbps, self.min_bandwidth_mbps),
        ];
        let avg: f64 = ratios.iter().sum::<f64>() / ratios.len() as f64;

        // avg ranges [1.0, 1.5]; map onto [50, 100] so a bare-minimum
        // machine still scores 50 of 100 on hardware.
        ((avg - 1.0) * 100.0 + 50.0).clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps_16gb() -> WorkerCapabilities {
        WorkerCapabilities {
            gpu_memory_gb: 16,
            cpu_cores: 16,
            ram_gb: 64,
            storage_gb: 1000,
            bandwidth_mbps: 1000,
            flags: CapabilityFlags::CUDA.union(CapabilityFlags::FP16),
            gpu_model: "RTX 4090".to_string(),
            cpu_model: "EPYC 7543".to_string(),
        }
    }

    #[test]
    fn test_flags_contains() {
        let flags = CapabilityFlags::CUDA
            .union(CapabilityFlags::FP16)
            .union(CapabilityFlags::TENSOR_CORES);

        assert!(flags.contains(CapabilityFlags::CUDA));
        assert!(flags.contains(CapabilityFlags::CUDA.union(CapabilityFlags::FP16)));
        assert!(!flags.contains(CapabilityFlags::NVLINK));
        assert!(!flags.contains(flags.union(CapabilityFlags::INT8)));
    }

    #[test]
    fn test_flags_display_names() {
        let flags = CapabilityFlags::CUDA.union(CapabilityFlags::MULTI_GPU);
        assert_eq!(flags.to_string(), "cuda|multi-gpu");
        assert_eq!(CapabilityFlags::NONE.to_string(), "none");
    }

    #[test]
    fn test_flags_insert_remove() {
        let mut flags = CapabilityFlags::NONE;
        flags.insert(CapabilityFlags::TEE);
        assert!(flags.contains(CapabilityFlags::TEE));
        flags.remove(CapabilityFlags::TEE);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_fields() {
        let mut caps = caps_16gb();
        caps.ram_gb = 0;
        assert!(matches!(
            caps.validate(),
            Err(MarketError::InvalidArgument(_))
        ));
        assert!(caps_16gb().validate().is_ok());
    }

    #[test]
    fn test_hard_requirement_excludes_entirely() {
        // Scenario B: job requires 24GB GPU; a 16GB worker must fail the
        // binary check, not merely score lower.
        let req = ComputeRequirements {
            min_gpu_memory_gb: 24,
            ..Default::default()
        };
        let caps = caps_16gb();
        assert!(!req.meets(&caps));
        assert!(req.first_mismatch(&caps).unwrap().contains("gpu_memory_gb"));
    }

    #[test]
    fn test_missing_flag_disqualifies() {
        let req = ComputeRequirements {
            required_flags: CapabilityFlags::CUDA.union(CapabilityFlags::NVLINK),
            ..Default::default()
        };
        let caps = caps_16gb();
        assert!(!req.meets(&caps));
        assert!(req.first_mismatch(&caps).unwrap().contains("nvlink"));
    }

    #[test]
    fn test_match_subscore_rewards_headroom() {
        let req = ComputeRequirements {
            min_gpu_memory_gb: 8,
            min_cpu_cores: 8,
            min_ram_gb: 32,
            ..Default::default()
        };
        let exact = WorkerCapabilities {
            gpu_memory_gb: 8,
            cpu_cores: 8,
            ram_gb: 32,
            ..caps_16gb()
        };
        let roomy = caps_16gb();

        assert!(req.meets(&exact));
        assert!(req.meets(&roomy));
        assert!(req.match_subscore(&roomy) > req.match_subscore(&exact));
        assert!(req.match_subscore(&exact) >= 50);
    }

    #[test]
    fn test_unconstrained_requirements_score_full() {
        let req = ComputeRequirements::default();
        assert_eq!(req.match_subscore(&caps_16gb()), 100);
    }
}
