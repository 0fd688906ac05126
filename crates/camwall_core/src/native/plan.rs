//! CPU affinity and GPU pool plans derived from the memory config.

use std::thread;

use crate::config::MemoryConfig;
use crate::models::ResolutionClass;

/// Core assignment for the capture and GPU upload threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuPlan {
    /// Cores considered. Zero when pinning is off.
    pub cores: usize,
    pub live: Option<usize>,
    pub usb: Option<usize>,
    /// Upload thread core per resolution class, in `ResolutionClass::ALL` order.
    pub upload: Vec<Option<usize>>,
}

impl CpuPlan {
    /// No affinity for any thread.
    pub fn unpinned() -> Self {
        Self {
            cores: 0,
            live: None,
            usb: None,
            upload: vec![None; ResolutionClass::ALL.len()],
        }
    }

    /// Round-robin over `cores`: live thread, usb thread, then the upload threads.
    pub fn pinned(cores: usize) -> Self {
        let cores = cores.max(1);
        let mut next = (0..).map(|i| i % cores);
        let live = next.next();
        let usb = next.next();
        let upload = ResolutionClass::ALL.iter().map(|_| next.next()).collect();
        Self {
            cores,
            live,
            usb,
            upload,
        }
    }

    /// Plan for a memory config, detecting the core count when pinning.
    pub fn from_memory(memory: &MemoryConfig) -> Self {
        if memory.bind {
            let cores = thread::available_parallelism().map_or(1, |n| n.get());
            Self::pinned(cores)
        } else {
            Self::unpinned()
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.cores > 0
    }

    pub fn upload_affinity(&self, class: ResolutionClass) -> Option<usize> {
        let index = ResolutionClass::ALL.iter().position(|c| *c == class)?;
        self.upload.get(index).copied().flatten()
    }
}

/// Frame counts the GPU pool preallocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuPoolPlan {
    pub msbuftime: u32,
    /// Frames per resolution class, in `ResolutionClass::ALL` order.
    pub frames: Vec<(ResolutionClass, u32)>,
    pub cpu: CpuPlan,
}

impl GpuPoolPlan {
    pub fn from_memory(memory: &MemoryConfig, cpu: &CpuPlan) -> Self {
        Self {
            msbuftime: memory.msbuftime,
            frames: ResolutionClass::ALL
                .iter()
                .map(|&class| (class, memory.pool_frames(class)))
                .collect(),
            cpu: cpu.clone(),
        }
    }

    pub fn frames_for(&self, class: ResolutionClass) -> u32 {
        self.frames
            .iter()
            .find(|(c, _)| *c == class)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total_frames(&self) -> u64 {
        self.frames.iter().map(|(_, n)| u64::from(*n)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_plan_wraps_around_cores() {
        let plan = CpuPlan::pinned(4);
        assert_eq!(plan.live, Some(0));
        assert_eq!(plan.usb, Some(1));
        assert_eq!(plan.upload_affinity(ResolutionClass::P720), Some(2));
        assert_eq!(plan.upload_affinity(ResolutionClass::P1080), Some(3));
        assert_eq!(plan.upload_affinity(ResolutionClass::P1440), Some(0));
    }

    #[test]
    fn single_core_pins_everything_to_zero() {
        let plan = CpuPlan::pinned(0);
        assert_eq!(plan.cores, 1);
        assert!(plan.upload.iter().all(|c| *c == Some(0)));
    }

    #[test]
    fn unpinned_without_bind() {
        let plan = CpuPlan::from_memory(&MemoryConfig::default());
        assert!(!plan.is_pinned());
        assert_eq!(plan.live, None);
    }

    #[test]
    fn gpu_plan_follows_memory_config() {
        let memory = MemoryConfig::default(); // 300 ms -> 8 frames
        let plan = GpuPoolPlan::from_memory(&memory, &CpuPlan::unpinned());
        assert_eq!(plan.frames_for(ResolutionClass::P720), 160);
        assert_eq!(plan.frames_for(ResolutionClass::K4), 0);
        assert_eq!(plan.total_frames(), 320);
    }
}
