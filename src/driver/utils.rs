use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;
use eyre::Result;

/// Pick the compute device: CUDA, then Metal, then the CPU. `cpu` forces the
/// CPU.
pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        tracing::info!("running on cuda");
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        tracing::info!("running on metal");
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            tracing::warn!("running on cpu, build with `--features metal` to run on the gpu");
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            tracing::warn!("running on cpu, build with `--features cuda` to run on the gpu");
        }
        Ok(Device::Cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_cpu() {
        assert!(matches!(device(true).unwrap(), Device::Cpu));
    }
}
