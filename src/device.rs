use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};

use crate::error::EvalError;
use crate::models;

/// Compute target for model inference.
///
/// Chosen once when the evaluator is built and fixed for its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    /// CUDA when ONNX Runtime reports it available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda { device_id: i32 },
}

impl Device {
    /// Resolve `Auto` to a concrete device. Concrete devices pass through.
    pub fn resolve(self) -> Device {
        match self {
            Device::Auto => {
                let cuda_available =
                    models::guard_runtime(|| Ok(CUDAExecutionProvider::default().is_available()?))
                        .unwrap_or(false);
                if cuda_available {
                    Device::Cuda { device_id: 0 }
                } else {
                    Device::Cpu
                }
            }
            concrete => concrete,
        }
    }

    /// Execution providers to register on a session for this device.
    ///
    /// An explicit CUDA request fails session creation instead of silently
    /// falling back to the CPU.
    pub(crate) fn execution_providers(self) -> Vec<ExecutionProviderDispatch> {
        match self.resolve() {
            Device::Cuda { device_id } => vec![CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()
                .error_on_failure()],
            _ => vec![CPUExecutionProvider::default().build()],
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { device_id } => write!(f, "cuda:{}", device_id),
        }
    }
}

impl FromStr for Device {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "auto" | "" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda { device_id: 0 }),
            other => {
                let id = other
                    .strip_prefix("cuda:")
                    .and_then(|id| id.parse::<i32>().ok())
                    .filter(|id| *id >= 0)
                    .ok_or_else(|| EvalError::Config(format!("unknown device '{}'", s)))?;
                Ok(Device::Cuda { device_id: id })
            }
        }
    }
}

impl TryFrom<String> for Device {
    type Error = EvalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device() {
        assert_eq!("auto".parse::<Device>().unwrap(), Device::Auto);
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda { device_id: 0 });
        assert_eq!("cuda:2".parse::<Device>().unwrap(), Device::Cuda { device_id: 2 });
    }

    #[test]
    fn test_parse_unknown_device() {
        assert!(matches!("tpu".parse::<Device>(), Err(EvalError::Config(_))));
        assert!("cuda:-1".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for device in [Device::Auto, Device::Cpu, Device::Cuda { device_id: 3 }] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }

    #[test]
    fn test_concrete_device_resolves_to_itself() {
        assert_eq!(Device::Cpu.resolve(), Device::Cpu);
        assert_eq!(
            Device::Cuda { device_id: 1 }.resolve(),
            Device::Cuda { device_id: 1 }
        );
    }

    #[test]
    fn test_device_in_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            device: Device,
        }
        let w: Wrapper = toml::from_str("device = \"cuda:1\"").unwrap();
        assert_eq!(w.device, Device::Cuda { device_id: 1 });
    }
}
