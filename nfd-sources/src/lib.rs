//! Feature sources for the nfd worker
//!
//! Each source implements [`nfd_common::FeatureSource`] and reads host state
//! from procfs/sysfs below a host root (`/` by default).
//!
//! Production sources:
//! - `cpu`, `iommu`, `kernel`, `memory`, `network`, `pci`, `storage`,
//!   `system`, `usb` - hardware and system probes
//! - `custom` - user defined rules
//! - `local` - operator supplied hooks and feature files
//!
//! Testing-only sources: `fake`, `panic_fake`.

pub mod cpu;
pub mod custom;
pub mod fake;
mod fsutil;
pub mod iommu;
pub mod kernel;
pub mod local;
pub mod memory;
pub mod network;
pub mod panic_fake;
pub mod pci;
pub mod storage;
pub mod system;
pub mod usb;

pub use cpu::CpuSource;
pub use custom::CustomSource;
pub use fake::FakeSource;
pub use fsutil::HOST_ROOT;
pub use iommu::IommuSource;
pub use kernel::KernelSource;
pub use local::LocalSource;
pub use memory::MemorySource;
pub use network::NetworkSource;
pub use panic_fake::PanicFakeSource;
pub use pci::PciSource;
pub use storage::StorageSource;
pub use system::SystemSource;
pub use usb::UsbSource;
