//! Built-in kernel implementations.
//!
//! This module contains the standard kernels that ship with vxgraph. All of
//! them run on the [`DEFAULT_TARGET`] reference target.

mod arithmetic;
mod bitwise;
mod copy;
mod debug;
mod filter;

use crate::core::error::RegistryResult;
use crate::core::kernel::Kernel;
use crate::kernels::registry::KernelRegistry;
use crate::kernels::target::Target;

/// Name of the reference target hosting the built-in kernels.
pub const DEFAULT_TARGET: &str = "khronos.c_model";

/// Register all built-in kernels and host them on `target`.
pub fn register_all(registry: &mut KernelRegistry, target: &mut Target) -> RegistryResult<()> {
    copy::register(registry, target)?;
    debug::register(registry, target)?;
    arithmetic::register(registry, target)?;
    bitwise::register(registry, target)?;
    filter::register(registry, target)?;
    Ok(())
}

fn add<K: Kernel + 'static>(
    registry: &mut KernelRegistry,
    target: &mut Target,
    kernel: K,
) -> RegistryResult<()> {
    let name = kernel.metadata().name;
    registry.register(kernel)?;
    target.add_kernel(name);
    Ok(())
}

// Re-export for direct access
pub use arithmetic::{AbsDiff, Add, ConvertPolicy, Subtract};
pub use bitwise::{And, Not, Or, Xor};
pub use copy::{CopyArray, CopyImage};
pub use debug::{CheckImage, FillImage};
pub use filter::Box3x3;
