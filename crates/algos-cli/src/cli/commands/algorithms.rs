//! `algos algorithms` – registered algorithms and their input schemas.

use algos_core::algorithm::AlgorithmRegistry;
use anyhow::Result;

pub fn run_algorithms(registry: &AlgorithmRegistry) -> Result<i32> {
    println!("{:<16} {:<8} {}", "NAME", "VERSION", "INPUT");
    for d in registry.descriptors() {
        println!("{:<16} {:<8} {}", d.name, d.version, d.schema.name());
    }
    Ok(0)
}
