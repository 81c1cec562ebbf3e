use pyo3::pymodule;

pub mod deployment;
pub mod messages;

/// The Python module implemented in Rust.
#[pymodule]
mod groove_deploy {
    #[pymodule_export]
    use super::deployment::DeploymentEngine;
}
