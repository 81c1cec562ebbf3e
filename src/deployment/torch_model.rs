//! TorchScript model backend.
//!
//! Loads a scripted model with `torch.jit.load` through the embedded Python
//! interpreter and calls its exported `sample` method. Inputs are passed as
//! numpy-backed tensors; outputs are read back as float32 numpy arrays and
//! checked against the fixed grid shape before anything else sees them.

use std::path::Path;

use numpy::ndarray::{ArrayViewD, Axis};
use numpy::{PyArray1, PyReadonlyArrayDyn};
use pyo3::prelude::*;
use pyo3::types::PyModule;

use crate::deployment::constants::{NUM_STEPS, NUM_VOICES};
use crate::deployment::errors::{InferenceContractError, ModelLoadError};
use crate::deployment::model::{
    GenerativeModel, InferenceInputs, InferenceOutputs, ModelStore, StepGrid,
};

/// Loads TorchScript archives (`.pt`) from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct TorchScriptStore;

impl ModelStore for TorchScriptStore {
    fn load(&self, path: &Path) -> Result<Box<dyn GenerativeModel>, ModelLoadError> {
        if !path.is_file() {
            return Err(ModelLoadError::NotFound(path.to_path_buf()));
        }

        let module = Python::attach(|py| -> PyResult<Py<PyAny>> {
            let torch = py.import("torch")?;
            let module = torch
                .getattr("jit")?
                .call_method1("load", (path.to_string_lossy().into_owned(),))?;
            module.call_method0("eval")?;
            Ok(module.unbind())
        })
        .map_err(|err| ModelLoadError::Malformed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        Ok(Box::new(TorchScriptModel { module }))
    }
}

/// A loaded TorchScript module exposing `sample`.
pub struct TorchScriptModel {
    module: Py<PyAny>,
}

impl GenerativeModel for TorchScriptModel {
    fn infer(&self, inputs: &InferenceInputs) -> Result<InferenceOutputs, InferenceContractError> {
        Python::attach(|py| {
            let torch = py.import("torch").map_err(invocation)?;

            let args = (
                to_tensor(&torch, inputs.latent.as_slice(), true).map_err(invocation)?,
                to_tensor(&torch, &inputs.voice_thresholds, false).map_err(invocation)?,
                to_tensor(&torch, &inputs.voice_max_counts, false).map_err(invocation)?,
                inputs.sampling_mode.as_model_arg(),
                inputs.temperature as f64,
            );

            let output = self
                .module
                .bind(py)
                .call_method1("sample", args)
                .map_err(invocation)?;

            let (hits, velocities, offsets): (Bound<'_, PyAny>, Bound<'_, PyAny>, Bound<'_, PyAny>) =
                output
                    .extract()
                    .map_err(|err: PyErr| InferenceContractError::Arity(err.to_string()))?;

            InferenceOutputs::new(
                read_grid("hits", &hits)?,
                read_grid("velocities", &velocities)?,
                read_grid("offsets", &offsets)?,
            )
        })
    }
}

fn invocation(err: PyErr) -> InferenceContractError {
    InferenceContractError::Invocation(err.to_string())
}

/// Wraps a slice as a float32 tensor, as `[1, len]` when `batched`.
fn to_tensor<'py>(
    torch: &Bound<'py, PyModule>,
    values: &[f32],
    batched: bool,
) -> PyResult<Bound<'py, PyAny>> {
    let array = PyArray1::from_slice(torch.py(), values);
    let tensor = torch.call_method1("from_numpy", (array,))?;
    if batched {
        tensor.call_method1("reshape", (1i64, -1i64))
    } else {
        Ok(tensor)
    }
}

fn read_grid(
    grid: &'static str,
    tensor: &Bound<'_, PyAny>,
) -> Result<StepGrid, InferenceContractError> {
    let array = tensor
        .call_method0("detach")
        .and_then(|t| t.call_method0("cpu"))
        .and_then(|t| t.call_method0("float"))
        .and_then(|t| t.call_method0("numpy"))
        .map_err(invocation)?;
    let array: PyReadonlyArrayDyn<'_, f32> = array
        .extract()
        .map_err(|err| InferenceContractError::Invocation(format!("{grid}: {err}")))?;

    grid_from_view(grid, array.as_array())
}

/// Checks the shape of one output grid and copies it into rows.
///
/// Accepts `[batch, steps, voices]` (batch 0 is used) or `[steps, voices]`.
/// A zero-size or rank-0 array is the degenerate empty result.
pub(crate) fn grid_from_view(
    grid: &'static str,
    view: ArrayViewD<'_, f32>,
) -> Result<StepGrid, InferenceContractError> {
    if view.ndim() == 0 || view.is_empty() {
        return Ok(Vec::new());
    }

    let view = match view.ndim() {
        3 => view.index_axis_move(Axis(0), 0),
        2 => view,
        rank => return Err(InferenceContractError::Rank { grid, rank }),
    };

    let (steps, voices) = (view.shape()[0], view.shape()[1]);
    if voices != NUM_VOICES {
        return Err(InferenceContractError::VoiceCount {
            grid,
            expected: NUM_VOICES,
            actual: voices,
        });
    }
    if steps != NUM_STEPS {
        return Err(InferenceContractError::StepCount {
            grid,
            expected: NUM_STEPS,
            actual: steps,
        });
    }

    Ok(view
        .outer_iter()
        .map(|row| {
            let mut out = [0.0; NUM_VOICES];
            for (dst, src) in out.iter_mut().zip(row.iter()) {
                *dst = *src;
            }
            out
        })
        .collect())
}
