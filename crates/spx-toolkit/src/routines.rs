//! Reference routines.
//!
//! Each routine follows the native calling convention: positional inputs in,
//! positional outputs out, failures signalled into the [`ErrorState`] with a
//! SPICE-style short code and an empty output list.

use std::f64::consts::PI;
use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};
use parking_lot::RwLock;
use spx_compat::{ErrorState, NativeLibrary};
use spx_model::{NdArray, Value};
use tracing::trace;

use crate::pool::{KernelPool, PoolMiss};

type Routine = fn(&KernelPool, &[Value], &mut ErrorState) -> Vec<Value>;

/// Symbol, input count, output count (found-flag included) and body.
const ROUTINES: &[(&str, usize, usize, Routine)] = &[
    ("bodn2c", 1, 2, bodn2c),
    ("bodc2n", 1, 2, bodc2n),
    ("bodvcd", 2, 2, bodvcd),
    ("namfrm", 1, 1, namfrm),
    ("frmnam", 1, 1, frmnam),
    ("vnorm", 1, 1, vnorm),
    ("vdot", 2, 1, vdot),
    ("vsep", 2, 1, vsep),
    ("mxv", 2, 1, mxv),
    ("rotate", 2, 1, rotate),
    ("rpd", 0, 1, rpd),
    ("sumai", 1, 1, sumai),
];

/// Registers every reference routine, each reading from `pool`.
pub fn register_all(library: &mut NativeLibrary, pool: &Arc<RwLock<KernelPool>>) {
    for &(symbol, inputs, outputs, routine) in ROUTINES {
        let pool = Arc::clone(pool);
        library.register(
            symbol,
            inputs,
            outputs,
            Arc::new(move |args: &[Value], state: &mut ErrorState| {
                routine(&pool.read(), args, state)
            }),
        );
    }
    trace!(count = ROUTINES.len(), "registered reference routines");
}

fn invalid(state: &mut ErrorState, what: &str, value: &Value) {
    state.signal(
        "SPICE(INVALIDARGUMENT)",
        format!("expected {what}, got {value}"),
    );
}

fn int_arg(args: &[Value], index: usize, state: &mut ErrorState) -> Option<i64> {
    let value = &args[index];
    let out = value.as_int();
    if out.is_none() {
        invalid(state, "an integer", value);
    }
    out
}

fn float_arg(args: &[Value], index: usize, state: &mut ErrorState) -> Option<f64> {
    let value = &args[index];
    let out = value.as_float();
    if out.is_none() {
        invalid(state, "a number", value);
    }
    out
}

fn str_arg<'a>(args: &'a [Value], index: usize, state: &mut ErrorState) -> Option<&'a str> {
    let value = &args[index];
    let out = value.as_str();
    if out.is_none() {
        invalid(state, "a string", value);
    }
    out
}

fn vector_arg(args: &[Value], index: usize, state: &mut ErrorState) -> Option<Vector3<f64>> {
    let value = &args[index];
    let out = value
        .as_array()
        .filter(|array| array.shape() == [3])
        .and_then(NdArray::as_f64)
        .map(Vector3::from_column_slice);
    if out.is_none() {
        invalid(state, "a 3-vector", value);
    }
    out
}

fn matrix_arg(args: &[Value], index: usize, state: &mut ErrorState) -> Option<Matrix3<f64>> {
    let value = &args[index];
    let out = value
        .as_array()
        .filter(|array| array.shape() == [3, 3])
        .and_then(NdArray::as_f64)
        .map(Matrix3::from_row_slice);
    if out.is_none() {
        invalid(state, "a 3x3 matrix", value);
    }
    out
}

fn vector_value(v: &Vector3<f64>) -> Value {
    Value::Array(NdArray::vector(vec![v.x, v.y, v.z]))
}

fn matrix_value(m: &Matrix3<f64>, state: &mut ErrorState) -> Option<Value> {
    let rows: Vec<f64> = (0..3)
        .flat_map(|r| (0..3).map(move |c| m[(r, c)]))
        .collect();
    match NdArray::from_f64(vec![3, 3], rows) {
        Ok(array) => Some(Value::Array(array)),
        Err(err) => {
            state.signal("SPICE(BADDIMENSION)", err.to_string());
            None
        }
    }
}

fn bodn2c(pool: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let Some(name) = str_arg(args, 0, state) else {
        return Vec::new();
    };
    match pool.body_code(name) {
        Some(code) => vec![Value::Int(code), Value::Bool(true)],
        None => vec![Value::Int(0), Value::Bool(false)],
    }
}

fn bodc2n(pool: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let Some(code) = int_arg(args, 0, state) else {
        return Vec::new();
    };
    match pool.body_name(code) {
        Some(name) => vec![Value::from(name), Value::Bool(true)],
        None => vec![Value::from(""), Value::Bool(false)],
    }
}

/// Body constant lookup; unknown bodies and missing items are signalled.
fn bodvcd(pool: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let (Some(code), Some(item)) = (int_arg(args, 0, state), str_arg(args, 1, state)) else {
        return Vec::new();
    };
    match pool.body_values(code, item) {
        Ok(values) => vec![
            Value::Array(NdArray::vector(values.to_vec())),
            Value::Bool(true),
        ],
        Err(PoolMiss::UnknownBody) => {
            state.signal(
                "SPICE(IDCODENOTFOUND)",
                format!("no data loaded for body {code}"),
            );
            Vec::new()
        }
        Err(PoolMiss::MissingItem) => {
            state.signal(
                "SPICE(KERNELVARNOTFOUND)",
                format!("BODY{code}_{} is not in the kernel pool", item.trim().to_ascii_uppercase()),
            );
            Vec::new()
        }
    }
}

fn namfrm(pool: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let Some(name) = str_arg(args, 0, state) else {
        return Vec::new();
    };
    vec![Value::Int(pool.frame_code(name).unwrap_or(0))]
}

fn frmnam(pool: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let Some(code) = int_arg(args, 0, state) else {
        return Vec::new();
    };
    vec![Value::from(pool.frame_name(code).unwrap_or(""))]
}

fn vnorm(_: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let Some(v) = vector_arg(args, 0, state) else {
        return Vec::new();
    };
    vec![Value::Float(v.norm())]
}

fn vdot(_: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let (Some(a), Some(b)) = (vector_arg(args, 0, state), vector_arg(args, 1, state)) else {
        return Vec::new();
    };
    vec![Value::Float(a.dot(&b))]
}

/// Separation angle in radians; zero when either vector is zero.
fn vsep(_: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let (Some(a), Some(b)) = (vector_arg(args, 0, state), vector_arg(args, 1, state)) else {
        return Vec::new();
    };
    if a.norm() == 0.0 || b.norm() == 0.0 {
        return vec![Value::Float(0.0)];
    }
    vec![Value::Float(a.angle(&b))]
}

fn mxv(_: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let (Some(m), Some(v)) = (matrix_arg(args, 0, state), vector_arg(args, 1, state)) else {
        return Vec::new();
    };
    vec![vector_value(&(m * v))]
}

/// Matrix rotating a frame by `angle` about coordinate axis 1, 2 or 3.
fn rotate(_: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    let (Some(angle), Some(axis)) = (float_arg(args, 0, state), int_arg(args, 1, state)) else {
        return Vec::new();
    };
    let (s, c) = angle.sin_cos();
    let m = match axis {
        1 => Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c),
        2 => Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c),
        3 => Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0),
        other => {
            state.signal(
                "SPICE(INDEXOUTOFRANGE)",
                format!("axis {other} is not 1, 2 or 3"),
            );
            return Vec::new();
        }
    };
    matrix_value(&m, state).into_iter().collect()
}

fn rpd(_: &KernelPool, _: &[Value], _: &mut ErrorState) -> Vec<Value> {
    vec![Value::Float(PI / 180.0)]
}

fn sumai(_: &KernelPool, args: &[Value], state: &mut ErrorState) -> Vec<Value> {
    match args[0].as_array().and_then(NdArray::as_i64) {
        Some(values) => vec![Value::Int(values.iter().sum())],
        None => {
            invalid(state, "an integer array", &args[0]);
            Vec::new()
        }
    }
}
