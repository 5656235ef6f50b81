//! Broadcasting of scalar-oriented routines over arrays.
//!
//! Leading shapes are aligned on the right and padded with ones on the left.
//! Each axis must be 1 or agree with every other non-1 extent. Size-1 axes
//! are never materialized: their index is pinned to 0 while iterating.

use spx_model::{NdArray, Value, unravel_index};
use tracing::trace;

use crate::coerce::ProcessedArg;
use crate::error::{DispatchError, Result};
use crate::signature::OutputSpec;

/// Right-aligned broadcast of several shapes; `None` when incompatible.
pub fn broadcast_shapes<S: AsRef<[usize]>>(shapes: &[S]) -> Option<Vec<usize>> {
    let rank = shapes.iter().map(|s| s.as_ref().len()).max().unwrap_or(0);
    let mut out = vec![1usize; rank];
    for shape in shapes {
        let shape = shape.as_ref();
        let offset = rank - shape.len();
        for (axis, &extent) in shape.iter().enumerate() {
            let slot = &mut out[offset + axis];
            if *slot == 1 {
                *slot = extent;
            } else if extent != 1 && extent != *slot {
                return None;
            }
        }
    }
    Some(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastOperand {
    /// Position of the argument in the routine's inputs
    pub index: usize,
    pub core_rank: usize,
    pub leading: Vec<usize>,
}

/// Iteration plan for one vectorized call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPlan {
    operands: Vec<BroadcastOperand>,
    shape: Vec<usize>,
}

impl BroadcastPlan {
    /// Plans iteration over every extended argument.
    ///
    /// Returns `Ok(None)` when no argument is extended, so the call can go
    /// straight to the scalar routine.
    pub fn build(routine: &str, args: &[ProcessedArg]) -> Result<Option<Self>> {
        let operands: Vec<BroadcastOperand> = args
            .iter()
            .enumerate()
            .filter_map(|(index, arg)| match arg {
                ProcessedArg::Extended { array, core_rank } => Some(BroadcastOperand {
                    index,
                    core_rank: *core_rank,
                    leading: array.leading_shape(*core_rank).to_vec(),
                }),
                _ => None,
            })
            .collect();
        if operands.is_empty() {
            return Ok(None);
        }

        let leading: Vec<&[usize]> = operands.iter().map(|op| op.leading.as_slice()).collect();
        let shape = broadcast_shapes(&leading).ok_or_else(|| DispatchError::ShapeMismatch {
            routine: routine.to_string(),
            shapes: operands.iter().map(|op| op.leading.clone()).collect(),
        })?;
        trace!(routine, shape = ?shape, operands = operands.len(), "broadcast plan");
        Ok(Some(Self { operands, shape }))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn operands(&self) -> &[BroadcastOperand] {
        &self.operands
    }

    /// Number of scalar calls the plan performs.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index into an operand's own leading axes for a broadcast index.
    pub fn operand_index(&self, operand: &BroadcastOperand, index: &[usize]) -> Vec<usize> {
        let offset = self.shape.len() - operand.leading.len();
        operand
            .leading
            .iter()
            .enumerate()
            .map(|(axis, &extent)| if extent == 1 { 0 } else { index[offset + axis] })
            .collect()
    }
}

/// Runs `call` once per broadcast index and stacks the results.
///
/// Each output is assembled into an array of shape
/// `plan.shape() ++ output core shape`. Iteration is row-major and stops at
/// the first failing call. An element for which `call` returns `None` found
/// nothing: its rows are zeros shaped like the rows that were found, or like
/// the output tags when no element was found.
pub fn broadcast_call<F>(
    routine: &str,
    plan: &BroadcastPlan,
    args: &[ProcessedArg],
    outputs: &[OutputSpec],
    mut call: F,
) -> Result<Vec<Value>>
where
    F: FnMut(Vec<Value>) -> Result<Option<Vec<Value>>>,
{
    let mut columns: Vec<Vec<Option<Value>>> =
        vec![Vec::with_capacity(plan.len()); outputs.len()];
    for flat in 0..plan.len() {
        let index = unravel_index(flat, &plan.shape);
        let mut scalar_args = Vec::with_capacity(args.len());
        let mut operands = plan.operands.iter().peekable();
        for (position, arg) in args.iter().enumerate() {
            let value = match arg {
                ProcessedArg::Value(value) => value.clone(),
                ProcessedArg::Extended { array, .. } => {
                    let Some(operand) = operands.next_if(|op| op.index == position) else {
                        return Err(DispatchError::ShapeMismatch {
                            routine: routine.to_string(),
                            shapes: vec![array.shape().to_vec()],
                        });
                    };
                    array.subarray(&plan.operand_index(operand, &index))?.into_value()
                }
                ProcessedArg::Aliases { candidates, .. } => {
                    return Err(DispatchError::UnresolvedIdentifier {
                        routine: routine.to_string(),
                        index: position,
                        identifier: format!("{} alias candidates", candidates.len()),
                    });
                }
            };
            scalar_args.push(value);
        }

        match call(scalar_args)? {
            Some(results) => {
                for (column, result) in columns.iter_mut().zip(results) {
                    column.push(Some(result));
                }
            }
            None => {
                for column in columns.iter_mut() {
                    column.push(None);
                }
            }
        }
    }

    outputs
        .iter()
        .zip(columns)
        .map(|(output, parts)| {
            let (kind, inner) = match parts.iter().flatten().next() {
                Some(found) => (found.element_kind(), found.shape().to_vec()),
                None => (output.tag.element_kind(), output.tag.core_shape().concrete(0)),
            };
            let parts: Vec<Value> = parts
                .into_iter()
                .map(|part| part.unwrap_or_else(|| NdArray::zeros(kind, inner.clone()).into_value()))
                .collect();
            Ok(NdArray::stack(&plan.shape, kind, &inner, &parts)?.into_value())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use spx_model::{ElementKind, TypeTag};

    fn extended(shape: Vec<usize>, core_rank: usize) -> ProcessedArg {
        let len = shape.iter().product();
        let data = (0..len).map(|i| i as f64).collect();
        ProcessedArg::Extended {
            array: NdArray::from_f64(shape, data).expect("array"),
            core_rank,
        }
    }

    fn float_output() -> Vec<OutputSpec> {
        vec![OutputSpec {
            name: "out".to_string(),
            tag: TypeTag::Float,
        }]
    }

    #[test]
    fn shapes_broadcast_right_aligned() {
        assert_eq!(broadcast_shapes(&[vec![1], vec![3]]), Some(vec![3]));
        assert_eq!(broadcast_shapes(&[vec![2, 1], vec![4]]), Some(vec![2, 4]));
        assert_eq!(broadcast_shapes(&[vec![2], vec![3]]), None);
        assert_eq!(broadcast_shapes::<Vec<usize>>(&[]), Some(vec![]));
    }

    #[test]
    fn no_extended_arguments_means_no_plan() {
        let args = vec![ProcessedArg::Value(Value::Float(1.0))];
        assert_eq!(BroadcastPlan::build("vnorm", &args).expect("no failure"), None);
    }

    #[test]
    fn incompatible_leading_shapes_fail_before_any_call() {
        let args = vec![extended(vec![2], 0), extended(vec![3], 0)];
        let err = BroadcastPlan::build("vdot", &args).expect_err("2 vs 3");
        match err {
            DispatchError::ShapeMismatch { shapes, .. } => {
                assert_eq!(shapes, vec![vec![2], vec![3]]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn size_one_axes_tile_without_copies() {
        let args = vec![extended(vec![1], 0), extended(vec![3], 0)];
        let plan = BroadcastPlan::build("add", &args).expect("ok").expect("plan");
        assert_eq!(plan.shape(), &[3]);

        let mut seen = Vec::new();
        let out = broadcast_call("add", &plan, &args, &float_output(), |scalars| {
            seen.push(scalars.clone());
            let a = scalars[0].as_float().expect("float");
            let b = scalars[1].as_float().expect("float");
            Ok(Some(vec![Value::Float(a + b)]))
        })
        .expect("calls succeed");
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|s| s[0] == Value::Float(0.0)));
        assert_eq!(out, vec![Value::Array(NdArray::vector(vec![0.0, 1.0, 2.0]))]);
    }

    #[test]
    fn core_axes_stay_with_each_call() {
        let args = vec![
            extended(vec![2, 3], 1),
            ProcessedArg::Value(Value::Float(10.0)),
        ];
        let plan = BroadcastPlan::build("scale", &args).expect("ok").expect("plan");
        let outputs = vec![OutputSpec {
            name: "v".to_string(),
            tag: TypeTag::array(ElementKind::Float, vec![3]),
        }];
        let out = broadcast_call("scale", &plan, &args, &outputs, |scalars| {
            let v = scalars[0].as_array().expect("core vector").as_f64().expect("f64");
            let k = scalars[1].as_float().expect("float");
            Ok(Some(vec![Value::Array(NdArray::vector(v.iter().map(|x| x * k).collect()))]))
        })
        .expect("calls succeed");
        let expected =
            NdArray::from_f64(vec![2, 3], vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]).expect("array");
        assert_eq!(out, vec![Value::Array(expected)]);
    }

    #[test]
    fn empty_broadcast_makes_no_calls() {
        let args = vec![extended(vec![0], 0)];
        let plan = BroadcastPlan::build("vnorm", &args).expect("ok").expect("plan");
        let mut calls = 0;
        let out = broadcast_call("vnorm", &plan, &args, &float_output(), |_| {
            calls += 1;
            Ok(Some(vec![Value::Float(0.0)]))
        })
        .expect("nothing to do");
        assert_eq!(calls, 0);
        assert_eq!(out, vec![Value::Array(NdArray::zeros(ElementKind::Float, vec![0]))]);
    }

    #[test]
    fn first_failure_stops_iteration() {
        let args = vec![extended(vec![4], 0)];
        let plan = BroadcastPlan::build("f", &args).expect("ok").expect("plan");
        let mut calls = 0;
        let err = broadcast_call("f", &plan, &args, &float_output(), |_| {
            calls += 1;
            if calls == 2 {
                Err(DispatchError::NotFound {
                    routine: "f".to_string(),
                })
            } else {
                Ok(Some(vec![Value::Float(1.0)]))
            }
        })
        .expect_err("second call fails");
        assert!(err.is_not_found());
        assert_eq!(calls, 2);
    }

    #[test]
    fn missing_elements_take_the_shape_of_found_rows() {
        let args = vec![extended(vec![3], 0)];
        let plan = BroadcastPlan::build("radii", &args).expect("ok").expect("plan");
        let outputs = vec![
            OutputSpec {
                name: "values".to_string(),
                tag: TypeTag::array(ElementKind::Float, vec![0]),
            },
            OutputSpec {
                name: "found".to_string(),
                tag: TypeTag::Bool,
            },
        ];
        let out = broadcast_call("radii", &plan, &args, &outputs, |scalars| {
            let x = scalars[0].as_float().expect("float");
            if x == 1.0 {
                return Ok(None);
            }
            Ok(Some(vec![
                Value::Array(NdArray::vector(vec![x, x])),
                Value::Bool(true),
            ]))
        })
        .expect("missing rows are filled");
        let values = NdArray::from_f64(vec![3, 2], vec![0.0, 0.0, 0.0, 0.0, 2.0, 2.0]).expect("array");
        assert_eq!(out[0], Value::Array(values));
        let flags = NdArray::from_bools(vec![3], vec![true, false, true]).expect("flags");
        assert_eq!(out[1], Value::Array(flags));
    }

    #[test]
    fn nothing_found_uses_output_tags() {
        let args = vec![extended(vec![2], 0)];
        let plan = BroadcastPlan::build("radii", &args).expect("ok").expect("plan");
        let outputs = vec![OutputSpec {
            name: "values".to_string(),
            tag: TypeTag::array(ElementKind::Float, vec![0]),
        }];
        let out = broadcast_call("radii", &plan, &args, &outputs, |_| Ok(None))
            .expect("all rows are placeholders");
        assert_eq!(out, vec![Value::Array(NdArray::zeros(ElementKind::Float, vec![2, 0]))]);
    }

    fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(1usize..5, 0..4)
    }

    proptest! {
        #[test]
        fn ones_mask_broadcasts_to_original(shape in shape_strategy(), mask in prop::collection::vec(any::<bool>(), 4)) {
            let masked: Vec<usize> = shape
                .iter()
                .zip(&mask)
                .map(|(&d, &one)| if one { 1 } else { d })
                .collect();
            prop_assert_eq!(broadcast_shapes(&[shape.clone(), masked.clone()]), Some(shape.clone()));
            prop_assert_eq!(broadcast_shapes(&[masked, shape.clone()]), Some(shape));
        }

        #[test]
        fn broadcast_is_symmetric(a in shape_strategy(), b in shape_strategy()) {
            prop_assert_eq!(
                broadcast_shapes(&[a.clone(), b.clone()]),
                broadcast_shapes(&[b, a])
            );
        }

        #[test]
        fn call_count_matches_broadcast_size(a in shape_strategy(), b in shape_strategy()) {
            let args = vec![extended(a.clone(), 0), extended(b.clone(), 0)];
            match broadcast_shapes(&[a, b]) {
                Some(shape) => {
                    let plan = BroadcastPlan::build("f", &args).expect("ok").expect("plan");
                    prop_assert_eq!(plan.shape(), shape.as_slice());
                    let mut calls = 0usize;
                    broadcast_call("f", &plan, &args, &float_output(), |_| {
                        calls += 1;
                        Ok(Some(vec![Value::Float(0.0)]))
                    })
                    .expect("calls succeed");
                    prop_assert_eq!(calls, shape.iter().product::<usize>());
                }
                None => {
                    prop_assert!(BroadcastPlan::build("f", &args).is_err());
                }
            }
        }
    }
}
