// Backpropagation: Reverse-mode automatic differentiation
//
// 1. Forward: tensor operations record their Op, forming a DAG.
// 2. backward() sorts the DAG topologically from the scalar root.
// 3. Starting from grad(root) = 1, each Op applies its chain rule and
//    accumulates into its inputs' gradients.
//
// GRADIENT RULES:
//
//   Add:      grad_a += g,              grad_b += g
//   Sub:      grad_a += g,              grad_b += -g
//   Mul:      grad_a += g * b,          grad_b += g * a
//   Div:      grad_a += g / b,          grad_b += -g * a / b²
//   Minimum:  grad_a += g where a <= b or a is NaN, grad_b += g elsewhere
//   Maximum:  grad_a += g where a >= b or a is NaN, grad_b += g elsewhere
//   Sum:      grad_in += g expanded over the reduced dims
//   Reshape / Broadcast / Contiguous / ToDtype / Affine: shape or scale back
//   WhereCond: g routed by the mask, nothing for the mask itself
//
// Minimum/Maximum TIE POLICY: when a == b the full gradient goes to the left
// operand. The gradient follows the forward pass for NaN too: a NaN on the
// left is the output, so the left operand receives it; a NaN only on the
// right loses every comparison and the right operand receives it. In a left-to-right fold over merge inputs that is the earliest
// input holding the extreme value.
//
// Broadcast binary operands receive their gradient summed back down to
// their own shape (reduce_broadcast_grad).

use std::collections::{HashMap, HashSet};

use crate::backend::{Backend, BinaryOp};
use crate::error::{Error, Result};
use crate::op::{Op, TensorId};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Gradients for every tensor reached by a backward pass.
pub struct GradStore<B: Backend> {
    grads: HashMap<TensorId, Tensor<B>>,
}

impl<B: Backend> Clone for GradStore<B> {
    fn clone(&self) -> Self {
        GradStore {
            grads: self.grads.clone(),
        }
    }
}

impl<B: Backend> Default for GradStore<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> GradStore<B> {
    pub fn new() -> Self {
        GradStore {
            grads: HashMap::new(),
        }
    }

    /// Get the gradient of a tensor (if any flowed to it).
    pub fn get(&self, tensor: &Tensor<B>) -> Option<&Tensor<B>> {
        self.grads.get(&tensor.id())
    }

    /// Accumulate gradient for a tensor used in several places.
    pub fn accumulate(&mut self, id: TensorId, grad: Tensor<B>) -> Result<()> {
        let grad = match self.grads.remove(&id) {
            Some(existing) => existing.add(&grad)?,
            None => grad,
        };
        self.grads.insert(id, grad);
        Ok(())
    }
}

/// Leaves first, root last. Only tensors that depend on a variable are kept.
fn build_topo<B: Backend>(root: &Tensor<B>) -> Vec<Tensor<B>> {
    fn visit<B: Backend>(
        t: &Tensor<B>,
        visited: &mut HashMap<TensorId, bool>,
        order: &mut Vec<Tensor<B>>,
    ) -> bool {
        if let Some(&tracked) = visited.get(&t.id()) {
            return tracked;
        }
        let mut tracked = t.is_variable();
        for input in t.op().inputs() {
            tracked |= visit(input, visited, order);
        }
        visited.insert(t.id(), tracked);
        if tracked {
            order.push(t.clone());
        }
        tracked
    }

    let mut visited = HashMap::new();
    let mut order = Vec::new();
    visit(root, &mut visited, &mut order);
    order
}

/// Compute gradients of the scalar `root` with respect to its variables.
///
/// Gradients are kept for every tensor on a path from a variable to `root`;
/// frozen leaves and constant subgraphs get none.
pub fn backward<B: Backend>(root: &Tensor<B>) -> Result<GradStore<B>> {
    if root.elem_count() != 1 {
        return Err(Error::msg(
            "backward() requires a scalar tensor (single element). \
             Use .sum_all() to reduce to a scalar first.",
        ));
    }

    let topo = build_topo(root);
    let mut grads = GradStore::new();
    if topo.is_empty() {
        return Ok(grads);
    }
    grads
        .grads
        .insert(root.id(), Tensor::<B>::ones_like(root)?);

    for tensor in topo.iter().rev() {
        let grad_output = match grads.get(tensor) {
            Some(g) => g.clone(),
            None => continue,
        };

        match tensor.op() {
            Op::None => {}

            Op::Contiguous { input } => {
                grads.accumulate(input.id(), grad_output)?;
            }

            Op::Binary { lhs, rhs, op } => {
                compute_binary_grad(*op, &grad_output, lhs, rhs, &mut grads)?;
            }

            Op::Sum {
                input,
                dims,
                keep_dim,
            } => {
                let grad = expand_sum_grad(&grad_output, input.shape(), dims, *keep_dim)?;
                grads.accumulate(input.id(), grad)?;
            }

            Op::Reshape { input, src_shape } => {
                grads.accumulate(input.id(), grad_output.reshape(src_shape.clone())?)?;
            }

            Op::Broadcast { input, src_shape } => {
                let grad = reduce_broadcast_grad(&grad_output, src_shape)?;
                grads.accumulate(input.id(), grad)?;
            }

            Op::Affine { input, mul, .. } => {
                grads.accumulate(input.id(), grad_output.affine(*mul, 0.0)?)?;
            }

            Op::WhereCond {
                mask,
                on_true,
                on_false,
            } => {
                let zero = Tensor::<B>::zeros((), grad_output.dtype(), grad_output.device())?;
                let grad_true = Tensor::where_cond(mask, &grad_output, &zero)?;
                let grad_false = Tensor::where_cond(mask, &zero, &grad_output)?;
                grads.accumulate(
                    on_true.id(),
                    reduce_broadcast_grad(&grad_true, on_true.shape())?,
                )?;
                grads.accumulate(
                    on_false.id(),
                    reduce_broadcast_grad(&grad_false, on_false.shape())?,
                )?;
            }

            Op::ToDtype { input, src_dtype } => {
                grads.accumulate(input.id(), grad_output.to_dtype(*src_dtype)?)?;
            }
        }
    }

    let tracked: HashSet<TensorId> = topo.iter().map(|t| t.id()).collect();
    grads.grads.retain(|id, _| tracked.contains(id));
    Ok(grads)
}

fn compute_binary_grad<B: Backend>(
    op: BinaryOp,
    grad_output: &Tensor<B>,
    lhs: &Tensor<B>,
    rhs: &Tensor<B>,
    grads: &mut GradStore<B>,
) -> Result<()> {
    let (raw_lhs, raw_rhs) = match op {
        BinaryOp::Add => (grad_output.clone(), grad_output.clone()),
        BinaryOp::Sub => (grad_output.clone(), grad_output.affine(-1.0, 0.0)?),
        BinaryOp::Mul => (grad_output.mul(rhs)?, grad_output.mul(lhs)?),
        BinaryOp::Div => {
            let b_sq = rhs.mul(rhs)?;
            (
                grad_output.div(rhs)?,
                grad_output.affine(-1.0, 0.0)?.mul(lhs)?.div(&b_sq)?,
            )
        }
        BinaryOp::Minimum | BinaryOp::Maximum => {
            // same choice as the forward pass: lhs on ties or when lhs is NaN
            let lhs_better = if op == BinaryOp::Minimum {
                lhs.le(rhs)?
            } else {
                lhs.ge(rhs)?
            };
            let lhs_wins = lhs_better.logical_or(&lhs.is_nan()?)?;
            let zero = Tensor::<B>::zeros((), grad_output.dtype(), grad_output.device())?;
            (
                Tensor::where_cond(&lhs_wins, grad_output, &zero)?,
                Tensor::where_cond(&lhs_wins, &zero, grad_output)?,
            )
        }
    };
    grads.accumulate(lhs.id(), reduce_broadcast_grad(&raw_lhs, lhs.shape())?)?;
    grads.accumulate(rhs.id(), reduce_broadcast_grad(&raw_rhs, rhs.shape())?)?;
    Ok(())
}

/// Sum a gradient over the dimensions broadcasting expanded.
///
///   lhs [1, 4] broadcast to [3, 4] → sum grad over dim 0 → [1, 4]
///   lhs [4]    broadcast to [3, 4] → sum grad over dim 0 → reshape to [4]
fn reduce_broadcast_grad<B: Backend>(grad: &Tensor<B>, target_shape: &Shape) -> Result<Tensor<B>> {
    let grad_dims = grad.dims().to_vec();
    let target_dims = target_shape.dims();
    if grad_dims == target_dims {
        return Ok(grad.clone());
    }

    let grad_rank = grad_dims.len();
    let offset = grad_rank - target_dims.len();
    let mut padded_target = vec![1usize; grad_rank];
    padded_target[offset..].copy_from_slice(target_dims);

    let mut result = grad.clone();
    // highest dim first so lower indices stay valid (keep_dim keeps them anyway)
    for d in (0..grad_rank).rev() {
        if padded_target[d] == 1 && grad_dims[d] > 1 {
            result = result.sum(d, true)?;
        }
    }
    result.reshape(target_shape.clone())
}

/// Spread a Sum gradient back over the input shape.
fn expand_sum_grad<B: Backend>(
    grad: &Tensor<B>,
    input_shape: &Shape,
    dims: &[usize],
    keep_dim: bool,
) -> Result<Tensor<B>> {
    let kept = if dims.is_empty() {
        grad.reshape(Shape::new(vec![1; input_shape.rank()]))?
    } else if keep_dim {
        grad.clone()
    } else {
        let mut kept_dims = input_shape.dims().to_vec();
        for &d in dims {
            kept_dims[d] = 1;
        }
        grad.reshape(Shape::new(kept_dims))?
    };
    kept.broadcast_as(input_shape.clone())?.contiguous()
}
