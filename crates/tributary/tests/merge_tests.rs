// Integration tests for the merge layers
//
// These tests run the layers end to end on the CPU backend: shape
// validation and caching, the fold itself, mask propagation, configuration
// and concurrent use of one layer from several threads.

use proptest::prelude::*;
use tributary::nn::{average, maximum, minimum, subtract};
use tributary::prelude::*;
use tributary::Error;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn sym(dims: &[Option<usize>]) -> SymbolicShape {
    SymbolicShape::from(dims.to_vec())
}

// Forward

#[test]
fn test_minimum_two_inputs() -> tributary::Result<()> {
    init_tracing();
    let dev = CpuDevice;
    let a = CpuTensor::from_f64_slice(&[1.0, 5.0, 3.0], 3, DType::F32, &dev)?;
    let b = CpuTensor::from_f64_slice(&[4.0, 2.0, 6.0], 3, DType::F32, &dev)?;
    let y = Minimum::<CpuBackend>::new().forward(&[a, b])?;
    assert_eq!(y.dims(), &[3]);
    assert_vec_approx(&y.to_f64_vec()?, &[1.0, 2.0, 3.0], 1e-6);
    Ok(())
}

#[test]
fn test_minimum_broadcast_row() -> tributary::Result<()> {
    let dev = CpuDevice;
    let a = CpuTensor::from_f64_slice(&[1.0, 9.0, 1.0, 8.0, 1.0, 9.0], (2, 3), DType::F32, &dev)?;
    let b = CpuTensor::from_f64_slice(&[5.0, 5.0, 5.0], (1, 3), DType::F32, &dev)?;
    let layer = Minimum::<CpuBackend>::new();
    let y = layer.forward(&[a, b])?;
    assert_eq!(y.dims(), &[2, 3]);
    assert_vec_approx(&y.to_f64_vec()?, &[1.0, 5.0, 1.0, 5.0, 1.0, 5.0], 1e-6);
    Ok(())
}

#[test]
fn test_minimum_many_inputs() -> tributary::Result<()> {
    let dev = CpuDevice;
    let inputs = [
        CpuTensor::from_f64_slice(&[3.0, 1.0, 7.0, 0.0], (2, 2), DType::F64, &dev)?,
        CpuTensor::from_f64_slice(&[2.0, 4.0], (1, 2), DType::F64, &dev)?,
        CpuTensor::from_f64_slice(&[6.0, -1.0], (2, 1), DType::F64, &dev)?,
        CpuTensor::from_f64_slice(&[2.5], 1, DType::F64, &dev)?,
    ];
    let y = minimum(&inputs, LayerConfig::default())?;
    assert_eq!(y.dims(), &[2, 2]);
    assert_eq!(y.to_f64_vec()?, vec![2.0, 1.0, -1.0, -1.0]);
    Ok(())
}

#[test]
fn test_minimum_shape_mismatch() -> tributary::Result<()> {
    let dev = CpuDevice;
    let a = CpuTensor::zeros(3, DType::F32, &dev)?;
    let b = CpuTensor::zeros(4, DType::F32, &dev)?;
    match Minimum::<CpuBackend>::new().forward(&[a, b]) {
        Err(Error::MergeShapeMismatch { lhs, rhs, dim }) => {
            assert_eq!(lhs, sym(&[Some(3)]));
            assert_eq!(rhs, sym(&[Some(4)]));
            assert_eq!(dim, 0);
        }
        other => panic!("expected MergeShapeMismatch, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_single_input_is_arity_error() -> tributary::Result<()> {
    let x = CpuTensor::ones((2, 2), DType::F32, &CpuDevice)?;
    let err = Minimum::<CpuBackend>::new().forward(&[x]).unwrap_err();
    assert!(matches!(err, Error::Arity { got: 1, .. }));
    assert!(err.to_string().contains("at least 2 inputs"));
    Ok(())
}

#[test]
fn test_nan_propagates() -> tributary::Result<()> {
    let dev = CpuDevice;
    let a = CpuTensor::from_f64_slice(&[f64::NAN, 1.0], 2, DType::F32, &dev)?;
    let b = CpuTensor::from_f64_slice(&[0.0, 2.0], 2, DType::F32, &dev)?;
    let y = minimum(&[a, b], LayerConfig::default())?.to_f64_vec()?;
    assert!(y[0].is_nan());
    assert_eq!(y[1], 1.0);
    Ok(())
}

#[test]
fn test_other_reductions() -> tributary::Result<()> {
    let dev = CpuDevice;
    let a = CpuTensor::from_f64_slice(&[1.0, 2.0, 3.0], 3, DType::F32, &dev)?;
    let b = CpuTensor::from_f64_slice(&[4.0, 0.0, 3.0], 3, DType::F32, &dev)?;
    let c = CpuTensor::from_f64_slice(&[1.0], 1, DType::F32, &dev)?;
    let inputs = [a.clone(), b.clone(), c];

    let y = maximum(&inputs, LayerConfig::default())?;
    assert_vec_approx(&y.to_f64_vec()?, &[4.0, 2.0, 3.0], 1e-6);
    let y = Add::<CpuBackend>::new().forward(&inputs)?;
    assert_vec_approx(&y.to_f64_vec()?, &[6.0, 3.0, 7.0], 1e-6);
    let y = Multiply::<CpuBackend>::new().forward(&inputs)?;
    assert_vec_approx(&y.to_f64_vec()?, &[4.0, 0.0, 9.0], 1e-6);
    let y = average(&inputs, LayerConfig::default())?;
    assert_vec_approx(&y.to_f64_vec()?, &[2.0, 1.0, 7.0 / 3.0], 1e-6);
    let y = subtract(&[a, b], LayerConfig::default())?;
    assert_vec_approx(&y.to_f64_vec()?, &[-3.0, 2.0, 0.0], 1e-6);
    Ok(())
}

#[test]
fn test_subtract_rejects_three_inputs() -> tributary::Result<()> {
    let x = CpuTensor::ones(2, DType::F32, &CpuDevice)?;
    let layer = Subtract::<CpuBackend>::new();
    let err = layer
        .build(&[sym(&[Some(2)]), sym(&[Some(2)]), sym(&[Some(2)])])
        .unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 2, got: 3, .. }));
    let err = layer.forward(&[x.clone(), x.clone(), x]).unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 2, got: 3, .. }));
    Ok(())
}

// Build and shape inference

#[test]
fn test_build_twice_returns_cached_shape() -> tributary::Result<()> {
    let layer = Minimum::<CpuBackend>::new();
    let shapes = [sym(&[None, Some(16)]), sym(&[None, Some(16)])];
    let first = layer.build(&shapes)?;
    let second = layer.build(&shapes)?;
    assert_eq!(first, second);
    assert_eq!(first, sym(&[None, Some(16)]));
    assert_eq!(layer.engine().cached_signatures(), 1);
    Ok(())
}

#[test]
fn test_build_then_call_with_concrete_batch() -> tributary::Result<()> {
    let dev = CpuDevice;
    let layer = Minimum::<CpuBackend>::new();
    let out = layer.build(&[sym(&[None, Some(2)]), sym(&[None, Some(2)])])?;
    assert_eq!(out.dims(), &[SymDim::Dynamic, SymDim::Fixed(2)]);

    for batch in 1..4 {
        let a = CpuTensor::ones((batch, 2), DType::F32, &dev)?;
        let b = CpuTensor::zeros((batch, 2), DType::F32, &dev)?;
        let y = layer.forward(&[a, b])?;
        assert_eq!(y.dims(), &[batch, 2]);
        assert!(y.to_f64_vec()?.iter().all(|&v| v == 0.0));
    }
    // the symbolic signature plus one concrete signature per batch size
    assert_eq!(layer.engine().cached_signatures(), 4);
    Ok(())
}

#[test]
fn test_clear_cache_keeps_arity() -> tributary::Result<()> {
    let dev = CpuDevice;
    let layer = Minimum::<CpuBackend>::new();
    for batch in 1..6 {
        let a = CpuTensor::ones((batch, 3), DType::F32, &dev)?;
        layer.forward(&[a.clone(), a])?;
    }
    assert_eq!(layer.engine().cached_signatures(), 5);

    layer.engine().clear_cache()?;
    assert_eq!(layer.engine().cached_signatures(), 0);
    assert_eq!(layer.engine().arity(), Some(2));

    let a = CpuTensor::ones((7, 3), DType::F32, &dev)?;
    assert_eq!(layer.forward(&[a.clone(), a.clone()])?.dims(), &[7, 3]);
    assert_eq!(layer.engine().cached_signatures(), 1);
    let err = layer.forward(&[a.clone(), a.clone(), a]).unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 2, got: 3, .. }));
    Ok(())
}

#[test]
fn test_arity_fixed_after_build() -> tributary::Result<()> {
    let x = CpuTensor::ones(2, DType::F32, &CpuDevice)?;
    let layer = Maximum::<CpuBackend>::new();
    layer.build(&[sym(&[Some(2)]), sym(&[Some(2)]), sym(&[Some(2)])])?;
    let err = layer.forward(&[x.clone(), x]).unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 3, got: 2, .. }));
    Ok(())
}

#[test]
fn test_compute_output_shape_unknown_takes_concrete() -> tributary::Result<()> {
    let layer = Average::<CpuBackend>::new();
    let out = layer.compute_output_shape(&[sym(&[None, Some(1), Some(8)]), sym(&[Some(4), Some(8)])])?;
    assert_eq!(out, sym(&[None, Some(4), Some(8)]));
    Ok(())
}

// Masks

#[test]
fn test_masks_combine_with_and() -> tributary::Result<()> {
    let dev = CpuDevice;
    let a = CpuTensor::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], 4, DType::F32, &dev)?;
    let b = CpuTensor::from_f64_slice(&[4.0, 3.0, 2.0, 1.0], 4, DType::F32, &dev)?;
    let all_true = CpuTensor::from_bools(&[true; 4], 4, &dev)?;
    let hole = CpuTensor::from_bools(&[true, true, false, true], 4, &dev)?;

    let layer = Minimum::<CpuBackend>::new();
    let (y, mask) = layer.forward_masked(&[a, b], &[Some(all_true), Some(hole)])?;
    assert_vec_approx(&y.to_f64_vec()?, &[1.0, 2.0, 2.0, 1.0], 1e-6);
    let mask = mask.expect("mask expected");
    assert_eq!(mask.dtype(), DType::U8);
    assert_eq!(mask.to_bool_vec()?, vec![true, true, false, true]);
    Ok(())
}

#[test]
fn test_no_masks_no_output_mask() -> tributary::Result<()> {
    let x = CpuTensor::ones(3, DType::F32, &CpuDevice)?;
    let layer = Minimum::<CpuBackend>::new();
    let (_, mask) = layer.forward_masked(&[x.clone(), x.clone()], &[None, None])?;
    assert!(mask.is_none());
    assert!(layer.compute_mask(&[x.clone(), x], &[None, None])?.is_none());
    Ok(())
}

#[test]
fn test_mask_broadcast_to_output() -> tributary::Result<()> {
    let dev = CpuDevice;
    let a = CpuTensor::ones((2, 3), DType::F32, &dev)?;
    let b = CpuTensor::ones(3, DType::F32, &dev)?;
    let row_mask = CpuTensor::from_bools(&[true, false, true], 3, &dev)?;
    let layer = Minimum::<CpuBackend>::new();
    let mask = layer
        .compute_mask(&[a, b], &[None, Some(row_mask)])?
        .expect("mask expected");
    assert_eq!(mask.dims(), &[2, 3]);
    assert_eq!(
        mask.to_bool_vec()?,
        vec![true, false, true, true, false, true]
    );
    Ok(())
}

#[test]
fn test_mask_count_mismatch() -> tributary::Result<()> {
    let x = CpuTensor::ones(3, DType::F32, &CpuDevice)?;
    let layer = Minimum::<CpuBackend>::new();
    let err = layer
        .forward_masked(&[x.clone(), x.clone(), x], &[None, None])
        .unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 3, got: 2, .. }));
    Ok(())
}

// Configuration

#[test]
fn test_generated_names_are_unique() {
    let a = Minimum::<CpuBackend>::new();
    let b = Minimum::<CpuBackend>::new();
    assert!(a.name().starts_with("minimum"));
    assert!(b.name().starts_with("minimum"));
    assert_ne!(a.name(), b.name());
    assert_eq!(a.config().name.as_deref(), Some(a.name()));
}

#[test]
fn test_config_json_rebuilds_layer() -> tributary::Result<()> {
    let layer = Minimum::<CpuBackend>::from_config(
        LayerConfig::new()
            .with_name("branch_min")
            .with_trainable(false)
            .with_dtype(DType::F64),
    );
    let json = layer.config().to_json()?;
    assert_eq!(json, r#"{"name":"branch_min","trainable":false,"dtype":"f64"}"#);

    let rebuilt = Minimum::<CpuBackend>::from_config(LayerConfig::from_json(&json)?);
    assert_eq!(rebuilt.name(), "branch_min");
    assert!(!rebuilt.is_trainable());
    assert_eq!(rebuilt.config(), layer.config());
    Ok(())
}

#[test]
fn test_compute_dtype() -> tributary::Result<()> {
    let dev = CpuDevice;
    let a = CpuTensor::from_f64_slice(&[1.5, -2.0], 2, DType::F32, &dev)?;
    let b = CpuTensor::from_f64_slice(&[0.5, 3.0], 2, DType::F64, &dev)?;
    let layer = Minimum::<CpuBackend>::from_config(LayerConfig::new().with_dtype(DType::F16));
    let y = layer.forward(&[a, b])?;
    assert_eq!(y.dtype(), DType::F16);
    assert_eq!(y.to_f64_vec()?, vec![0.5, -2.0]);
    Ok(())
}

// Concurrency

#[test]
fn test_shared_layer_across_threads() -> tributary::Result<()> {
    init_tracing();
    let layer = Minimum::<CpuBackend>::new();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let layer = &layer;
                s.spawn(move || -> tributary::Result<Vec<f64>> {
                    // four threads per batch size, so signatures race
                    let batch = 1 + i % 2;
                    let a = CpuTensor::full((batch, 3), i as f64, DType::F32, &CpuDevice)?;
                    let b = CpuTensor::full(3, 4.0, DType::F32, &CpuDevice)?;
                    layer.forward(&[a, b])?.to_f64_vec()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let out = handle.join().expect("worker panicked")?;
            let batch = 1 + i % 2;
            let expected = (i as f64).min(4.0);
            assert_eq!(out, vec![expected; batch * 3]);
        }
        Ok::<(), Error>(())
    })?;
    assert_eq!(layer.engine().cached_signatures(), 2);
    assert_eq!(layer.engine().arity(), Some(2));
    Ok(())
}

// Properties

fn three_vectors() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<f64>)> {
    (1usize..16).prop_flat_map(|n| {
        (
            prop::collection::vec(-100.0f64..100.0, n),
            prop::collection::vec(-100.0f64..100.0, n),
            prop::collection::vec(-100.0f64..100.0, n),
        )
    })
}

fn tensor(data: &[f64]) -> CpuTensor {
    CpuTensor::from_f64_slice(data, data.len(), DType::F64, &CpuDevice).unwrap()
}

fn merged_min(inputs: &[&[f64]]) -> Vec<f64> {
    let tensors: Vec<CpuTensor> = inputs.iter().map(|d| tensor(d)).collect();
    minimum(&tensors, LayerConfig::default())
        .unwrap()
        .to_f64_vec()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_minimum_commutative((a, b, _) in three_vectors()) {
        prop_assert_eq!(merged_min(&[&a, &b]), merged_min(&[&b, &a]));
    }

    #[test]
    fn prop_minimum_fold_order_independent((a, b, c) in three_vectors()) {
        let abc = merged_min(&[&a, &b, &c]);
        prop_assert_eq!(&abc, &merged_min(&[&c, &a, &b]));
        prop_assert_eq!(&abc, &merged_min(&[&b, &c, &a]));
        let ab = merged_min(&[&a, &b]);
        prop_assert_eq!(&abc, &merged_min(&[&ab, &c]));
        for (i, v) in abc.iter().enumerate() {
            prop_assert_eq!(*v, a[i].min(b[i]).min(c[i]));
        }
    }

    #[test]
    fn prop_minimum_with_itself_is_identity(values in prop::collection::vec(-1e6f64..1e6, 1..32)) {
        prop_assert_eq!(merged_min(&[&values, &values]), values);
    }
}
