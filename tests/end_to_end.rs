//! End-to-end training scenarios on small deterministic models.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::Linear;

use locoprop_rs::{
    Activation, DiagnosticKind, LocoLayer, LocopropConfig, LocopropTrainer, OptimizerSpec,
    PlainLayer, Sequential,
};

/// Deterministic dense layer; no RNG so runs are reproducible.
fn linear_layer(out_dim: usize, in_dim: usize, seed: f32, device: &Device) -> (Linear, Vec<Var>) {
    let data: Vec<f32> = (0..out_dim * in_dim)
        .map(|i| ((i as f32) * 0.29 + seed).sin() * 0.4)
        .collect();
    let w = Var::from_tensor(&Tensor::from_vec(data, (out_dim, in_dim), device).unwrap()).unwrap();
    let b = Var::zeros(out_dim, DType::F32, device).unwrap();
    (
        Linear::new(w.as_tensor().clone(), Some(b.as_tensor().clone())),
        vec![w, b],
    )
}

fn two_layer_model(device: &Device) -> Sequential {
    let (l1, p1) = linear_layer(6, 4, 0.3, device);
    let (l2, p2) = linear_layer(3, 6, 1.7, device);
    Sequential::new()
        .add(LocoLayer::new(l1, p1, Activation::Sigmoid))
        .add(LocoLayer::new(l2, p2, Activation::Softmax))
}

fn batch(device: &Device) -> (Tensor, Tensor) {
    let x = Tensor::new(
        &[
            [0.5f32, -0.2, 0.8, -0.6],
            [-0.3, 0.9, -0.1, 0.4],
            [0.7, 0.1, -0.8, 0.2],
            [-0.5, -0.7, 0.3, 0.9],
            [0.2, 0.6, 0.5, -0.4],
        ],
        device,
    )
    .unwrap();
    let y = Tensor::new(
        &[
            [0.8f32, 0.1, 0.1],
            [0.1, 0.8, 0.1],
            [0.1, 0.1, 0.8],
            [0.8, 0.1, 0.1],
            [0.1, 0.8, 0.1],
        ],
        device,
    )
    .unwrap();
    (x, y)
}

fn mse(pred: &Tensor, target: &Tensor) -> candle_core::Result<Tensor> {
    (pred - target)?.sqr()?.mean_all()
}

#[test]
fn test_repeated_steps_on_one_batch_decrease_the_loss() {
    let device = Device::Cpu;
    let config = LocopropConfig::builder()
        .optimizer(OptimizerSpec::Sgd {
            learning_rate: 0.05,
        })
        .learning_rate(0.1)
        .local_iterations(1)
        .momentum(0.0)
        .correction(0.0)
        .build();
    let mut trainer = LocopropTrainer::new(two_layer_model(&device), mse, config).unwrap();

    let (x, y) = batch(&device);
    let first = trainer.step(&x, &y).unwrap();
    let second = trainer.step(&x, &y).unwrap();

    assert!(first.is_finite() && second.is_finite());
    assert!(
        second < first,
        "loss should strictly decrease on the same batch: {first} -> {second}"
    );
    assert_eq!(trainer.losses(), &[first, second]);
    assert_eq!(trainer.current_step(), 2);
}

#[test]
fn test_full_configuration_trains_without_error() {
    // Default RMSprop local rule, smoothing and correction enabled.
    let device = Device::Cpu;
    let config = LocopropConfig::builder()
        .learning_rate(0.1)
        .local_iterations(3)
        .momentum(0.9)
        .correction(0.1)
        .build();
    let mut trainer = LocopropTrainer::new(two_layer_model(&device), mse, config).unwrap();

    let (x, y) = batch(&device);
    for _ in 0..3 {
        let loss = trainer.step(&x, &y).unwrap();
        assert!(loss.is_finite());
    }

    // Every trainable layer has a smoothed gradient slot after stepping.
    let smoothed = trainer.smoothed_gradients();
    assert_eq!(smoothed.len(), 2);
    assert!(smoothed.iter().all(|g| g.is_some()));
}

#[test]
fn test_implicit_softmax_layer_with_logit_loss() {
    // The last layer returns logits; the loss applies log-softmax itself.
    let device = Device::Cpu;
    let (l1, p1) = linear_layer(6, 4, 0.3, &device);
    let (l2, p2) = linear_layer(3, 6, 1.7, &device);
    let model = Sequential::new()
        .add(LocoLayer::new(l1, p1, Activation::Sigmoid))
        .add(LocoLayer::new(l2, p2, Activation::Softmax).with_implicit(true));

    let cross_entropy = |logits: &Tensor, target: &Tensor| -> candle_core::Result<Tensor> {
        let batch = logits.dim(0)? as f64;
        let log_probs = candle_nn::ops::log_softmax(logits, candle_core::D::Minus1)?;
        (log_probs * target)?.sum_all()? * (-1.0 / batch)
    };

    let config = LocopropConfig::builder()
        .optimizer(OptimizerSpec::Sgd {
            learning_rate: 0.05,
        })
        .learning_rate(0.1)
        .local_iterations(1)
        .momentum(0.0)
        .correction(0.0)
        .build();
    let mut trainer = LocopropTrainer::new(model, cross_entropy, config).unwrap();

    let (x, y) = batch(&device);
    let first = trainer.step(&x, &y).unwrap();
    let second = trainer.step(&x, &y).unwrap();
    assert!(
        second < first,
        "cross-entropy should decrease: {first} -> {second}"
    );
}

#[test]
fn test_frozen_trainable_layer_is_diagnosed_once() {
    let device = Device::Cpu;
    let (l1, p1) = linear_layer(6, 4, 0.3, &device);
    let (l2, p2) = linear_layer(3, 6, 1.7, &device);
    let model = Sequential::new()
        .add(LocoLayer::new(l1, p1, Activation::Sigmoid))
        .add(PlainLayer::with_params(l2, p2));

    let trainer = LocopropTrainer::new(model, mse, LocopropConfig::default()).unwrap();

    let diagnostics = trainer.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].layer_index, 1);
    match diagnostics[0].kind {
        DiagnosticKind::FrozenParameters { parameter_count } => {
            assert_eq!(parameter_count, 3 * 6 + 3);
        }
    }
    // The frozen layer gets no optimizer slot.
    assert_eq!(trainer.optimizer_slots(), vec![true, false]);
}

#[test]
fn test_plain_layer_parameters_stay_frozen_across_steps() {
    let device = Device::Cpu;
    let (l1, p1) = linear_layer(6, 4, 0.3, &device);
    let (l2, p2) = linear_layer(3, 6, 1.7, &device);
    let frozen_weight_before = p2[0].as_tensor().to_vec2::<f32>().unwrap();
    let model = Sequential::new()
        .add(LocoLayer::new(l1, p1, Activation::Sigmoid))
        .add(PlainLayer::with_params(l2, p2.clone()));

    let mut trainer = LocopropTrainer::new(model, mse, LocopropConfig::default()).unwrap();
    let (x, y) = batch(&device);
    trainer.step(&x, &y).unwrap();

    let frozen_weight_after = p2[0].as_tensor().to_vec2::<f32>().unwrap();
    assert_eq!(frozen_weight_before, frozen_weight_after);
}
