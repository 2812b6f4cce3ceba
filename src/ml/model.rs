use anyhow::{bail, Result};
use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        interpolate::{Interpolate2d, Interpolate2dConfig, InterpolateMode},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct FractalUNetConfig {
    /// Filters at the top level; level i has `base_filters * 2^i`
    #[config(default = 16)]
    pub base_filters: usize,
    /// Number of pooling steps in each U
    #[config(default = 4)]
    pub depth: usize,
    #[config(default = 1)]
    pub in_channels: usize,
    #[config(default = 1e-3)]
    pub bn_epsilon: f64,
    /// Burn convention: running = (1 - momentum) * running + momentum * batch
    #[config(default = 0.01)]
    pub bn_momentum: f64,
}

impl FractalUNetConfig {
    /// Only meaningful once `validate_geometry` has accepted the config.
    fn channels(&self, level: usize) -> usize {
        self.base_filters << level
    }

    /// Spatial sizes must survive `depth` halvings without remainder,
    /// and the bottom level's channel count must fit in a usize.
    pub fn validate_geometry(&self, rows: usize, cols: usize) -> Result<()> {
        if self.depth == 0 || self.base_filters == 0 || self.in_channels == 0 {
            bail!("depth, base_filters and in_channels must all be positive");
        }
        let Some(factor) = u32::try_from(self.depth).ok().and_then(|d| 2usize.checked_pow(d)) else {
            bail!("depth {} is too large: 2^{} overflows", self.depth, self.depth);
        };
        // two concatenated bottom-level inputs feed the deepest decoder block
        if self.base_filters.checked_mul(factor).and_then(|c| c.checked_mul(2)).is_none() {
            bail!(
                "base_filters {} with depth {} overflows the channel count",
                self.base_filters,
                self.depth
            );
        }
        if rows == 0 || cols == 0 || rows % factor != 0 || cols % factor != 0 {
            bail!(
                "input {rows}x{cols} is not divisible by 2^{} = {factor}; \
                 pick a size that survives {} max-pool steps",
                self.depth,
                self.depth
            );
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> FractalUNet<B> {
        let d = self.depth;

        // Encoder A: stem at level 0, then one block per pooled level
        let mut encoder_a = vec![self.build_block(self.in_channels, self.channels(0), false, device)];
        for i in 1..=d {
            encoder_a.push(self.build_block(self.channels(i - 1), self.channels(i), true, device));
        }

        // Decoders: up(level i + 1) ++ skip(level i) → level i, for i = d-1 .. 0
        let decoder = |device: &B::Device| -> Vec<ConvBlock<B>> {
            (0..d)
                .rev()
                .map(|i| self.build_block(self.channels(i + 1) + self.channels(i), self.channels(i), true, device))
                .collect()
        };
        let decoder_a = decoder(device);

        // Encoder B: pool(level i - 1) ++ skip(level i) → level i, for i = 1 ..= d
        let encoder_b = (1..=d)
            .map(|i| self.build_block(self.channels(i - 1) + self.channels(i), self.channels(i), true, device))
            .collect();

        let decoder_b = decoder(device);

        let head_norm = self.build_norm(self.channels(0), device);
        let head = zero_bias(
            Conv2dConfig::new([self.channels(0), 1], [1, 1])
                .with_padding(PaddingConfig2d::Same)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            device,
        );

        FractalUNet {
            encoder_a,
            decoder_a,
            encoder_b,
            decoder_b,
            head_norm,
            head,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            upsample: Interpolate2dConfig::new()
                .with_scale_factor(Some([2.0, 2.0]))
                .with_mode(InterpolateMode::Nearest)
                .init(),
            depth: d,
        }
    }

    fn build_block<B: Backend>(
        &self,
        in_ch:     usize,
        out_ch:    usize,
        pre_norm:  bool,
        device:    &B::Device,
    ) -> ConvBlock<B> {
        let conv = |i: usize, o: usize| -> Conv2d<B> {
            zero_bias(
                Conv2dConfig::new([i, o], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                    .init(device),
                device,
            )
        };
        ConvBlock {
            norm_in:  pre_norm.then(|| self.build_norm(in_ch, device)),
            conv1:    conv(in_ch, out_ch),
            norm_mid: self.build_norm(out_ch, device),
            conv2:    conv(out_ch, out_ch),
        }
    }

    fn build_norm<B: Backend>(&self, features: usize, device: &B::Device) -> BatchNorm<B> {
        BatchNormConfig::new(features)
            .with_epsilon(self.bn_epsilon)
            .with_momentum(self.bn_momentum)
            .init(device)
    }
}

/// Glorot kernel, zero bias: the initialiser is only meant for the weights.
fn zero_bias<B: Backend>(mut conv: Conv2d<B>, device: &B::Device) -> Conv2d<B> {
    if let Some(bias) = &conv.bias {
        let [n] = bias.val().dims();
        conv.bias = Some(Param::from_tensor(Tensor::zeros([n], device)));
    }
    conv
}

/// `[BN] → conv3x3 → ReLU → BN → conv3x3 → ReLU`.
/// The stem block of the first encoder has no leading BN.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub norm_in:  Option<BatchNorm<B>>,
    pub conv1:    Conv2d<B>,
    pub norm_mid: BatchNorm<B>,
    pub conv2:    Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.norm_in {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = relu(self.conv1.forward(x));
        let x = self.norm_mid.forward(x);
        relu(self.conv2.forward(x))
    }
}

/// Two U-Nets stacked top to bottom. The second U's encoder
/// re-enters every level of the first U's decoder, and its
/// decoder's last skip is the first U's output.
#[derive(Module, Debug)]
pub struct FractalUNet<B: Backend> {
    /// Levels 0..=depth
    pub encoder_a: Vec<ConvBlock<B>>,
    /// Levels depth-1 down to 0
    pub decoder_a: Vec<ConvBlock<B>>,
    /// Levels 1..=depth
    pub encoder_b: Vec<ConvBlock<B>>,
    /// Levels depth-1 down to 0
    pub decoder_b: Vec<ConvBlock<B>>,
    pub head_norm: BatchNorm<B>,
    pub head:      Conv2d<B>,
    pub pool:      MaxPool2d,
    pub upsample:  Interpolate2d,
    pub depth:     usize,
}

impl<B: Backend> FractalUNet<B> {
    /// images: [batch, in_channels, rows, cols] → masks: [batch, 1, rows, cols] in [0, 1]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let d = self.depth;

        // ── First U, encoder ──────────────────────────────────────────────────
        let mut enc_a: Vec<Tensor<B, 4>> = Vec::with_capacity(d + 1);
        enc_a.push(self.encoder_a[0].forward(images));
        for i in 1..=d {
            let down = self.pool.forward(enc_a[i - 1].clone());
            enc_a.push(self.encoder_a[i].forward(down));
        }

        // ── First U, decoder ──────────────────────────────────────────────────
        // dec_a[i] holds the level-i output; filled from the bottom up
        let mut dec_a: Vec<Option<Tensor<B, 4>>> = vec![None; d];
        let mut prev = enc_a[d].clone();
        for (block, i) in self.decoder_a.iter().zip((0..d).rev()) {
            let merged = Tensor::cat(vec![self.upsample.forward(prev), enc_a[i].clone()], 1);
            prev = block.forward(merged);
            dec_a[i] = Some(prev.clone());
        }
        let dec_a: Vec<Tensor<B, 4>> = dec_a.into_iter().flatten().collect();

        // ── Second U, encoder ─────────────────────────────────────────────────
        // enc_b[i] holds level i; level 0 is the first U's output
        let mut enc_b: Vec<Tensor<B, 4>> = Vec::with_capacity(d + 1);
        enc_b.push(dec_a[0].clone());
        for (block, i) in self.encoder_b.iter().zip(1..=d) {
            let skip = if i < d { dec_a[i].clone() } else { enc_a[d].clone() };
            let down = self.pool.forward(enc_b[i - 1].clone());
            enc_b.push(block.forward(Tensor::cat(vec![down, skip], 1)));
        }

        // ── Second U, decoder ─────────────────────────────────────────────────
        let mut prev = enc_b[d].clone();
        for (block, i) in self.decoder_b.iter().zip((0..d).rev()) {
            let merged = Tensor::cat(vec![self.upsample.forward(prev), enc_b[i].clone()], 1);
            prev = block.forward(merged);
        }

        // ── Head ──────────────────────────────────────────────────────────────
        let x = self.head_norm.forward(prev);
        hard_sigmoid(self.head.forward(x))
    }
}

/// Piecewise-linear sigmoid: `clamp(0.2 x + 0.5, 0, 1)`.
pub fn hard_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    (x * 0.2 + 0.5).clamp(0.0, 1.0)
}
