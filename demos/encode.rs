//! Encode a few sentences with a randomly initialised encoder.
//!
//! Builds vocabularies from the input itself, runs one inference and one
//! training forward pass and prints the output shapes.
//!
//! Usage: cargo run --example encode -- [device] [seed]
//!
//! `device` is `cpu` (default), `cuda[:N]` or `metal[:N]`.

use candle_nn::VarMap;
use cube_text_encoder::masking::seeded_rng;
use cube_text_encoder::{DeviceSpec, Encodings, TaggerConfig, TextEncoder, Token};

const SENTENCES: &[&str] = &[
    "The cat sat on the mat .",
    "Colorless green ideas sleep furiously .",
    "It costs $ 42 in Paris !",
];

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let device: DeviceSpec = args.next().as_deref().unwrap_or("cpu").parse()?;
    let seed: u64 = match args.next() {
        Some(s) => s.parse()?,
        None => 42,
    };

    let sentences: Vec<Vec<Token>> = SENTENCES
        .iter()
        .map(|s| s.split_whitespace().map(Token::new).collect())
        .collect();

    let encodings = Encodings::compute(&sentences, 1);
    let config = TaggerConfig::default();
    let varmap = VarMap::new();
    let encoder = TextEncoder::from_varmap(&config, encodings, None, device, &varmap)?;

    let out = encoder.forward(&sentences, None)?;
    println!("inference: {:?}", out.dims());

    let mut rng = seeded_rng(seed);
    let out = encoder.forward_t(&sentences, None, &mut rng)?;
    println!("training:  {:?}", out.dims());

    let params: usize = varmap.all_vars().iter().map(|v| v.elem_count()).sum();
    println!("parameters: {params}");
    Ok(())
}
