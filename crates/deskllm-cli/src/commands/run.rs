use std::io::Write;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use deskllm_runtime::{GenerateParams, HardwareProfile, Runtime};

use super::finish;

/// Load a model, stream the raw continuation to stdout and finish with the
/// sanitized response.
pub async fn run(
    runtime: &Runtime,
    model_id: &str,
    params: GenerateParams,
    context_length: Option<usize>,
    stats: bool,
    json: bool,
) -> anyhow::Result<()> {
    let hardware = HardwareProfile::detect();
    let load_start = Instant::now();
    let report = finish(runtime.load_model(model_id, &hardware, context_length).await, json)?;
    let load_elapsed = load_start.elapsed();
    if report.fell_back_to_cpu {
        warn!(model_id, "Accelerated load failed, running on CPU");
    }
    info!(
        model_id,
        layers = report.acceleration_layers,
        context_length = report.context_length,
        "Model ready"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(piece) = rx.recv().await {
            if !json {
                print!("{piece}");
                stdout.flush().ok();
            }
        }
    });

    let gen_start = Instant::now();
    let resp = runtime.generate_stream(params, tx).await;
    let gen_elapsed = gen_start.elapsed();
    printer.await.ok();

    let output = finish(resp, json)?;
    if !json {
        println!("\n\n{}", output.response);
    }

    if stats {
        let secs = gen_elapsed.as_secs_f64();
        let tps = if secs > 0.0 { output.tokens_generated as f64 / secs } else { 0.0 };
        eprintln!(
            "\n[load {:.2}s | {} tokens in {:.2}s | {:.1} tok/s | stop: {:?}]",
            load_elapsed.as_secs_f64(),
            output.tokens_generated,
            secs,
            tps,
            output.stop_reason,
        );
    }
    Ok(())
}
