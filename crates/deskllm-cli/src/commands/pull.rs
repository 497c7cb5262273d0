use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use deskllm_runtime::Runtime;

use super::finish;

/// Download a catalog model, trying its mirrors in order.
pub async fn run(runtime: &Runtime, model_id: &str, json: bool) -> anyhow::Result<()> {
    info!(model_id, "Pulling model");

    let bar = if json { ProgressBar::hidden() } else { ProgressBar::new_spinner() };
    let bytes_style = ProgressStyle::with_template(
        "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )?
    .progress_chars("=> ");
    bar.set_message(model_id.to_string());

    let resp = runtime
        .download_model(model_id, |p| {
            match p.bytes_total {
                Some(total) if bar.length() != Some(total) => {
                    bar.set_style(bytes_style.clone());
                    bar.set_length(total);
                }
                _ => {}
            }
            bar.set_position(p.bytes_done);
        })
        .await;
    bar.finish_and_clear();

    let report = finish(resp, json)?;
    if !json {
        let path = runtime.store().resolve_path(&report.model.id)?;
        println!("Model '{}' saved to {}", report.model.id, path.display());
    }
    Ok(())
}
