use deskllm_runtime::Runtime;

use super::finish;

/// Remove a model's artifact from the store.
pub fn run(runtime: &Runtime, model_id: &str, json: bool) -> anyhow::Result<()> {
    let report = finish(runtime.delete_model(model_id), json)?;
    if !json {
        if report.removed {
            println!("Deleted '{}' from {}", report.model_id, runtime.store().root().display());
        } else {
            println!("'{}' was not downloaded, nothing to delete", report.model_id);
        }
    }
    Ok(())
}
