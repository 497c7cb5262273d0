use deskllm_runtime::Runtime;

use super::{finish, format_gb};

/// Check a model's artifact; undersized files are quarantined.
pub fn run(runtime: &Runtime, model_id: &str, json: bool) -> anyhow::Result<()> {
    let artifact = finish(runtime.verify_model(model_id), json)?;
    if !json {
        println!("{} OK ({}) at {}", model_id, format_gb(artifact.size_bytes), artifact.path.display());
    }
    Ok(())
}
