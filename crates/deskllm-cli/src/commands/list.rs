use deskllm_runtime::Runtime;

use super::{finish, format_gb};

/// List every catalog model and whether its artifact is on disk.
pub fn run(runtime: &Runtime, json: bool) -> anyhow::Result<()> {
    let list = finish(runtime.list_models(), json)?;
    if json {
        return Ok(());
    }

    println!("{:<32} {:<28} {:>10} {:<8} {:<8}", "MODEL ID", "NAME", "SIZE", "QUANT", "LOCAL");
    println!("{}", "-".repeat(90));
    for m in &list.models {
        println!(
            "{:<32} {:<28} {:>10} {:<8} {:<8}",
            m.id,
            m.name,
            format_gb(m.size_bytes),
            m.quantization,
            if m.is_acquired { "yes" } else { "-" },
        );
    }
    let acquired = list.models.iter().filter(|m| m.is_acquired).count();
    println!(
        "\n{} model(s) in catalog, {} downloaded to {}",
        list.models.len(),
        acquired,
        runtime.store().root().display()
    );
    Ok(())
}
