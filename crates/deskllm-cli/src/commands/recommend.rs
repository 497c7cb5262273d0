use deskllm_runtime::{memory_warning, HardwareProfile, Runtime};

use super::{finish, format_gb};

/// Show catalog models smallest first, flagging the ones that fit in free memory.
pub fn run(runtime: &Runtime, json: bool) -> anyhow::Result<()> {
    let hardware = HardwareProfile::detect();
    let recs = finish(runtime.recommend_models(&hardware), json)?;
    if json {
        return Ok(());
    }

    println!("Free memory: {:.1} GB of {:.1} GB\n", hardware.memory.free_gb, hardware.memory.total_gb);
    for m in &recs.models {
        let fits = memory_warning(&hardware, m.size_bytes).is_none();
        println!(
            "{:<32} {:>10} {:<6} {}{}",
            m.id,
            format_gb(m.size_bytes),
            m.param_count,
            if fits { "fits" } else { "tight" },
            if m.is_acquired { " (downloaded)" } else { "" },
        );
    }
    Ok(())
}
