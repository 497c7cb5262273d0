use deskllm_runtime::HardwareProfile;

/// Print the detected hardware profile.
pub fn run(json: bool) -> anyhow::Result<()> {
    let profile = HardwareProfile::detect();
    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }
    println!("GPU available:   {}", profile.gpu.available);
    println!("  dedicated:     {}", profile.gpu.dedicated);
    println!("  integrated:    {}", profile.gpu.integrated_soc);
    println!("Memory total:    {:.1} GB", profile.memory.total_gb);
    println!("Memory free:     {:.1} GB", profile.memory.free_gb);
    Ok(())
}
