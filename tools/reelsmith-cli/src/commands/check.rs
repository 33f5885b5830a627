//! Check system capabilities.

use reelsmith_common::{config_file_path, AppConfig};
use reelsmith_render_engine::find_tool;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Reelsmith System Check");
    println!("{}", "=".repeat(50));

    let tools = [
        ("ffmpeg", &config.encoder.ffmpeg_path),
        ("ffprobe", &config.encoder.ffprobe_path),
    ];
    let mut all_ok = true;
    for (name, path) in tools {
        match find_tool(path) {
            Ok(found) => println!("[OK] {name}: {}", found.display()),
            Err(e) => {
                all_ok = false;
                println!("[MISSING] {name}: {e}");
            }
        }
    }

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[INFO] Config: defaults ({} not found)", config_path.display());
    }

    match &config.pipeline.bgm_dir {
        Some(dir) if dir.is_dir() => println!("[OK] Music directory: {}", dir.display()),
        Some(dir) => println!("[WARN] Music directory missing: {}", dir.display()),
        None => println!("[INFO] Music directory: not configured"),
    }

    println!();
    if all_ok {
        println!("All required tools are available. Reelsmith is ready.");
        Ok(())
    } else {
        Err(anyhow::anyhow!("Required tools are missing; install ffmpeg or set encoder paths in the config"))
    }
}
