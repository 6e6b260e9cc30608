use std::path::Path;
use std::process::Command;

use reel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    config.validate()?;
    ensure_workdir(&config.work_dir).await?;
    ensure_binary("ffmpeg", "-version")?;
    ensure_binary("ffprobe", "-version")?;
    ensure_edge_tts()?;
    ensure_env_present(&["REDIS_URL"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_binary(name: &str, version_flag: &str) -> anyhow::Result<()> {
    let output = Command::new(name)
        .arg(version_flag)
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} {} failed: {:?}", name, version_flag, output.status));
    }
    Ok(())
}

fn ensure_edge_tts() -> anyhow::Result<()> {
    let binary = std::env::var("EDGE_TTS_BIN").unwrap_or_else(|_| "edge-tts".to_string());
    ensure_binary(&binary, "--version")
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
