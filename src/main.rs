#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = script_marker::run().await {
        eprintln!("script-marker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
