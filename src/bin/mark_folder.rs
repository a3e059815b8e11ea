#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = script_marker::run_folder().await {
        eprintln!("mark-folder fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
