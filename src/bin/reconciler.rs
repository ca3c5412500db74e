#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gradeflow::run_reconciler().await {
        eprintln!("gradeflow-reconciler fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
