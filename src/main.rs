#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = quizgen_api::run().await {
        eprintln!("quizgen-api fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
