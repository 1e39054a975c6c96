#[tokio::main]
async fn main() {
    if let Err(e) = daw_assist::run().await {
        tracing::error!(error = %e, "daw-assist stopped");
        eprintln!("daw-assist: {e}");
        std::process::exit(1);
    }
}
