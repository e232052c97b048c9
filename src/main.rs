#[tokio::main]
async fn main() {
    if let Err(e) = pesto_lib::run().await {
        log::error!("Pesto failed: {}", e);
        eprintln!("pesto: {}", e);
        std::process::exit(1);
    }
}
