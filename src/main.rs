#[tokio::main]
async fn main() {
    if let Err(err) = phishguard_lib::run().await {
        eprintln!("phishguard: {err:#}");
        std::process::exit(1);
    }
}
