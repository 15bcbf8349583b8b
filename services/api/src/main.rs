use talent_hub_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("talent-hub: {err}");
        std::process::exit(err.exit_code());
    }
}
