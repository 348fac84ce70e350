use order_risk_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("order-risk error: {err}");
        std::process::exit(1);
    }
}
